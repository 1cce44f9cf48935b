/// Postgres-backed record store
use crate::domain::{EventType, NewSavedEvent, SavedEvent, UserProfile};
use crate::errors::ApiResult;
use crate::repo::EventStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

type EventRow = (i64, String, String, String, String, DateTime<Utc>, DateTime<Utc>);
type UserRow = (
    String,
    Option<f64>,
    Option<f64>,
    Option<String>,
    Option<DateTime<Utc>>,
);

const EVENT_COLUMNS: &str = "id, user_id, event_id, kind, title, starts_at, created_at";

#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach reminder markers to raw event rows
    async fn hydrate(&self, rows: Vec<EventRow>) -> ApiResult<Vec<SavedEvent>> {
        let ids: Vec<i64> = rows.iter().map(|r| r.0).collect();
        let mut markers: HashMap<i64, BTreeMap<String, DateTime<Utc>>> = HashMap::new();

        if !ids.is_empty() {
            let marks = sqlx::query_as::<_, (i64, String, DateTime<Utc>)>(
                "SELECT saved_event_id, milestone, fired_at
                 FROM saved_event_notifications
                 WHERE saved_event_id = ANY($1)",
            )
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;

            for (id, milestone, fired_at) in marks {
                markers.entry(id).or_default().insert(milestone, fired_at);
            }
        }

        Ok(rows
            .into_iter()
            .filter_map(|(id, user_id, event_id, kind, title, start, created_at)| {
                let Some(kind) = EventType::parse(&kind) else {
                    warn!("saved event {} has unknown type {:?}", id, kind);
                    return None;
                };
                Some(SavedEvent {
                    id,
                    user_id,
                    event_id,
                    kind,
                    title,
                    start,
                    notified: markers.remove(&id).unwrap_or_default(),
                    created_at,
                })
            })
            .collect())
    }
}

fn user_from_row((id, lat, lon, timezone, last_aurora_push_at): UserRow) -> UserProfile {
    UserProfile {
        id,
        lat,
        lon,
        timezone,
        last_aurora_push_at,
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn upsert_user(&self, profile: UserProfile) -> ApiResult<UserProfile> {
        let row = sqlx::query_as::<_, UserRow>(
            "INSERT INTO users(id, lat, lon, timezone, last_aurora_push_at)
             VALUES($1,$2,$3,$4,$5)
             ON CONFLICT (id) DO UPDATE
             SET lat=EXCLUDED.lat, lon=EXCLUDED.lon, timezone=EXCLUDED.timezone,
                 last_aurora_push_at=COALESCE(EXCLUDED.last_aurora_push_at, users.last_aurora_push_at)
             RETURNING id, lat, lon, timezone, last_aurora_push_at",
        )
        .bind(&profile.id)
        .bind(profile.lat)
        .bind(profile.lon)
        .bind(&profile.timezone)
        .bind(profile.last_aurora_push_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(user_from_row(row))
    }

    async fn get_user(&self, user_id: &str) -> ApiResult<Option<UserProfile>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, lat, lon, timezone, last_aurora_push_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn delete_user(&self, user_id: &str) -> ApiResult<()> {
        let mut tx = self.pool.begin().await?;
        // Markers go with their saved events via ON DELETE CASCADE
        sqlx::query("DELETE FROM saved_events WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM push_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn save_event(&self, user_id: &str, event: NewSavedEvent) -> ApiResult<SavedEvent> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "INSERT INTO saved_events(user_id, event_id, kind, title, starts_at)
             VALUES($1,$2,$3,$4,$5)
             RETURNING {}",
            EVENT_COLUMNS
        ))
        .bind(user_id)
        .bind(&event.event_id)
        .bind(event.kind.as_str())
        .bind(&event.title)
        .bind(event.start)
        .fetch_one(&self.pool)
        .await?;

        let (id, user_id, event_id, _, title, start, created_at) = row;
        Ok(SavedEvent {
            id,
            user_id,
            event_id,
            kind: event.kind,
            title,
            start,
            notified: BTreeMap::new(),
            created_at,
        })
    }

    async fn list_events(&self, user_id: &str) -> ApiResult<Vec<SavedEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {} FROM saved_events WHERE user_id = $1 ORDER BY starts_at",
            EVENT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(rows).await
    }

    async fn find_event(&self, user_id: &str, event_id: &str) -> ApiResult<Option<SavedEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {} FROM saved_events WHERE user_id = $1 AND event_id = $2 LIMIT 1",
            EVENT_COLUMNS
        ))
        .bind(user_id)
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(self.hydrate(rows).await?.into_iter().next())
    }

    async fn delete_event(&self, user_id: &str, event_id: &str) -> ApiResult<bool> {
        let result = sqlx::query("DELETE FROM saved_events WHERE user_id = $1 AND event_id = $2")
            .bind(user_id)
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn latest_event(&self) -> ApiResult<Option<SavedEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {} FROM saved_events ORDER BY created_at DESC, id DESC LIMIT 1",
            EVENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(self.hydrate(rows).await?.into_iter().next())
    }

    async fn pending_events(&self, now: DateTime<Utc>) -> ApiResult<Vec<SavedEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {} FROM saved_events WHERE starts_at >= $1",
            EVENT_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(rows).await
    }

    async fn mark_notified(
        &self,
        saved_event_id: i64,
        milestone: &str,
        at: DateTime<Utc>,
    ) -> ApiResult<bool> {
        let result = sqlx::query(
            "INSERT INTO saved_event_notifications(saved_event_id, milestone, fired_at)
             VALUES($1,$2,$3)
             ON CONFLICT (saved_event_id, milestone) DO NOTHING",
        )
        .bind(saved_event_id)
        .bind(milestone)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn aurora_subscribers(&self) -> ApiResult<Vec<UserProfile>> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT u.id, u.lat, u.lon, u.timezone, u.last_aurora_push_at
             FROM saved_events e
             JOIN users u ON u.id = e.user_id
             WHERE e.kind = 'aurora'",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(user_from_row).collect())
    }

    async fn set_last_aurora_push(&self, user_id: &str, at: DateTime<Utc>) -> ApiResult<()> {
        sqlx::query("UPDATE users SET last_aurora_push_at = $2 WHERE id = $1")
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn add_push_token(&self, user_id: &str, token: &str) -> ApiResult<bool> {
        let result = sqlx::query(
            "INSERT INTO push_tokens(user_id, token) VALUES($1,$2)
             ON CONFLICT (token) DO NOTHING",
        )
        .bind(user_id)
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn push_tokens(&self, user_id: &str) -> ApiResult<Vec<String>> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT token FROM push_tokens WHERE user_id = $1 ORDER BY token",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn remove_push_token(&self, token: &str) -> ApiResult<()> {
        sqlx::query("DELETE FROM push_tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Initialize database tables
pub async fn init_db(pool: &PgPool) -> ApiResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            lat DOUBLE PRECISION,
            lon DOUBLE PRECISION,
            timezone TEXT,
            last_aurora_push_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS saved_events(
            id BIGSERIAL PRIMARY KEY,
            user_id TEXT NOT NULL,
            event_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            starts_at TIMESTAMPTZ NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS ix_saved_events_user
         ON saved_events(user_id, event_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS ix_saved_events_start
         ON saved_events(starts_at)",
    )
    .execute(pool)
    .await?;

    // One row per fired milestone; the primary key makes markers write-once
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS saved_event_notifications(
            saved_event_id BIGINT NOT NULL REFERENCES saved_events(id) ON DELETE CASCADE,
            milestone TEXT NOT NULL,
            fired_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (saved_event_id, milestone)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS push_tokens(
            token TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}
