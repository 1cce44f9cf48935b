/// Background notification loops: aurora alerts and saved-event reminders
use crate::domain::{EventType, PushMessage};
use crate::errors::ApiResult;
use crate::repo::EventStore;
use crate::services::aurora::{build_forecast, KpForecastService};
use crate::services::notifier::{deliver, Notifier};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct NotificationScheduler {
    store: Arc<dyn EventStore>,
    notifier: Arc<dyn Notifier>,
    aurora: Arc<KpForecastService>,
    cooldown: Duration,
}

impl NotificationScheduler {
    pub fn new(
        store: Arc<dyn EventStore>,
        notifier: Arc<dyn Notifier>,
        aurora: Arc<KpForecastService>,
        cooldown: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            aurora,
            cooldown,
        }
    }

    /// One pass over aurora subscribers. Returns how many users were alerted.
    pub async fn run_aurora_cycle(&self, now: DateTime<Utc>) -> ApiResult<usize> {
        let subscribers = self.store.aurora_subscribers().await?;
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for user in subscribers {
            if !seen.insert(user.id.clone()) {
                continue;
            }
            let Some(lat) = user.lat else {
                debug!("aurora: user {} has no latitude", user.id);
                continue;
            };
            if let Some(last) = user.last_aurora_push_at {
                if now - last < self.cooldown {
                    debug!("aurora: user {} in cooldown since {}", user.id, last);
                    continue;
                }
            }
            candidates.push((user.id, lat));
        }

        if candidates.is_empty() {
            return Ok(0);
        }

        // One upstream lookup per cycle, evaluated per latitude
        let snapshot = self.aurora.forecast(now).await?;
        let mut alerted = 0;

        for (user_id, lat) in candidates {
            let forecast = build_forecast(lat, &snapshot, now);
            if !forecast.likely {
                continue;
            }

            let mut message = PushMessage::new("Aurora Alert", forecast.message.clone())
                .with_data("type", EventType::Aurora);
            if let Some(kp) = forecast.kp_max_next_24h {
                message = message.with_data("kp", kp);
            }

            match deliver(self.store.as_ref(), self.notifier.as_ref(), &user_id, &message).await {
                Ok(_) => {
                    alerted += 1;
                    if let Err(e) = self.store.set_last_aurora_push(&user_id, now).await {
                        error!("aurora cooldown for user {} not recorded: {}", user_id, e);
                    }
                }
                Err(e) => error!("aurora alert for user {} failed: {}", user_id, e),
            }
        }

        Ok(alerted)
    }

    /// One pass over pending saved events. Returns how many reminders fired.
    pub async fn run_milestone_cycle(&self, now: DateTime<Utc>) -> ApiResult<usize> {
        let pending = self.store.pending_events(now).await?;
        let mut fired = 0;

        for event in pending {
            if event.kind == EventType::Aurora || event.fully_notified() {
                continue;
            }

            for reminder in event.kind.reminders() {
                if event.is_notified(reminder.key) || now < reminder.due_at(event.start) {
                    continue;
                }
                // Claim first; a concurrent cycle that loses the race sends nothing
                if !self.store.mark_notified(event.id, reminder.key, now).await? {
                    continue;
                }

                let message = PushMessage::new(event.title.clone(), reminder.body)
                    .with_data("type", event.kind)
                    .with_data("eventId", &event.event_id)
                    .with_data("milestone", reminder.key);

                match deliver(self.store.as_ref(), self.notifier.as_ref(), &event.user_id, &message)
                    .await
                {
                    Ok(_) => fired += 1,
                    Err(e) => warn!(
                        "reminder {} for saved event {} not delivered: {}",
                        reminder.key, event.id, e
                    ),
                }
            }
        }

        Ok(fired)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    Aurora,
    Milestones,
}

/// A scheduler cycle run on a fixed interval until shutdown is signalled
pub struct RecurringTask {
    name: &'static str,
    interval: std::time::Duration,
    cycle: Cycle,
    scheduler: Arc<NotificationScheduler>,
}

impl RecurringTask {
    pub fn new(
        name: &'static str,
        interval: std::time::Duration,
        cycle: Cycle,
        scheduler: Arc<NotificationScheduler>,
    ) -> Self {
        Self {
            name,
            interval,
            cycle,
            scheduler,
        }
    }

    pub async fn run_once(&self, now: DateTime<Utc>) -> ApiResult<usize> {
        match self.cycle {
            Cycle::Aurora => self.scheduler.run_aurora_cycle(now).await,
            Cycle::Milestones => self.scheduler.run_milestone_cycle(now).await,
        }
    }

    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Starting {} task (interval: {}s)",
                self.name,
                self.interval.as_secs()
            );
            loop {
                match self.run_once(Utc::now()).await {
                    Ok(n) => debug!("{} cycle done: {}", self.name, n),
                    Err(e) => error!("{} cycle error: {:?}", self.name, e),
                }

                tokio::select! {
                    _ = tokio::time::sleep(self.interval) => {}
                    changed = shutdown.changed() => {
                        // A dropped sender can never signal again
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("{} task stopped", self.name);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::KpSource;
    use crate::domain::{DispatchReport, KpForecastTable, NewSavedEvent, UserProfile};
    use crate::errors::ApiError;
    use crate::repo::{ForecastCache, MemoryEventStore};
    use crate::services::notifier::tests::{HalfDead, StuckTokens};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(String, PushMessage)>>,
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn notify(&self, user_id: &str, message: &PushMessage) -> ApiResult<DispatchReport> {
            self.sent.lock().push((user_id.to_string(), message.clone()));
            Ok(DispatchReport {
                delivered: 1,
                dead_endpoints: vec![],
            })
        }
    }

    impl Recorder {
        fn count(&self) -> usize {
            self.sent.lock().len()
        }
    }

    struct FixedKp(Option<KpForecastTable>);

    #[async_trait]
    impl KpSource for FixedKp {
        async fn fetch_table(&self) -> ApiResult<KpForecastTable> {
            self.0
                .clone()
                .ok_or_else(|| ApiError::Internal("kp offline".into()))
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 3, 1, 12, 0, 0).unwrap()
    }

    fn storm() -> KpForecastTable {
        KpForecastTable(vec![
            json!(["time_tag", "kp", "observed", "noaa_scale"]),
            json!(["2030-03-01 21:00:00", "7.33", "predicted", "G3"]),
            json!(["2030-03-02 06:00:00", "7.00", "predicted", "G3"]),
        ])
    }

    struct Harness {
        store: Arc<MemoryEventStore>,
        notifier: Arc<Recorder>,
        scheduler: Arc<NotificationScheduler>,
        _dir: tempfile::TempDir,
    }

    fn scheduler_with(
        dir: &tempfile::TempDir,
        store: Arc<dyn EventStore>,
        notifier: Arc<dyn Notifier>,
        kp: Option<KpForecastTable>,
    ) -> Arc<NotificationScheduler> {
        let aurora = Arc::new(KpForecastService::new(
            Arc::new(FixedKp(kp)),
            Arc::new(ForecastCache::new(dir.path())),
            Duration::hours(1),
        ));
        Arc::new(NotificationScheduler::new(
            store,
            notifier,
            aurora,
            Duration::hours(12),
        ))
    }

    fn harness(kp: Option<KpForecastTable>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryEventStore::new());
        let notifier = Arc::new(Recorder::default());
        let scheduler = scheduler_with(&dir, store.clone(), notifier.clone(), kp);
        Harness {
            store,
            notifier,
            scheduler,
            _dir: dir,
        }
    }

    async fn add_user(store: &MemoryEventStore, id: &str, lat: Option<f64>) {
        store
            .upsert_user(UserProfile {
                id: id.into(),
                lat,
                lon: Some(0.0),
                timezone: None,
                last_aurora_push_at: None,
            })
            .await
            .unwrap();
    }

    async fn save(store: &MemoryEventStore, user: &str, kind: EventType, id: &str, start: DateTime<Utc>) {
        store
            .save_event(
                user,
                NewSavedEvent {
                    event_id: id.into(),
                    kind,
                    title: format!("{} title", id),
                    start,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_milestone_fires_once() {
        let h = harness(None);
        save(&h.store, "u1", EventType::Eclipse, "ecl", now() + Duration::hours(20)).await;

        assert_eq!(h.scheduler.run_milestone_cycle(now()).await.unwrap(), 1);
        for i in 1..4 {
            let later = now() + Duration::minutes(15 * i);
            assert_eq!(h.scheduler.run_milestone_cycle(later).await.unwrap(), 0);
        }

        let saved = h.store.list_events("u1").await.unwrap();
        assert_eq!(saved[0].notified.get("24h"), Some(&now()));

        let sent = h.notifier.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.body, "Event begins in ~24 hours.");
        assert_eq!(sent[0].1.data.get("milestone").map(String::as_str), Some("24h"));
    }

    #[tokio::test]
    async fn test_both_milestones_fire_after_downtime() {
        let h = harness(None);
        save(&h.store, "u1", EventType::Meteor, "per", now() + Duration::minutes(30)).await;

        assert_eq!(h.scheduler.run_milestone_cycle(now()).await.unwrap(), 2);
        let saved = h.store.list_events("u1").await.unwrap();
        assert!(saved[0].fully_notified());
        assert_eq!(h.scheduler.run_milestone_cycle(now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_milestone_not_due_yet() {
        let h = harness(None);
        save(&h.store, "u1", EventType::Moon, "moon", now() + Duration::hours(2)).await;

        assert_eq!(h.scheduler.run_milestone_cycle(now()).await.unwrap(), 0);
        let fired = h
            .scheduler
            .run_milestone_cycle(now() + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(fired, 1);
    }

    #[tokio::test]
    async fn test_aurora_events_skip_milestone_loop() {
        let h = harness(None);
        save(&h.store, "u1", EventType::Aurora, "aur", now() + Duration::minutes(10)).await;
        assert_eq!(h.scheduler.run_milestone_cycle(now()).await.unwrap(), 0);
        assert_eq!(h.notifier.count(), 0);
    }

    #[tokio::test]
    async fn test_aurora_cooldown() {
        let h = harness(Some(storm()));
        add_user(&h.store, "u1", Some(65.0)).await;
        save(&h.store, "u1", EventType::Aurora, "aur", now()).await;

        assert_eq!(h.scheduler.run_aurora_cycle(now()).await.unwrap(), 1);
        let again = h
            .scheduler
            .run_aurora_cycle(now() + Duration::hours(11))
            .await
            .unwrap();
        assert_eq!(again, 0);
        assert_eq!(h.notifier.count(), 1);

        let user = h.store.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.last_aurora_push_at, Some(now()));

        let sent = h.notifier.sent.lock();
        assert_eq!(sent[0].1.title, "Aurora Alert");
        assert_eq!(sent[0].1.data.get("type").map(String::as_str), Some("aurora"));
    }

    #[tokio::test]
    async fn test_aurora_realerts_exactly_when_cooldown_ends() {
        let h = harness(Some(storm()));
        add_user(&h.store, "u1", Some(70.0)).await;
        save(&h.store, "u1", EventType::Aurora, "aur", now()).await;

        assert_eq!(h.scheduler.run_aurora_cycle(now()).await.unwrap(), 1);

        let just_before = now() + Duration::hours(12) - Duration::seconds(1);
        assert_eq!(h.scheduler.run_aurora_cycle(just_before).await.unwrap(), 0);
        assert_eq!(h.notifier.count(), 1);

        let boundary = now() + Duration::hours(12);
        assert_eq!(h.scheduler.run_aurora_cycle(boundary).await.unwrap(), 1);
        assert_eq!(h.notifier.count(), 2);

        let user = h.store.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.last_aurora_push_at, Some(boundary));
    }

    struct Offline {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl Notifier for Offline {
        async fn notify(&self, _user_id: &str, _message: &PushMessage) -> ApiResult<DispatchReport> {
            *self.calls.lock() += 1;
            Err(ApiError::UpstreamStatus {
                source_name: "push gateway".into(),
                status: 503,
            })
        }
    }

    #[tokio::test]
    async fn test_failed_aurora_push_does_not_start_cooldown() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryEventStore::new());
        let notifier = Arc::new(Offline {
            calls: Mutex::new(0),
        });
        let scheduler = scheduler_with(&dir, store.clone(), notifier.clone(), Some(storm()));
        add_user(&store, "u1", Some(70.0)).await;
        save(&store, "u1", EventType::Aurora, "aur", now()).await;

        assert_eq!(scheduler.run_aurora_cycle(now()).await.unwrap(), 0);
        let user = store.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.last_aurora_push_at, None);

        // Not in cooldown, so the next cycle tries again
        let later = now() + Duration::minutes(10);
        assert_eq!(scheduler.run_aurora_cycle(later).await.unwrap(), 0);
        assert_eq!(*notifier.calls.lock(), 2);
    }

    #[tokio::test]
    async fn test_aurora_cooldown_survives_failed_token_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let inner = Arc::new(MemoryEventStore::new());
        let notifier = Arc::new(HalfDead::default());
        let store = Arc::new(StuckTokens(inner.clone()));
        let scheduler = scheduler_with(&dir, store, notifier.clone(), Some(storm()));
        add_user(&inner, "u1", Some(70.0)).await;
        inner.add_push_token("u1", "old-phone").await.unwrap();
        save(&inner, "u1", EventType::Aurora, "aur", now()).await;

        assert_eq!(scheduler.run_aurora_cycle(now()).await.unwrap(), 1);
        let next = now() + Duration::hours(1);
        assert_eq!(scheduler.run_aurora_cycle(next).await.unwrap(), 0);

        assert_eq!(*notifier.calls.lock(), 1);
        let user = inner.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.last_aurora_push_at, Some(now()));
    }

    #[tokio::test]
    async fn test_aurora_dedups_and_filters() {
        let h = harness(Some(storm()));
        add_user(&h.store, "north", Some(65.0)).await;
        add_user(&h.store, "south", Some(20.0)).await;
        add_user(&h.store, "nowhere", None).await;
        for user in ["north", "south", "nowhere"] {
            save(&h.store, user, EventType::Aurora, "a1", now()).await;
        }
        save(&h.store, "north", EventType::Aurora, "a2", now()).await;

        // Kp 7.33 clears 65° (needs 4) but not 20° (needs 9)
        assert_eq!(h.scheduler.run_aurora_cycle(now()).await.unwrap(), 1);
        let sent = h.notifier.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "north");
    }

    #[tokio::test]
    async fn test_aurora_cycle_fails_without_forecast() {
        let h = harness(None);
        add_user(&h.store, "u1", Some(70.0)).await;
        save(&h.store, "u1", EventType::Aurora, "aur", now()).await;

        assert!(h.scheduler.run_aurora_cycle(now()).await.is_err());
        assert_eq!(h.notifier.count(), 0);
    }

    #[tokio::test]
    async fn test_task_run_once_and_shutdown() {
        let h = harness(None);
        save(&h.store, "u1", EventType::Comet, "c", now() + Duration::minutes(30)).await;

        let task = RecurringTask::new(
            "milestones",
            std::time::Duration::from_secs(3600),
            Cycle::Milestones,
            h.scheduler.clone(),
        );
        assert_eq!(task.run_once(now()).await.unwrap(), 2);

        let (tx, rx) = watch::channel(false);
        let handle = task.spawn(rx);
        tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("task did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_task_stops_when_shutdown_sender_dropped() {
        let h = harness(None);
        let task = RecurringTask::new(
            "milestones",
            std::time::Duration::from_secs(3600),
            Cycle::Milestones,
            h.scheduler.clone(),
        );

        let (tx, rx) = watch::channel(false);
        let handle = task.spawn(rx);
        drop(tx);
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("task kept running after its sender was dropped")
            .unwrap();
    }
}
