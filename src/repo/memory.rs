/// In-memory record store for runs without DATABASE_URL and for tests; lost on restart
use crate::domain::{EventType, NewSavedEvent, SavedEvent, UserProfile};
use crate::errors::ApiResult;
use crate::repo::EventStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
pub struct MemoryEventStore {
    users: RwLock<HashMap<String, UserProfile>>,
    events: RwLock<BTreeMap<i64, SavedEvent>>,
    // token -> user id
    tokens: RwLock<HashMap<String, String>>,
    next_id: RwLock<i64>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn upsert_user(&self, profile: UserProfile) -> ApiResult<UserProfile> {
        let mut users = self.users.write();
        let last_push = users.get(&profile.id).and_then(|u| u.last_aurora_push_at);
        let stored = UserProfile {
            last_aurora_push_at: profile.last_aurora_push_at.or(last_push),
            ..profile
        };
        users.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn get_user(&self, user_id: &str) -> ApiResult<Option<UserProfile>> {
        Ok(self.users.read().get(user_id).cloned())
    }

    async fn delete_user(&self, user_id: &str) -> ApiResult<()> {
        self.users.write().remove(user_id);
        self.events.write().retain(|_, e| e.user_id != user_id);
        self.tokens.write().retain(|_, owner| owner != user_id);
        Ok(())
    }

    async fn save_event(&self, user_id: &str, event: NewSavedEvent) -> ApiResult<SavedEvent> {
        let id = {
            let mut next = self.next_id.write();
            *next += 1;
            *next
        };
        let row = SavedEvent {
            id,
            user_id: user_id.to_string(),
            event_id: event.event_id,
            kind: event.kind,
            title: event.title,
            start: event.start,
            notified: BTreeMap::new(),
            created_at: Utc::now(),
        };
        self.events.write().insert(id, row.clone());
        Ok(row)
    }

    async fn list_events(&self, user_id: &str) -> ApiResult<Vec<SavedEvent>> {
        Ok(self
            .events
            .read()
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_event(&self, user_id: &str, event_id: &str) -> ApiResult<Option<SavedEvent>> {
        Ok(self
            .events
            .read()
            .values()
            .find(|e| e.user_id == user_id && e.event_id == event_id)
            .cloned())
    }

    async fn delete_event(&self, user_id: &str, event_id: &str) -> ApiResult<bool> {
        let mut events = self.events.write();
        let before = events.len();
        events.retain(|_, e| !(e.user_id == user_id && e.event_id == event_id));
        Ok(events.len() != before)
    }

    async fn latest_event(&self) -> ApiResult<Option<SavedEvent>> {
        // Ids are handed out in insertion order
        Ok(self.events.read().values().next_back().cloned())
    }

    async fn pending_events(&self, now: DateTime<Utc>) -> ApiResult<Vec<SavedEvent>> {
        Ok(self
            .events
            .read()
            .values()
            .filter(|e| e.start >= now)
            .cloned()
            .collect())
    }

    async fn mark_notified(
        &self,
        saved_event_id: i64,
        milestone: &str,
        at: DateTime<Utc>,
    ) -> ApiResult<bool> {
        let mut events = self.events.write();
        let Some(event) = events.get_mut(&saved_event_id) else {
            return Ok(false);
        };
        if event.notified.contains_key(milestone) {
            return Ok(false);
        }
        event.notified.insert(milestone.to_string(), at);
        Ok(true)
    }

    async fn aurora_subscribers(&self) -> ApiResult<Vec<UserProfile>> {
        let users = self.users.read();
        Ok(self
            .events
            .read()
            .values()
            .filter(|e| e.kind == EventType::Aurora)
            .filter_map(|e| users.get(&e.user_id).cloned())
            .collect())
    }

    async fn set_last_aurora_push(&self, user_id: &str, at: DateTime<Utc>) -> ApiResult<()> {
        if let Some(user) = self.users.write().get_mut(user_id) {
            user.last_aurora_push_at = Some(at);
        }
        Ok(())
    }

    async fn add_push_token(&self, user_id: &str, token: &str) -> ApiResult<bool> {
        let mut tokens = self.tokens.write();
        if tokens.contains_key(token) {
            return Ok(false);
        }
        tokens.insert(token.to_string(), user_id.to_string());
        Ok(true)
    }

    async fn push_tokens(&self, user_id: &str) -> ApiResult<Vec<String>> {
        let mut out: Vec<String> = self
            .tokens
            .read()
            .iter()
            .filter(|(_, owner)| owner.as_str() == user_id)
            .map(|(token, _)| token.clone())
            .collect();
        out.sort();
        Ok(out)
    }

    async fn remove_push_token(&self, token: &str) -> ApiResult<()> {
        self.tokens.write().remove(token);
        Ok(())
    }
}
