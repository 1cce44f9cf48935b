/// Record store seam: users, saved events, reminder markers and push tokens
use crate::domain::{NewSavedEvent, SavedEvent, UserProfile};
use crate::errors::ApiResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Backing store for all mutable user state.
///
/// Implementations must give read-after-write consistency; the scheduler
/// re-reads everything it needs on every cycle.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Create or update a user's location profile. Keeps `last_aurora_push_at`.
    async fn upsert_user(&self, profile: UserProfile) -> ApiResult<UserProfile>;

    async fn get_user(&self, user_id: &str) -> ApiResult<Option<UserProfile>>;

    /// Remove a user with all saved events, markers and push tokens
    async fn delete_user(&self, user_id: &str) -> ApiResult<()>;

    async fn save_event(&self, user_id: &str, event: NewSavedEvent) -> ApiResult<SavedEvent>;

    async fn list_events(&self, user_id: &str) -> ApiResult<Vec<SavedEvent>>;

    async fn find_event(&self, user_id: &str, event_id: &str) -> ApiResult<Option<SavedEvent>>;

    /// Returns whether anything was deleted
    async fn delete_event(&self, user_id: &str, event_id: &str) -> ApiResult<bool>;

    /// Most recently saved event across all users
    async fn latest_event(&self) -> ApiResult<Option<SavedEvent>>;

    /// Saved events that have not started yet
    async fn pending_events(&self, now: DateTime<Utc>) -> ApiResult<Vec<SavedEvent>>;

    /// Record that a milestone fired. Write-once: returns false and leaves the
    /// existing marker untouched if it was already set.
    async fn mark_notified(
        &self,
        saved_event_id: i64,
        milestone: &str,
        at: DateTime<Utc>,
    ) -> ApiResult<bool>;

    /// Owners of saved aurora events, one entry per saved row
    async fn aurora_subscribers(&self) -> ApiResult<Vec<UserProfile>>;

    async fn set_last_aurora_push(&self, user_id: &str, at: DateTime<Utc>) -> ApiResult<()>;

    /// Returns false if the token was already registered
    async fn add_push_token(&self, user_id: &str, token: &str) -> ApiResult<bool>;

    async fn push_tokens(&self, user_id: &str) -> ApiResult<Vec<String>>;

    async fn remove_push_token(&self, token: &str) -> ApiResult<()>;
}
