/// Application routes configuration
use crate::handlers::{
    delete_user, delete_user_event, export_calendar, get_alignments, get_aurora, get_comets,
    get_eclipses, get_meteors, get_moon, get_moon_events, get_upcoming, get_weather, health,
    list_user_events, push_subscribe, save_user_event, test_push, update_profile, AppState,
};
use axum::{
    routing::{get, post},
    Router,
};

/// Build the application router with all routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health))
        // Catalog and forecast endpoints
        .route("/api/moon", get(get_moon))
        .route("/api/moon/events", get(get_moon_events))
        .route("/api/eclipses", get(get_eclipses))
        .route("/api/meteors", get(get_meteors))
        .route("/api/comets", get(get_comets))
        .route("/api/alignments", get(get_alignments))
        .route("/api/aurora", get(get_aurora))
        .route("/api/weather", get(get_weather))
        .route("/api/upcoming", get(get_upcoming))
        .route("/api/calendar/:event_id", get(export_calendar))
        // User endpoints
        .route(
            "/api/user/events",
            get(list_user_events)
                .post(save_user_event)
                .delete(delete_user_event),
        )
        .route("/api/push/subscribe", post(push_subscribe))
        .route("/api/users/profile", post(update_profile))
        .route("/api/users/delete", post(delete_user))
        .route("/api/test-push", get(test_push))
        .with_state(state)
}
