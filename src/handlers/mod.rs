/// HTTP request handlers
use crate::domain::{
    AuroraForecast, CelestialEvent, EventType, Health, MoonDay, NewSavedEvent, PushMessage,
    SavedEvent, UserProfile, WeatherForecast,
};
use crate::errors::ApiError;
use crate::repo::EventStore;
use crate::services::calendar::render_ics;
use crate::services::moon::moon_window;
use crate::services::{deliver, EventService, KpForecastService, Notifier, WeatherService};
use crate::utils::parse_utc;
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

const MOON_WINDOW_DAYS: i64 = 30;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub events: Arc<EventService>,
    pub aurora: Arc<KpForecastService>,
    pub weather: Arc<WeatherService>,
    pub store: Arc<dyn EventStore>,
    pub notifier: Arc<dyn Notifier>,
    pub calendar_product: String,
}

/// Successful response wrapper
#[derive(Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub ok: bool,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self { ok: true, data }
    }
}

#[derive(Debug, Deserialize)]
pub struct LocationQuery {
    pub lat: Option<String>,
    pub lon: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventRef {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub title: Option<String>,
    pub start: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveEventRequest {
    pub user_id: Option<String>,
    pub event: Option<EventRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteEventRequest {
    pub user_id: Option<String>,
    pub event_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub user_id: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRequest {
    pub user_id: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub timezone: Option<String>,
}

fn parse_coord(name: &str, raw: Option<&str>) -> Result<Option<f64>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s
            .parse::<f64>()
            .map(Some)
            .map_err(|_| ApiError::invalid(format!("{} must be a number, got {:?}", name, s))),
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::invalid(format!("Missing {}", name)))
}

/// Health check handler
pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        now: Utc::now(),
    })
}

/// Daily moon phases for the next 30 days
pub async fn get_moon(State(state): State<AppState>) -> Json<Vec<MoonDay>> {
    let today = Utc::now().date_naive();
    Json(moon_window(state.events.catalog(), today, MOON_WINDOW_DAYS))
}

pub async fn get_moon_events(State(state): State<AppState>) -> Json<Vec<CelestialEvent>> {
    Json(state.events.moon_phase_events(Utc::now()))
}

pub async fn get_eclipses(State(state): State<AppState>) -> Json<Vec<CelestialEvent>> {
    Json(state.events.catalog().eclipse_events(Utc::now()))
}

pub async fn get_meteors(State(state): State<AppState>) -> Json<Vec<CelestialEvent>> {
    Json(state.events.catalog().meteor_events(Utc::now()))
}

pub async fn get_comets(State(state): State<AppState>) -> Json<Vec<CelestialEvent>> {
    Json(state.events.catalog().comet_events(Utc::now()))
}

pub async fn get_alignments(State(state): State<AppState>) -> Json<Vec<CelestialEvent>> {
    Json(state.events.catalog().alignment_events(Utc::now()))
}

/// Aurora outlook for `?lat=`
pub async fn get_aurora(
    Query(params): Query<LocationQuery>,
    State(state): State<AppState>,
) -> Result<Json<AuroraForecast>, ApiError> {
    let lat = parse_coord("lat", params.lat.as_deref())?.ok_or_else(|| {
        ApiError::invalid("lat query param is required, e.g. /api/aurora?lat=55.9")
    })?;
    let forecast = state.aurora.forecast_for(lat).await?;
    Ok(Json(forecast))
}

/// Weather passthrough for `?lat=&lon=`
pub async fn get_weather(
    Query(params): Query<LocationQuery>,
    State(state): State<AppState>,
) -> Result<Json<WeatherForecast>, ApiError> {
    let lat = parse_coord("lat", params.lat.as_deref())?;
    let lon = parse_coord("lon", params.lon.as_deref())?;
    let (Some(lat), Some(lon)) = (lat, lon) else {
        return Err(ApiError::invalid("lat and lon are required"));
    };
    let forecast = state.weather.forecast(lat, lon, Utc::now()).await?;
    Ok(Json(forecast))
}

/// Combined feed; a full `lat`/`lon` pair enables visibility and aurora
pub async fn get_upcoming(
    Query(params): Query<LocationQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<CelestialEvent>>, ApiError> {
    let lat = parse_coord("lat", params.lat.as_deref())?;
    let lon = parse_coord("lon", params.lon.as_deref())?;
    let location = lat.zip(lon);
    let events = state.events.upcoming(location, Utc::now()).await?;
    Ok(Json(events))
}

pub async fn list_user_events(
    Query(params): Query<UserQuery>,
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse<Value>>, ApiError> {
    let user_id = required(params.user_id, "userId")?;
    let events: Vec<SavedEvent> = state.store.list_events(&user_id).await?;
    Ok(Json(SuccessResponse::new(json!({ "events": events }))))
}

pub async fn save_user_event(
    State(state): State<AppState>,
    Json(req): Json<SaveEventRequest>,
) -> Result<Json<SuccessResponse<Value>>, ApiError> {
    let user_id = required(req.user_id, "userId")?;
    let event = req.event.ok_or_else(|| ApiError::invalid("Missing event"))?;

    let event_id = required(event.id, "event.id")?;
    let kind_raw = required(event.kind, "event.type")?;
    let kind = EventType::parse(&kind_raw)
        .ok_or_else(|| ApiError::invalid(format!("Unknown event type {:?}", kind_raw)))?;
    let title = required(event.title, "event.title")?;
    let start_raw = required(event.start, "event.start")?;
    let start = parse_utc(&start_raw)
        .ok_or_else(|| ApiError::invalid(format!("Unparsable event.start {:?}", start_raw)))?;

    let saved = state
        .store
        .save_event(
            &user_id,
            NewSavedEvent {
                event_id,
                kind,
                title,
                start,
            },
        )
        .await?;
    info!("user {} saved event {}", user_id, saved.event_id);

    Ok(Json(SuccessResponse::new(json!({ "event": saved }))))
}

pub async fn delete_user_event(
    State(state): State<AppState>,
    Json(req): Json<DeleteEventRequest>,
) -> Result<Json<SuccessResponse<Value>>, ApiError> {
    let user_id = required(req.user_id, "userId")?;
    let event_id = required(req.event_id, "eventId")?;
    let deleted = state.store.delete_event(&user_id, &event_id).await?;
    Ok(Json(SuccessResponse::new(json!({ "deleted": deleted }))))
}

pub async fn push_subscribe(
    State(state): State<AppState>,
    Json(req): Json<SubscribeRequest>,
) -> Result<Json<SuccessResponse<Value>>, ApiError> {
    let user_id = required(req.user_id, "userId")?;
    let token = required(req.token, "token")?;

    let message = if state.store.add_push_token(&user_id, &token).await? {
        "Token inserted"
    } else {
        "Token already exists"
    };
    Ok(Json(SuccessResponse::new(json!({ "message": message }))))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Json(req): Json<ProfileRequest>,
) -> Result<Json<SuccessResponse<Value>>, ApiError> {
    let user_id = required(req.user_id, "userId")?;
    if let Some(lat) = req.lat {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(ApiError::invalid("lat must be within [-90, 90]"));
        }
    }

    let profile = state
        .store
        .upsert_user(UserProfile {
            id: user_id,
            lat: req.lat,
            lon: req.lon,
            timezone: req.timezone,
            last_aurora_push_at: None,
        })
        .await?;
    Ok(Json(SuccessResponse::new(json!({ "profile": profile }))))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Json(req): Json<UserQuery>,
) -> Result<Json<SuccessResponse<Value>>, ApiError> {
    let user_id = required(req.user_id, "userId")?;
    state.store.delete_user(&user_id).await?;
    info!("deleted account {}", user_id);
    Ok(Json(SuccessResponse::new(
        json!({ "message": "Account deleted permanently" }),
    )))
}

/// iCalendar export. A user's saved copy wins over the catalog.
pub async fn export_calendar(
    Path(event_id): Path<String>,
    Query(params): Query<UserQuery>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let now = Utc::now();
    let mut found = None;

    if let Some(user_id) = params.user_id.as_deref().filter(|u| !u.is_empty()) {
        if let Some(saved) = state.store.find_event(user_id, &event_id).await? {
            found = Some((saved.event_id, saved.title, saved.start, saved.start));
        }
    }
    if found.is_none() {
        found = state
            .events
            .find(&event_id, now)
            .map(|e| (e.id, e.title, e.start, e.end));
    }

    let (id, title, start, end) =
        found.ok_or_else(|| ApiError::not_found(format!("Event {} not found", event_id)))?;
    let ics = render_ics(&id, &title, start, end, &state.calendar_product, now);

    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.ics\"", id),
            ),
        ],
        ics,
    )
        .into_response())
}

/// Send a reminder for the most recently saved event
pub async fn test_push(
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse<Value>>, ApiError> {
    let event = state
        .store
        .latest_event()
        .await?
        .ok_or_else(|| ApiError::invalid("No saved events found"))?;

    let message = PushMessage::new(
        format!("🌌 {}", event.title),
        "Saved event reminder. Tap to view details.",
    )
    .with_data("type", event.kind)
    .with_data("eventId", &event.event_id);

    let report = deliver(
        state.store.as_ref(),
        state.notifier.as_ref(),
        &event.user_id,
        &message,
    )
    .await?;

    Ok(Json(SuccessResponse::new(json!({
        "sentToUser": event.user_id,
        "eventId": event.event_id,
        "delivered": report.delivered,
    }))))
}
