/// Domain models for sky events, forecasts and reminders
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Kind of sky event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Meteor,
    Eclipse,
    Comet,
    Alignment,
    Moon,
    MoonSpecial,
    Aurora,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Meteor => "meteor",
            EventType::Eclipse => "eclipse",
            EventType::Comet => "comet",
            EventType::Alignment => "alignment",
            EventType::Moon => "moon",
            EventType::MoonSpecial => "moon_special",
            EventType::Aurora => "aurora",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "meteor" => Some(EventType::Meteor),
            "eclipse" => Some(EventType::Eclipse),
            "comet" => Some(EventType::Comet),
            "alignment" => Some(EventType::Alignment),
            "moon" => Some(EventType::Moon),
            "moon_special" => Some(EventType::MoonSpecial),
            "aurora" => Some(EventType::Aurora),
            _ => None,
        }
    }

    /// Lead-time reminders for saved events of this type, largest lead first.
    ///
    /// Aurora reminders are driven by the forecast loop instead, and special
    /// moons never had reminders, so both return an empty schedule.
    pub fn reminders(&self) -> &'static [Reminder] {
        match self {
            EventType::Meteor => METEOR_REMINDERS,
            EventType::Eclipse | EventType::Comet | EventType::Alignment => MAJOR_REMINDERS,
            EventType::Moon => MOON_REMINDERS,
            EventType::MoonSpecial | EventType::Aurora => &[],
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single lead-time milestone before an event starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reminder {
    /// Stable marker key stored alongside the saved event
    pub key: &'static str,
    pub lead_minutes: i64,
    pub body: &'static str,
}

impl Reminder {
    pub fn lead(&self) -> Duration {
        Duration::minutes(self.lead_minutes)
    }

    /// Instant at which this milestone becomes due for an event starting at `start`
    pub fn due_at(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        start - self.lead()
    }
}

const METEOR_REMINDERS: &[Reminder] = &[
    Reminder {
        key: "12h",
        lead_minutes: 12 * 60,
        body: "Meteor shower peak in ~12 hours.",
    },
    Reminder {
        key: "1h",
        lead_minutes: 60,
        body: "Meteor shower peak in ~1 hour.",
    },
];

const MAJOR_REMINDERS: &[Reminder] = &[
    Reminder {
        key: "24h",
        lead_minutes: 24 * 60,
        body: "Event begins in ~24 hours.",
    },
    Reminder {
        key: "1h",
        lead_minutes: 60,
        body: "Event begins in ~1 hour.",
    },
];

const MOON_REMINDERS: &[Reminder] = &[Reminder {
    key: "1h",
    lead_minutes: 60,
    body: "Moon phase happening in ~1 hour.",
}];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityScope {
    Global,
    Regional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Normalized sky event returned by every list endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CelestialEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EventType,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub visibility: VisibilityScope,
    pub confidence: Confidence,
    pub source: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Per-request annotation, depends on the caller's location and weather
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility_chance: Option<VisibilityEstimate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CelestialEvent {
    /// Still worth showing: not ended more than a day ago
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.end + Duration::hours(24) >= now
    }
}

/// One row of the planetary K-index forecast
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpSample {
    #[serde(skip)]
    pub time: DateTime<Utc>,
    pub time_tag: String,
    pub kp: f64,
    pub status: Option<String>,
    pub noaa_scale: Option<String>,
}

/// Raw upstream K-index document: header row followed by sample rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KpForecastTable(pub Vec<Value>);

/// Forecast document together with the time it was fetched
#[derive(Debug, Clone)]
pub struct KpSnapshot {
    pub table: KpForecastTable,
    pub cached_at: Option<DateTime<Utc>>,
}

/// Aurora outlook for an observer latitude
#[derive(Debug, Clone, Serialize)]
pub struct AuroraForecast {
    pub lat: f64,
    pub required_kp: u8,
    pub kp_max_next_24h: Option<f64>,
    pub peak: Option<KpSample>,
    pub likely: bool,
    pub next_possible: Option<DateTime<Utc>>,
    pub message: String,
    pub source: String,
    pub cached_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityEstimate {
    pub chance: u8,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherHour {
    pub time: DateTime<Utc>,
    pub cloud: f64,
    pub precip: f64,
    pub is_night: bool,
}

/// Normalized hourly weather for one grid cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherForecast {
    pub provider: String,
    pub generated_at: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub region: Option<String>,
    pub hours: Vec<WeatherHour>,
}

/// Moon phase for a single day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoonDay {
    pub date: NaiveDate,
    pub phase: String,
    pub illumination: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special: Option<String>,
}

/// A user's reference to an event, with its reminder markers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavedEvent {
    pub id: i64,
    pub user_id: String,
    pub event_id: String,
    #[serde(rename = "type")]
    pub kind: EventType,
    pub title: String,
    pub start: DateTime<Utc>,
    /// Milestone key -> instant the reminder was sent. Entries are never removed.
    pub notified: BTreeMap<String, DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SavedEvent {
    pub fn is_notified(&self, milestone: &str) -> bool {
        self.notified.contains_key(milestone)
    }

    pub fn fully_notified(&self) -> bool {
        self.kind
            .reminders()
            .iter()
            .all(|r| self.is_notified(r.key))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewSavedEvent {
    pub event_id: String,
    #[serde(rename = "type")]
    pub kind: EventType,
    pub title: String,
    pub start: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub timezone: Option<String>,
    pub last_aurora_push_at: Option<DateTime<Utc>>,
}

/// Notification handed to a push transport
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

impl PushMessage {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            data: BTreeMap::new(),
        }
    }

    pub fn with_data(mut self, key: &str, value: impl ToString) -> Self {
        self.data.insert(key.to_string(), value.to_string());
        self
    }
}

/// Outcome of one dispatch attempt across a user's endpoints
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub dead_endpoints: Vec<String>,
}

/// Health check response
#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub now: DateTime<Utc>,
}
