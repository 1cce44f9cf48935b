/// Utility functions
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Extract number from JSON value, accepting decimal strings
pub fn num(v: &Value) -> Option<f64> {
    if let Some(x) = v.as_f64() {
        return Some(x);
    }
    if let Some(s) = v.as_str() {
        return s.trim().parse::<f64>().ok().filter(|x| x.is_finite());
    }
    None
}

/// Parse a NOAA `time_tag` ("YYYY-MM-DD HH:MM:SS", always UTC)
pub fn parse_time_tag(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|ndt| Utc.from_utc_datetime(&ndt))
}

/// Parse a timestamp in any of the shapes upstream documents use.
/// Naive values are taken as UTC; a bare date means midnight UTC.
pub fn parse_utc(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = s.parse::<DateTime<Utc>>() {
        return Some(dt);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| Utc.from_utc_datetime(&ndt))
}

/// Start and end instants covering a whole UTC day
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    let end = date.and_hms_opt(23, 59, 59).unwrap_or_default();
    (Utc.from_utc_datetime(&start), Utc.from_utc_datetime(&end))
}

/// Lowercase, hyphen-separated slug
pub fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    out.trim_end_matches('-').to_string()
}

/// Deterministic event id built from type prefix, date and an optional slug
pub fn event_id(prefix: &str, date: NaiveDate, slug: Option<&str>) -> String {
    match slug.map(slugify).filter(|s| !s.is_empty()) {
        Some(slug) => format!("{}-{}-{}", prefix, date, slug),
        None => format!("{}-{}", prefix, date),
    }
}

/// Cache key for a weather grid cell (two decimal places)
pub fn grid_key(lat: f64, lon: f64) -> String {
    format!("weather_{:.2}_{:.2}", lat, lon)
}

/// Uppercase the first character only
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
