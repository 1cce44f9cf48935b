/// iCalendar export for a single event
use chrono::{DateTime, Utc};

const ICS_TIME: &str = "%Y%m%dT%H%M%SZ";

/// Render a one-event VCALENDAR document with CRLF line endings
pub fn render_ics(
    id: &str,
    title: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    product: &str,
    now: DateTime<Utc>,
) -> String {
    let lines = [
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        format!("PRODID:-//{}//EN", product),
        "BEGIN:VEVENT".to_string(),
        format!("UID:{}@{}", id, product),
        format!("DTSTAMP:{}", now.format(ICS_TIME)),
        format!("DTSTART:{}", start.format(ICS_TIME)),
        format!("DTEND:{}", end.format(ICS_TIME)),
        format!("SUMMARY:{}", escape_text(title)),
        format!("DESCRIPTION:Saved from {}", product),
        "END:VEVENT".to_string(),
        "END:VCALENDAR".to_string(),
    ];

    let mut out = lines.join("\r\n");
    out.push_str("\r\n");
    out
}

/// Escape TEXT values per RFC 5545
fn escape_text(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}
