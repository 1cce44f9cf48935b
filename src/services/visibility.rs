/// Heuristic visibility chance from event type and local night weather
use crate::domain::{CelestialEvent, EventType, VisibilityEstimate, WeatherForecast};
use crate::utils::capitalize;
use chrono::Duration;

/// Events starting further out than this are not annotated
pub const VISIBILITY_WINDOW_DAYS: i64 = 28;

pub fn base_chance(kind: EventType) -> i32 {
    match kind {
        EventType::Meteor => 65,
        EventType::Eclipse => 80,
        EventType::Comet => 55,
        EventType::Aurora => 70,
        _ => 50,
    }
}

/// Mean cloud cover and precipitation probability over night hours between
/// the event start and one day past its end
pub fn night_stats(event: &CelestialEvent, weather: &WeatherForecast) -> Option<(f64, f64)> {
    let until = event.end + Duration::days(1);
    let relevant: Vec<_> = weather
        .hours
        .iter()
        .filter(|h| h.is_night && event.start <= h.time && h.time <= until)
        .collect();

    if relevant.is_empty() {
        return None;
    }

    let n = relevant.len() as f64;
    let cloud = relevant.iter().map(|h| h.cloud).sum::<f64>() / n;
    let precip = relevant.iter().map(|h| h.precip).sum::<f64>() / n;
    Some((cloud, precip))
}

pub fn score(event: &CelestialEvent, weather: &WeatherForecast) -> VisibilityEstimate {
    let base = base_chance(event.kind);
    let mut chance = base;
    let mut reasons: Vec<&str> = Vec::new();

    if let Some((cloud, precip)) = night_stats(event, weather) {
        let (delta, phrase) = if cloud < 20.0 {
            (15, "clear skies expected")
        } else if cloud < 50.0 {
            (5, "partly cloudy skies")
        } else if cloud < 75.0 {
            (-10, "mostly cloudy")
        } else {
            (-25, "heavy cloud cover")
        };
        chance += delta;
        reasons.push(phrase);

        if precip > 40.0 {
            chance -= 20;
            reasons.push("rain likely");
        } else if precip > 20.0 {
            chance -= 10;
            reasons.push("chance of rain");
        }
    }

    let reason = if reasons.is_empty() {
        "visibility uncertain".to_string()
    } else {
        capitalize(&reasons.join(", "))
    };

    VisibilityEstimate {
        chance: chance.clamp(0, 100) as u8,
        reason,
    }
}
