/// Moon phase events, traditional full-moon names and the daily moon window
use crate::catalog::Catalog;
use crate::domain::{CelestialEvent, Confidence, EventType, MoonDay, VisibilityScope};
use crate::utils::{day_bounds, event_id};
use chrono::{Datelike, Duration, NaiveDate};
use std::collections::BTreeMap;

const CARDINAL_PHASES: &[&str] = &["New Moon", "First Quarter", "Full Moon", "Last Quarter"];

/// Named moons that become events. Every full moon gets a name, but only
/// these are surfaced so users are not flooded with moon alerts.
const NOTEWORTHY_MOONS: &[&str] = &["Strawberry Moon", "Supermoon", "Micromoon"];

const BLUE_MOON: &str = "Blue Moon";

pub fn traditional_name(month: u32) -> &'static str {
    match month {
        1 => "Wolf Moon",
        2 => "Snow Moon",
        3 => "Worm Moon",
        4 => "Pink Moon",
        5 => "Flower Moon",
        6 => "Strawberry Moon",
        7 => "Buck Moon",
        8 => "Sturgeon Moon",
        9 => "Harvest Moon",
        10 => "Hunter’s Moon",
        11 => "Beaver Moon",
        12 => "Cold Moon",
        _ => "Full Moon",
    }
}

/// Name of every full moon in `[from, to]`; the second full moon of a
/// calendar month is a Blue Moon
fn full_moon_names(catalog: &Catalog, from: NaiveDate, to: NaiveDate) -> BTreeMap<NaiveDate, String> {
    let mut names = BTreeMap::new();
    let mut seen_in_month: BTreeMap<(i32, u32), usize> = BTreeMap::new();

    for (date, info) in catalog.moon.range(from..=to) {
        if info.phase != "Full Moon" {
            continue;
        }
        let count = seen_in_month.entry((date.year(), date.month())).or_insert(0);
        *count += 1;
        let name = if *count == 2 {
            BLUE_MOON
        } else {
            traditional_name(date.month())
        };
        names.insert(*date, name.to_string());
    }

    names
}

/// One event per transition into a cardinal phase. Days that repeat the
/// previous phase, and intermediate phases, produce nothing.
pub fn phase_change_events(catalog: &Catalog) -> Vec<CelestialEvent> {
    let mut events = Vec::new();
    let mut last_phase: Option<&str> = None;

    for (date, info) in &catalog.moon {
        let phase = info.phase.as_str();
        if last_phase != Some(phase) && CARDINAL_PHASES.contains(&phase) {
            let (start, end) = day_bounds(*date);
            events.push(CelestialEvent {
                id: event_id("moon", *date, None),
                kind: EventType::Moon,
                title: phase.to_string(),
                subtitle: None,
                start,
                end,
                visibility: VisibilityScope::Global,
                confidence: Confidence::High,
                source: "internal".to_string(),
                tags: vec![phase.to_lowercase().replace(' ', "_")],
                visibility_chance: None,
                data: None,
            });
        }
        last_phase = Some(phase);
    }

    events
}

/// Daily moon phases for the next `days`, with full-moon names attached
pub fn moon_window(catalog: &Catalog, today: NaiveDate, days: i64) -> Vec<MoonDay> {
    let end = today + Duration::days(days);
    let names = full_moon_names(catalog, today, end);

    catalog
        .moon
        .range(today..=end)
        .map(|(date, info)| MoonDay {
            date: *date,
            phase: info.phase.clone(),
            illumination: info.illumination,
            special: names.get(date).cloned(),
        })
        .collect()
}

/// Special named-moon events within the next `days`
pub fn special_moon_events(catalog: &Catalog, today: NaiveDate, days: i64) -> Vec<CelestialEvent> {
    let end = today + Duration::days(days);

    full_moon_names(catalog, today, end)
        .into_iter()
        .filter(|(_, name)| NOTEWORTHY_MOONS.contains(&name.as_str()))
        .map(|(date, name)| {
            let (start, end) = day_bounds(date);
            let mut tags = vec!["full_moon".to_string()];
            let subtitle = if name == BLUE_MOON {
                tags.push("blue_moon".to_string());
                "Second full moon of the month".to_string()
            } else {
                format!("{} full moon", date.format("%B"))
            };

            CelestialEvent {
                id: event_id("moon-special", date, None),
                kind: EventType::MoonSpecial,
                title: name,
                subtitle: Some(subtitle),
                start,
                end,
                visibility: VisibilityScope::Global,
                confidence: Confidence::High,
                source: "Lunar tradition".to_string(),
                tags,
                visibility_chance: None,
                data: None,
            }
        })
        .collect()
}
