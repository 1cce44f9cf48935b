/// Static reference tables: moon phases, eclipses, meteor showers, comets, alignments
use crate::domain::{CelestialEvent, Confidence, EventType, VisibilityScope};
use crate::utils::{day_bounds, event_id, parse_utc};
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MoonInfo {
    pub phase: String,
    #[serde(default)]
    pub illumination: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MeteorShower {
    pub id: String,
    pub name: String,
    pub peak: NaiveDate,
    pub confidence: Confidence,
    pub source: String,
}

/// Loosely-typed catalog row for comets and alignments
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogEntry {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    pub start: String,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub visibility: Option<VisibilityScope>,
    #[serde(default)]
    pub confidence: Option<Confidence>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CatalogEntry {
    fn to_event(&self, kind: EventType) -> Option<CelestialEvent> {
        let start = parse_utc(&self.start)?;
        let end = match &self.end {
            Some(e) => parse_utc(e)?,
            None => start,
        };
        let id = self.id.clone().unwrap_or_else(|| {
            event_id(kind.as_str(), start.date_naive(), Some(&self.title))
        });

        Some(CelestialEvent {
            id,
            kind,
            title: self.title.clone(),
            subtitle: self.subtitle.clone(),
            start,
            end,
            visibility: self.visibility.unwrap_or(VisibilityScope::Global),
            confidence: self.confidence.unwrap_or(Confidence::Medium),
            source: self.source.clone().unwrap_or_else(|| "internal".to_string()),
            tags: self.tags.clone(),
            visibility_chance: None,
            data: None,
        })
    }
}

/// Solar and lunar eclipses, Jan 2026 to Jan 2028
const ECLIPSES: &[(&str, &str, &str, Confidence, &[&str])] = &[
    ("2026-02-17", "solar-annular", "Annular Solar Eclipse", Confidence::High, &["solar_eclipse", "annular"]),
    ("2026-03-03", "lunar-total", "Total Lunar Eclipse", Confidence::High, &["lunar_eclipse", "total"]),
    ("2026-08-12", "solar-total", "Total Solar Eclipse", Confidence::High, &["solar_eclipse", "total"]),
    ("2026-08-28", "lunar-partial", "Partial Lunar Eclipse", Confidence::Medium, &["lunar_eclipse", "partial"]),
    ("2027-02-06", "solar-annular", "Annular Solar Eclipse", Confidence::High, &["solar_eclipse", "annular"]),
    ("2027-02-20", "lunar-penumbral", "Penumbral Lunar Eclipse", Confidence::Low, &["lunar_eclipse", "penumbral"]),
    ("2027-08-02", "solar-total", "Total Solar Eclipse", Confidence::High, &["solar_eclipse", "total"]),
];

/// Read-only reference data, loaded once at startup and shared
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub moon: BTreeMap<NaiveDate, MoonInfo>,
    pub meteors: Vec<MeteorShower>,
    pub comets: Vec<CatalogEntry>,
    pub alignments: Vec<CatalogEntry>,
    pub eclipses: Vec<CelestialEvent>,
}

impl Catalog {
    /// Load catalog files from `dir`. Missing or malformed files leave that table empty.
    pub fn load(dir: &Path) -> Self {
        let raw_moon: BTreeMap<String, MoonInfo> = load_json(dir, "moon_phases.json");
        let moon = raw_moon
            .into_iter()
            .filter_map(|(date, info)| match date.parse::<NaiveDate>() {
                Ok(d) => Some((d, info)),
                Err(_) => {
                    warn!("skipping moon phase row with bad date {:?}", date);
                    None
                }
            })
            .collect();

        let catalog = Self {
            moon,
            meteors: load_json(dir, "meteor_showers.json"),
            comets: load_json(dir, "comets.json"),
            alignments: load_json(dir, "alignments.json"),
            eclipses: builtin_eclipses(),
        };

        info!(
            "Catalog loaded: {} moon days, {} meteor showers, {} comets, {} alignments, {} eclipses",
            catalog.moon.len(),
            catalog.meteors.len(),
            catalog.comets.len(),
            catalog.alignments.len(),
            catalog.eclipses.len()
        );
        catalog
    }

    pub fn eclipse_events(&self, now: DateTime<Utc>) -> Vec<CelestialEvent> {
        current(self.eclipses.clone(), now)
    }

    pub fn meteor_events(&self, now: DateTime<Utc>) -> Vec<CelestialEvent> {
        let events = self
            .meteors
            .iter()
            .map(|m| {
                let (start, end) = day_bounds(m.peak);
                CelestialEvent {
                    id: m.id.clone(),
                    kind: EventType::Meteor,
                    title: format!("{} Peak", m.name),
                    subtitle: None,
                    start,
                    end,
                    visibility: VisibilityScope::Global,
                    confidence: m.confidence,
                    source: m.source.clone(),
                    tags: vec!["meteor_shower".to_string(), m.name.to_lowercase()],
                    visibility_chance: None,
                    data: None,
                }
            })
            .collect();
        current(events, now)
    }

    pub fn comet_events(&self, now: DateTime<Utc>) -> Vec<CelestialEvent> {
        current(entries_to_events(&self.comets, EventType::Comet), now)
    }

    pub fn alignment_events(&self, now: DateTime<Utc>) -> Vec<CelestialEvent> {
        current(entries_to_events(&self.alignments, EventType::Alignment), now)
    }
}

fn builtin_eclipses() -> Vec<CelestialEvent> {
    ECLIPSES
        .iter()
        .filter_map(|(date, slug, title, confidence, tags)| {
            let date = date.parse::<NaiveDate>().ok()?;
            let (start, end) = day_bounds(date);
            Some(CelestialEvent {
                id: event_id("eclipse", date, Some(slug)),
                kind: EventType::Eclipse,
                title: title.to_string(),
                subtitle: None,
                start,
                end,
                visibility: VisibilityScope::Global,
                confidence: *confidence,
                source: "NASA Eclipse Catalog".to_string(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
                visibility_chance: None,
                data: None,
            })
        })
        .collect()
}

fn entries_to_events(entries: &[CatalogEntry], kind: EventType) -> Vec<CelestialEvent> {
    entries
        .iter()
        .filter_map(|e| {
            let event = e.to_event(kind);
            if event.is_none() {
                warn!("skipping {} catalog row {:?}: unparsable dates", kind, e.title);
            }
            event
        })
        .collect()
}

/// Drop events that ended more than a day before `now`
pub fn current(events: Vec<CelestialEvent>, now: DateTime<Utc>) -> Vec<CelestialEvent> {
    events.into_iter().filter(|e| e.is_current(now)).collect()
}

fn load_json<T: DeserializeOwned + Default>(dir: &Path, name: &str) -> T {
    let path = dir.join(name);
    let text = match std::fs::read_to_string(&path) {
        Ok(t) => t,
        Err(e) => {
            warn!("catalog file {} unavailable: {}", path.display(), e);
            return T::default();
        }
    };
    serde_json::from_str(&text).unwrap_or_else(|e| {
        warn!("catalog file {} is malformed: {}", path.display(), e);
        T::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn entry(title: &str, start: &str, end: Option<&str>) -> CatalogEntry {
        CatalogEntry {
            id: None,
            title: title.into(),
            subtitle: None,
            start: start.into(),
            end: end.map(String::from),
            visibility: None,
            confidence: None,
            source: None,
            tags: vec![],
        }
    }

    #[test]
    fn test_grace_window_boundary() {
        let now = Utc.with_ymd_and_hms(2030, 3, 10, 12, 0, 0).unwrap();
        let start = (now - Duration::hours(48)).to_rfc3339();
        let ended = (now - Duration::hours(25)).to_rfc3339();
        let ending = (now - Duration::hours(23)).to_rfc3339();
        let catalog = Catalog {
            comets: vec![
                entry("Gone", &start, Some(&ended)),
                entry("Lingering", &start, Some(&ending)),
            ],
            ..Default::default()
        };

        let events = catalog.comet_events(now);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Lingering");
    }

    #[test]
    fn test_entry_defaults_and_generated_id() {
        let ev = entry("Saturn Opposition", "2030-09-21", None)
            .to_event(EventType::Alignment)
            .unwrap();
        assert_eq!(ev.id, "alignment-2030-09-21-saturn-opposition");
        assert_eq!(ev.start, ev.end);
        assert_eq!(ev.visibility, VisibilityScope::Global);
        assert!(entry("Bad", "someday", None).to_event(EventType::Comet).is_none());
    }

    #[test]
    fn test_meteor_events_cover_peak_day() {
        let catalog = Catalog {
            meteors: vec![MeteorShower {
                id: "perseids-2030".into(),
                name: "Perseids".into(),
                peak: NaiveDate::from_ymd_opt(2030, 8, 12).unwrap(),
                confidence: Confidence::High,
                source: "IMO".into(),
            }],
            ..Default::default()
        };
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let events = catalog.meteor_events(now);
        assert_eq!(events[0].title, "Perseids Peak");
        assert_eq!(events[0].tags, vec!["meteor_shower", "perseids"]);
        assert_eq!(
            events[0].end,
            Utc.with_ymd_and_hms(2030, 8, 12, 23, 59, 59).unwrap()
        );
    }

    #[test]
    fn test_builtin_eclipse_ids() {
        let eclipses = builtin_eclipses();
        assert_eq!(eclipses.len(), ECLIPSES.len());
        assert_eq!(eclipses[0].id, "eclipse-2026-02-17-solar-annular");
    }

    #[test]
    fn test_load_tolerates_missing_and_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("comets.json"), "not json").unwrap();
        std::fs::write(
            dir.path().join("moon_phases.json"),
            r#"{"2030-01-01": {"phase": "Full Moon", "illumination": 1.0}, "garbage": {"phase": "New Moon"}}"#,
        )
        .unwrap();

        let catalog = Catalog::load(dir.path());
        assert!(catalog.comets.is_empty());
        assert!(catalog.meteors.is_empty());
        assert_eq!(catalog.moon.len(), 1);
        assert!(!catalog.eclipses.is_empty());
    }
}
