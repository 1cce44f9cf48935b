/// Combined event feed: catalogs, synthesized moons and aurora, visibility annotations
use crate::catalog::{current, Catalog};
use crate::domain::{
    AuroraForecast, CelestialEvent, Confidence, EventType, VisibilityScope, WeatherForecast,
};
use crate::errors::ApiResult;
use crate::services::aurora::KpForecastService;
use crate::services::moon::{phase_change_events, special_moon_events};
use crate::services::visibility::{score, VISIBILITY_WINDOW_DAYS};
use crate::services::weather::WeatherService;
use crate::utils::day_bounds;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

/// Response-size bound for the upcoming feed
pub const UPCOMING_LIMIT: usize = 50;
/// How far ahead special moons are looked up
pub const SPECIAL_MOON_DAYS: i64 = 60;

pub struct EventService {
    catalog: Arc<Catalog>,
    aurora: Arc<KpForecastService>,
    weather: Arc<WeatherService>,
}

impl EventService {
    pub fn new(
        catalog: Arc<Catalog>,
        aurora: Arc<KpForecastService>,
        weather: Arc<WeatherService>,
    ) -> Self {
        Self {
            catalog,
            aurora,
            weather,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn special_moons(&self, now: DateTime<Utc>) -> Vec<CelestialEvent> {
        current(
            special_moon_events(&self.catalog, now.date_naive(), SPECIAL_MOON_DAYS),
            now,
        )
    }

    pub fn moon_phase_events(&self, now: DateTime<Utc>) -> Vec<CelestialEvent> {
        current(phase_change_events(&self.catalog), now)
    }

    /// Static catalog events plus special moons, past events dropped
    pub fn catalog_events(&self, now: DateTime<Utc>) -> Vec<CelestialEvent> {
        let mut events = Vec::new();
        events.extend(self.catalog.eclipse_events(now));
        events.extend(self.catalog.meteor_events(now));
        events.extend(self.catalog.comet_events(now));
        events.extend(self.special_moons(now));
        events.extend(self.catalog.alignment_events(now));
        events
    }

    /// Look up any known event by id, including moon phase changes
    pub fn find(&self, event_id: &str, now: DateTime<Utc>) -> Option<CelestialEvent> {
        self.catalog_events(now)
            .into_iter()
            .chain(self.moon_phase_events(now))
            .find(|e| e.id == event_id)
    }

    /// Upcoming feed. With a location, weather and the aurora forecast are
    /// folded in; failures of either only drop that enrichment.
    pub async fn upcoming(
        &self,
        location: Option<(f64, f64)>,
        now: DateTime<Utc>,
    ) -> ApiResult<Vec<CelestialEvent>> {
        let mut events = self.catalog_events(now);
        let mut weather = None;

        if let Some((lat, lon)) = location {
            match self.weather.forecast(lat, lon, now).await {
                Ok(w) => weather = Some(w),
                Err(e) => warn!("upcoming: weather unavailable for {},{}: {}", lat, lon, e),
            }

            match self.aurora.forecast_for_at(lat, now).await {
                Ok(forecast) => events.extend(aurora_event(&forecast, now)),
                Err(e) => warn!("upcoming: aurora forecast unavailable: {}", e),
            }
        }

        Ok(rank(events, weather.as_ref(), now))
    }
}

/// Synthesize the "aurora likely" event, dated at the forecast peak
pub fn aurora_event(forecast: &AuroraForecast, now: DateTime<Utc>) -> Option<CelestialEvent> {
    if !forecast.likely {
        return None;
    }

    let peak_day = forecast.peak.as_ref().map(|p| p.time.date_naive());
    let (id, (start, end)) = match peak_day {
        Some(day) => (format!("aurora-{}", day), day_bounds(day)),
        None => ("aurora-today".to_string(), (now, now)),
    };
    let subtitle = match &forecast.peak {
        Some(p) => format!(
            "Lat {}° · Kp {} (need ≥ {})",
            forecast.lat, p.kp, forecast.required_kp
        ),
        None => format!("Lat {}°", forecast.lat),
    };

    Some(CelestialEvent {
        id,
        kind: EventType::Aurora,
        title: "Aurora likely tonight in your area".to_string(),
        subtitle: Some(subtitle),
        start,
        end,
        visibility: VisibilityScope::Regional,
        confidence: Confidence::Medium,
        source: forecast.source.clone(),
        tags: vec!["aurora".to_string(), "space_weather".to_string()],
        visibility_chance: None,
        data: serde_json::to_value(forecast).ok(),
    })
}

/// Drop finished events, annotate near-term ones, sort by start and cap
pub fn rank(
    events: Vec<CelestialEvent>,
    weather: Option<&WeatherForecast>,
    now: DateTime<Utc>,
) -> Vec<CelestialEvent> {
    let mut out: Vec<CelestialEvent> = events
        .into_iter()
        .filter(|e| e.is_current(now))
        .map(|mut e| {
            if let Some(w) = weather {
                if (e.start - now).num_days() <= VISIBILITY_WINDOW_DAYS {
                    e.visibility_chance = Some(score(&e, w));
                }
            }
            e
        })
        .collect();

    out.sort_by_key(|e| e.start);
    out.truncate(UPCOMING_LIMIT);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogEntry, MoonInfo};
    use crate::clients::{KpSource, WeatherSource};
    use crate::domain::{KpForecastTable, WeatherHour};
    use crate::errors::ApiError;
    use crate::domain::KpSnapshot;
    use crate::repo::ForecastCache;
    use crate::services::aurora::build_forecast;
    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate, TimeZone};
    use serde_json::json;

    struct FixedKp(KpForecastTable);

    #[async_trait]
    impl KpSource for FixedKp {
        async fn fetch_table(&self) -> ApiResult<KpForecastTable> {
            Ok(self.0.clone())
        }
    }

    struct DownWeather;

    #[async_trait]
    impl WeatherSource for DownWeather {
        async fn fetch_weather(&self, _lat: f64, _lon: f64) -> ApiResult<WeatherForecast> {
            Err(ApiError::Internal("offline".into()))
        }
    }

    struct ClearWeather;

    #[async_trait]
    impl WeatherSource for ClearWeather {
        async fn fetch_weather(&self, lat: f64, lon: f64) -> ApiResult<WeatherForecast> {
            let base = now();
            Ok(WeatherForecast {
                provider: "stub".into(),
                generated_at: base,
                lat,
                lon,
                region: None,
                hours: (0..(24 * 16))
                    .map(|h| WeatherHour {
                        time: base + Duration::hours(h),
                        cloud: 5.0,
                        precip: 0.0,
                        is_night: true,
                    })
                    .collect(),
            })
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 1, 0, 0, 0).unwrap()
    }

    fn comet(title: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> CatalogEntry {
        CatalogEntry {
            id: None,
            title: title.into(),
            subtitle: None,
            start: start.to_rfc3339(),
            end: Some(end.to_rfc3339()),
            visibility: None,
            confidence: Some(Confidence::High),
            source: None,
            tags: vec![],
        }
    }

    fn kp_table(kp: &str) -> KpForecastTable {
        KpForecastTable(vec![
            json!(["time_tag", "kp", "observed", "noaa_scale"]),
            json!(["2030-06-01 03:00:00", kp, "predicted", null]),
        ])
    }

    fn service(
        dir: &std::path::Path,
        catalog: Catalog,
        kp: &str,
        weather: Arc<dyn WeatherSource>,
    ) -> EventService {
        let cache = Arc::new(ForecastCache::new(dir));
        let aurora = Arc::new(KpForecastService::new(
            Arc::new(FixedKp(kp_table(kp))),
            cache.clone(),
            Duration::hours(1),
        ));
        let weather = Arc::new(WeatherService::new(weather, cache, Duration::hours(1)));
        EventService::new(Arc::new(catalog), aurora, weather)
    }

    fn sample_catalog() -> Catalog {
        let n = now();
        Catalog {
            comets: vec![
                comet("Later Comet", n + Duration::days(40), n + Duration::days(41)),
                comet("Soon Comet", n + Duration::days(2), n + Duration::days(3)),
                comet("Past Comet", n - Duration::days(5), n - Duration::hours(25)),
            ],
            moon: [(
                NaiveDate::from_ymd_opt(2030, 6, 15).unwrap(),
                MoonInfo {
                    phase: "Full Moon".into(),
                    illumination: Some(1.0),
                },
            )]
            .into_iter()
            .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_upcoming_without_location() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), sample_catalog(), "9.0", Arc::new(ClearWeather));

        let events = svc.upcoming(None, now()).await.unwrap();
        let titles: Vec<_> = events.iter().map(|e| e.title.as_str()).collect();

        assert_eq!(titles, vec!["Soon Comet", "Strawberry Moon", "Later Comet"]);
        assert!(events.iter().all(|e| e.visibility_chance.is_none()));
        assert!(events.iter().all(|e| e.kind != EventType::Aurora));
    }

    #[tokio::test]
    async fn test_upcoming_with_location_annotates_and_adds_aurora() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), sample_catalog(), "6.0", Arc::new(ClearWeather));

        let events = svc.upcoming(Some((65.0, 20.0)), now()).await.unwrap();

        let aurora = events.iter().find(|e| e.kind == EventType::Aurora).unwrap();
        assert_eq!(aurora.id, "aurora-2030-06-01");
        assert_eq!(aurora.visibility, VisibilityScope::Regional);
        assert_eq!(aurora.visibility_chance.as_ref().unwrap().chance, 85);

        let soon = events.iter().find(|e| e.title == "Soon Comet").unwrap();
        assert_eq!(soon.visibility_chance.as_ref().unwrap().chance, 70);

        // Beyond the 28-day window
        let later = events.iter().find(|e| e.title == "Later Comet").unwrap();
        assert!(later.visibility_chance.is_none());
    }

    #[tokio::test]
    async fn test_upcoming_degrades_when_weather_is_down() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), sample_catalog(), "2.0", Arc::new(DownWeather));

        let events = svc.upcoming(Some((65.0, 20.0)), now()).await.unwrap();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.visibility_chance.is_none()));
    }

    #[tokio::test]
    async fn test_find_includes_moon_phase_events() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), sample_catalog(), "2.0", Arc::new(DownWeather));
        assert!(svc.find("moon-2030-06-15", now()).is_some());
        assert!(svc.find("moon-special-2030-06-15", now()).is_some());
        assert!(svc.find("nope", now()).is_none());
    }

    #[test]
    fn test_rank_caps_and_sorts() {
        let n = now();
        let events: Vec<_> = (0..60)
            .rev()
            .map(|i| plain_event(&format!("c{}", i), n + Duration::days(i)))
            .collect();
        let ranked = rank(events, None, n);
        assert_eq!(ranked.len(), UPCOMING_LIMIT);
        assert_eq!(ranked[0].title, "c0");
        assert!(ranked.windows(2).all(|w| w[0].start <= w[1].start));
    }

    #[test]
    fn test_aurora_event_requires_likely() {
        let snap = KpSnapshot {
            table: kp_table("2.0"),
            cached_at: None,
        };
        let f = build_forecast(65.0, &snap, now());
        assert!(aurora_event(&f, now()).is_none());

        let snap = KpSnapshot {
            table: kp_table("6.0"),
            cached_at: None,
        };
        let f = build_forecast(65.0, &snap, now());
        let ev = aurora_event(&f, now()).unwrap();
        assert_eq!(ev.subtitle.as_deref(), Some("Lat 65° · Kp 6 (need ≥ 4)"));
        assert!(ev.data.is_some());
    }

    fn plain_event(title: &str, start: DateTime<Utc>) -> CelestialEvent {
        CelestialEvent {
            id: title.to_string(),
            kind: EventType::Comet,
            title: title.to_string(),
            subtitle: None,
            start,
            end: start,
            visibility: VisibilityScope::Global,
            confidence: Confidence::High,
            source: "test".into(),
            tags: vec![],
            visibility_chance: None,
            data: None,
        }
    }
}
