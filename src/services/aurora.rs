/// Planetary K-index forecast with bounded-staleness caching
use crate::clients::KpSource;
use crate::domain::{AuroraForecast, KpForecastTable, KpSample, KpSnapshot};
use crate::errors::{ApiError, ApiResult};
use crate::repo::ForecastCache;
use crate::utils::{num, parse_time_tag};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub const KP_CACHE_KEY: &str = "kp_forecast";
const KP_SOURCE_LABEL: &str = "NOAA SWPC";

pub struct KpForecastService {
    source: Arc<dyn KpSource>,
    cache: Arc<ForecastCache>,
    ttl: Duration,
}

impl KpForecastService {
    pub fn new(source: Arc<dyn KpSource>, cache: Arc<ForecastCache>, ttl: Duration) -> Self {
        Self { source, cache, ttl }
    }

    /// Current forecast table. Serves the cache while fresh; when the upstream
    /// fails, serves whatever was cached last regardless of age.
    pub async fn forecast(&self, now: DateTime<Utc>) -> ApiResult<KpSnapshot> {
        let cached = self.cache.read::<KpForecastTable>(KP_CACHE_KEY).await;
        if let Some(entry) = &cached {
            if entry.is_fresh(self.ttl, now) {
                return Ok(KpSnapshot {
                    table: entry.payload.clone(),
                    cached_at: Some(entry.cached_at),
                });
            }
        }

        match self.source.fetch_table().await.and_then(validate_table) {
            Ok(table) => {
                if let Err(e) = self.cache.write(KP_CACHE_KEY, &table, now).await {
                    warn!("failed to persist kp forecast cache: {}", e);
                }
                Ok(KpSnapshot {
                    table,
                    cached_at: Some(now),
                })
            }
            Err(e) => match cached {
                Some(entry) => {
                    warn!(
                        "kp forecast upstream failed ({}), serving cache from {}",
                        e, entry.cached_at
                    );
                    Ok(KpSnapshot {
                        table: entry.payload,
                        cached_at: Some(entry.cached_at),
                    })
                }
                None => Err(e),
            },
        }
    }

    pub async fn forecast_for(&self, lat: f64) -> ApiResult<AuroraForecast> {
        self.forecast_for_at(lat, Utc::now()).await
    }

    pub async fn forecast_for_at(&self, lat: f64, now: DateTime<Utc>) -> ApiResult<AuroraForecast> {
        let snapshot = self.forecast(now).await?;
        Ok(build_forecast(lat, &snapshot, now))
    }
}

/// A table with no usable sample would replace a good cache with nothing
fn validate_table(table: KpForecastTable) -> ApiResult<KpForecastTable> {
    if samples(&table).next().is_none() {
        return Err(ApiError::UpstreamPayload {
            source_name: KP_SOURCE_LABEL.to_string(),
            reason: format!("no parsable Kp rows in {} row(s)", table.0.len()),
        });
    }
    Ok(table)
}

/// Minimum K-index for a chance of aurora at this latitude (either hemisphere)
pub fn required_index(lat: f64) -> u8 {
    let a = lat.abs();
    if a >= 67.0 {
        3
    } else if a >= 63.0 {
        4
    } else if a >= 60.0 {
        5
    } else if a >= 57.0 {
        6
    } else if a >= 54.0 {
        7
    } else if a >= 50.0 {
        8
    } else {
        9
    }
}

fn parse_sample(row: &Value) -> Option<KpSample> {
    let cols = row.as_array()?;
    let time = parse_time_tag(cols.first()?.as_str()?)?;
    let kp = num(cols.get(1)?)?;
    let text = |v: Option<&Value>| match v {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    Some(KpSample {
        time,
        time_tag: time.format("%Y-%m-%d %H:%M:%SZ").to_string(),
        kp,
        status: text(cols.get(2)),
        noaa_scale: text(cols.get(3)),
    })
}

/// Samples in document order, header and malformed rows skipped
pub fn samples(table: &KpForecastTable) -> impl Iterator<Item = KpSample> + '_ {
    table.0.iter().skip(1).filter_map(|row| {
        let sample = parse_sample(row);
        if sample.is_none() {
            debug!("skipping malformed kp row: {}", row);
        }
        sample
    })
}

/// Highest K-index within `[now, now + 24h]` and the first sample reaching it
pub fn summarize_next_24h(
    table: &KpForecastTable,
    now: DateTime<Utc>,
) -> (Option<f64>, Option<KpSample>) {
    let cutoff = now + Duration::hours(24);
    let mut peak: Option<KpSample> = None;

    for sample in samples(table).filter(|s| now <= s.time && s.time <= cutoff) {
        if peak.as_ref().map_or(true, |p| sample.kp > p.kp) {
            peak = Some(sample);
        }
    }

    (peak.as_ref().map(|p| p.kp), peak)
}

/// First strictly-future sample meeting the requirement. Scans in document
/// order; the upstream does not guarantee sorted rows.
pub fn next_possible(
    table: &KpForecastTable,
    now: DateTime<Utc>,
    required: u8,
) -> Option<DateTime<Utc>> {
    samples(table)
        .find(|s| s.time > now && s.kp >= f64::from(required))
        .map(|s| s.time)
}

pub fn build_forecast(lat: f64, snapshot: &KpSnapshot, now: DateTime<Utc>) -> AuroraForecast {
    let required_kp = required_index(lat);
    let (max_kp, peak) = summarize_next_24h(&snapshot.table, now);
    let next = next_possible(&snapshot.table, now, required_kp);

    let likely = max_kp.map_or(false, |kp| kp >= f64::from(required_kp));
    let message = match max_kp {
        None => "No Kp forecast available right now.".to_string(),
        Some(kp) if likely => format!(
            "High chance tonight/next 24h (Kp max {:.2} ≥ {})",
            kp, required_kp
        ),
        Some(kp) => format!("Low chance (Kp max {:.2} < {})", kp, required_kp),
    };

    AuroraForecast {
        lat,
        required_kp,
        kp_max_next_24h: max_kp,
        peak,
        likely,
        next_possible: next,
        message,
        source: KP_SOURCE_LABEL.to_string(),
        cached_at: snapshot.cached_at,
    }
}
