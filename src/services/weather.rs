/// Night-weather lookups cached per grid cell
use crate::clients::WeatherSource;
use crate::domain::WeatherForecast;
use crate::errors::ApiResult;
use crate::repo::ForecastCache;
use crate::utils::grid_key;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::warn;

pub struct WeatherService {
    source: Arc<dyn WeatherSource>,
    cache: Arc<ForecastCache>,
    ttl: Duration,
}

impl WeatherService {
    pub fn new(source: Arc<dyn WeatherSource>, cache: Arc<ForecastCache>, ttl: Duration) -> Self {
        Self { source, cache, ttl }
    }

    pub async fn forecast(&self, lat: f64, lon: f64, now: DateTime<Utc>) -> ApiResult<WeatherForecast> {
        let key = grid_key(lat, lon);
        let cached = self.cache.read::<WeatherForecast>(&key).await;
        if let Some(entry) = &cached {
            if entry.is_fresh(self.ttl, now) {
                return Ok(entry.payload.clone());
            }
        }

        match self.source.fetch_weather(lat, lon).await {
            Ok(mut forecast) => {
                forecast.region = Some(detect_region(lat, lon).to_string());
                if let Err(e) = self.cache.write(&key, &forecast, now).await {
                    warn!("failed to persist weather cache {}: {}", key, e);
                }
                Ok(forecast)
            }
            Err(e) => match cached {
                Some(entry) => {
                    warn!("weather upstream failed ({}), serving stale {}", e, key);
                    Ok(entry.payload)
                }
                None => Err(e),
            },
        }
    }
}

/// Coarse provider region for a coordinate
pub fn detect_region(lat: f64, lon: f64) -> &'static str {
    if (24.0..=49.0).contains(&lat) && (-125.0..=-66.0).contains(&lon) {
        "US"
    } else if (49.0..=61.0).contains(&lat) && (-11.0..=2.0).contains(&lon) {
        "UK"
    } else if (36.0..=71.0).contains(&lat) && (-10.0..=40.0).contains(&lon) {
        "EU"
    } else {
        "GLOBAL"
    }
}
