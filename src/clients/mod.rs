/// External API clients module
use crate::domain::{KpForecastTable, PushMessage, WeatherForecast, WeatherHour};
use crate::errors::{ApiError, ApiResult};
use crate::utils::{num, parse_utc};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// HTTP client wrapper with common configuration
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("skywatch/1.0")
            .build()?;
        Ok(Self { client })
    }

    pub fn get_client(&self) -> &Client {
        &self.client
    }
}

fn ensure_success(resp: Response, source_name: &str) -> ApiResult<Response> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        Err(ApiError::UpstreamStatus {
            source_name: source_name.to_string(),
            status: resp.status().as_u16(),
        })
    }
}

/// Source of the planetary K-index forecast document
#[async_trait]
pub trait KpSource: Send + Sync {
    async fn fetch_table(&self) -> ApiResult<KpForecastTable>;
}

/// Source of normalized hourly weather for a location
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn fetch_weather(&self, lat: f64, lon: f64) -> ApiResult<WeatherForecast>;
}

/// NOAA SWPC planetary K-index forecast client
pub struct KpClient {
    http_client: HttpClient,
    url: String,
}

impl KpClient {
    pub fn new(url: String, timeout: Duration) -> ApiResult<Self> {
        Ok(Self {
            http_client: HttpClient::new(timeout)?,
            url,
        })
    }
}

#[async_trait]
impl KpSource for KpClient {
    async fn fetch_table(&self) -> ApiResult<KpForecastTable> {
        let resp = self.http_client.get_client().get(&self.url).send().await?;
        let table = ensure_success(resp, "kp forecast")?.json().await?;
        Ok(table)
    }
}

/// Open-Meteo hourly forecast client
pub struct OpenMeteoClient {
    http_client: HttpClient,
    url: String,
}

impl OpenMeteoClient {
    pub fn new(url: String, timeout: Duration) -> ApiResult<Self> {
        Ok(Self {
            http_client: HttpClient::new(timeout)?,
            url,
        })
    }
}

#[async_trait]
impl WeatherSource for OpenMeteoClient {
    async fn fetch_weather(&self, lat: f64, lon: f64) -> ApiResult<WeatherForecast> {
        let resp = self
            .http_client
            .get_client()
            .get(&self.url)
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                (
                    "hourly",
                    "cloudcover,precipitation_probability".to_string(),
                ),
                ("daily", "sunrise,sunset".to_string()),
                ("timezone", "UTC".to_string()),
            ])
            .send()
            .await?;

        let raw: OpenMeteoResponse = ensure_success(resp, "weather")?.json().await?;
        Ok(normalize_open_meteo(raw, lat, lon, Utc::now()))
    }
}

#[derive(Debug, Deserialize)]
pub struct OpenMeteoResponse {
    pub hourly: OpenMeteoHourly,
    pub daily: OpenMeteoDaily,
}

#[derive(Debug, Deserialize)]
pub struct OpenMeteoHourly {
    pub time: Vec<String>,
    pub cloudcover: Vec<Value>,
    pub precipitation_probability: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct OpenMeteoDaily {
    pub sunrise: Vec<String>,
    pub sunset: Vec<String>,
}

/// Flatten an Open-Meteo document into night-flagged hours.
/// An hour is night if it falls between a day's sunset and the following sunrise.
pub fn normalize_open_meteo(
    raw: OpenMeteoResponse,
    lat: f64,
    lon: f64,
    now: DateTime<Utc>,
) -> WeatherForecast {
    let nights: Vec<(DateTime<Utc>, DateTime<Utc>)> = raw
        .daily
        .sunrise
        .iter()
        .zip(raw.daily.sunset.iter())
        .filter_map(|(sr, ss)| {
            let sunset = parse_utc(ss)?;
            let next_sunrise = parse_utc(sr)? + ChronoDuration::days(1);
            Some((sunset, next_sunrise))
        })
        .collect();

    let hours = raw
        .hourly
        .time
        .iter()
        .zip(raw.hourly.cloudcover.iter())
        .zip(raw.hourly.precipitation_probability.iter())
        .filter_map(|((t, c), p)| {
            let time = parse_utc(t)?;
            Some(WeatherHour {
                time,
                cloud: num(c)?,
                precip: num(p).unwrap_or(0.0),
                is_night: nights.iter().any(|(s, e)| *s <= time && time <= *e),
            })
        })
        .collect();

    WeatherForecast {
        provider: "Open-Meteo".to_string(),
        generated_at: now,
        lat,
        lon,
        region: None,
        hours,
    }
}

/// Result of delivering to one push endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// Endpoint is gone or invalid and should be forgotten
    Unusable,
}

/// Push gateway client: one POST per device token
pub struct PushGatewayClient {
    http_client: HttpClient,
    url: String,
    api_key: Option<String>,
}

impl PushGatewayClient {
    pub fn new(url: String, api_key: Option<String>, timeout: Duration) -> ApiResult<Self> {
        Ok(Self {
            http_client: HttpClient::new(timeout)?,
            url,
            api_key,
        })
    }

    pub async fn send(&self, token: &str, message: &PushMessage) -> ApiResult<SendOutcome> {
        let mut req = self.http_client.get_client().post(&self.url).json(&serde_json::json!({
            "token": token,
            "title": message.title,
            "body": message.body,
            "data": message.data,
        }));

        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;
        match resp.status() {
            s if s.is_success() => Ok(SendOutcome::Delivered),
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::GONE => {
                Ok(SendOutcome::Unusable)
            }
            _ => Err(ApiError::UpstreamStatus {
                source_name: "push gateway".to_string(),
                status: resp.status().as_u16(),
            }),
        }
    }
}
