/// Application configuration module
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_url: Option<String>,
    pub kp_forecast_url: String,
    pub weather_api_url: String,
    pub push_gateway_url: Option<String>,
    pub push_gateway_key: Option<String>,
    pub cache_dir: PathBuf,
    pub catalog_dir: PathBuf,
    pub calendar_product: String,
    pub intervals: JobIntervals,
    pub timeouts: Timeouts,
    pub cache_ttl: CacheTtl,
    pub aurora_cooldown_hours: i64,
}

#[derive(Clone, Debug)]
pub struct JobIntervals {
    pub aurora_seconds: u64,
    pub milestone_seconds: u64,
}

#[derive(Clone, Debug)]
pub struct Timeouts {
    pub upstream_seconds: u64,
    pub weather_seconds: u64,
}

impl Timeouts {
    pub fn upstream(&self) -> Duration {
        Duration::from_secs(self.upstream_seconds)
    }

    pub fn weather(&self) -> Duration {
        Duration::from_secs(self.weather_seconds)
    }
}

#[derive(Clone, Debug)]
pub struct CacheTtl {
    pub kp_seconds: i64,
    pub weather_seconds: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            database_url: None,
            kp_forecast_url:
                "https://services.swpc.noaa.gov/products/noaa-planetary-k-index-forecast.json"
                    .to_string(),
            weather_api_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            push_gateway_url: None,
            push_gateway_key: None,
            cache_dir: PathBuf::from("data/cache"),
            catalog_dir: PathBuf::from("data"),
            calendar_product: "skywatch".to_string(),
            intervals: JobIntervals {
                aurora_seconds: 3600,
                milestone_seconds: 900,
            },
            timeouts: Timeouts {
                upstream_seconds: 10,
                weather_seconds: 15,
            },
            cache_ttl: CacheTtl {
                kp_seconds: 3600,
                weather_seconds: 3600,
            },
            aurora_cooldown_hours: 12,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            bind_addr: env_string("BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: env_string("DATABASE_URL"),
            kp_forecast_url: env_string("KP_FORECAST_URL").unwrap_or(defaults.kp_forecast_url),
            weather_api_url: env_string("WEATHER_API_URL").unwrap_or(defaults.weather_api_url),
            push_gateway_url: env_string("PUSH_GATEWAY_URL"),
            push_gateway_key: env_string("PUSH_GATEWAY_KEY"),
            cache_dir: env_string("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            catalog_dir: env_string("CATALOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.catalog_dir),
            calendar_product: env_string("CALENDAR_PRODUCT")
                .unwrap_or(defaults.calendar_product),
            intervals: JobIntervals {
                aurora_seconds: env_num("AURORA_EVERY_SECONDS", 3600),
                milestone_seconds: env_num("MILESTONE_EVERY_SECONDS", 900),
            },
            timeouts: Timeouts {
                upstream_seconds: env_num("UPSTREAM_TIMEOUT_SECONDS", 10),
                weather_seconds: env_num("WEATHER_TIMEOUT_SECONDS", 15),
            },
            cache_ttl: CacheTtl {
                kp_seconds: env_num("KP_CACHE_TTL_SECONDS", 3600),
                weather_seconds: env_num("WEATHER_CACHE_TTL_SECONDS", 3600),
            },
            aurora_cooldown_hours: env_num("AURORA_COOLDOWN_HOURS", 12),
        })
    }
}

/// Non-empty, trimmed env var
fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_num<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}
