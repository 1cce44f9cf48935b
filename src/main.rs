/// Sky events forecast and notification service
mod catalog;
mod clients;
mod config;
mod domain;
mod errors;
mod handlers;
mod repo;
mod routes;
mod services;
mod utils;

use crate::catalog::Catalog;
use crate::clients::{KpClient, OpenMeteoClient, PushGatewayClient};
use crate::config::AppConfig;
use crate::handlers::AppState;
use crate::repo::{init_db, EventStore, ForecastCache, MemoryEventStore, PgEventStore};
use crate::routes::build_router;
use crate::services::{
    Cycle, EventService, GatewayNotifier, KpForecastService, LogNotifier, NotificationScheduler,
    Notifier, RecurringTask, WeatherService,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    // Load configuration
    let config = AppConfig::from_env()?;
    info!("Configuration loaded successfully");

    // Record store
    let store: Arc<dyn EventStore> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await?;
            info!("Database connection pool established");
            init_db(&pool).await?;
            info!("Database schema initialized");
            Arc::new(PgEventStore::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory store");
            Arc::new(MemoryEventStore::new())
        }
    };

    // Reference data and forecast cache
    let catalog = Arc::new(Catalog::load(&config.catalog_dir));
    let cache = Arc::new(ForecastCache::new(config.cache_dir.clone()));

    // Upstream clients
    let kp_client = KpClient::new(config.kp_forecast_url.clone(), config.timeouts.upstream())?;
    let weather_client =
        OpenMeteoClient::new(config.weather_api_url.clone(), config.timeouts.weather())?;

    let notifier: Arc<dyn Notifier> = match &config.push_gateway_url {
        Some(url) => {
            let client = PushGatewayClient::new(
                url.clone(),
                config.push_gateway_key.clone(),
                config.timeouts.upstream(),
            )?;
            info!("Push gateway configured at {}", url);
            Arc::new(GatewayNotifier::new(client, store.clone()))
        }
        None => {
            warn!("PUSH_GATEWAY_URL not set, notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };

    // Initialize services
    let aurora = Arc::new(KpForecastService::new(
        Arc::new(kp_client),
        cache.clone(),
        chrono::Duration::seconds(config.cache_ttl.kp_seconds),
    ));
    let weather = Arc::new(WeatherService::new(
        Arc::new(weather_client),
        cache,
        chrono::Duration::seconds(config.cache_ttl.weather_seconds),
    ));
    let events = Arc::new(EventService::new(catalog, aurora.clone(), weather.clone()));
    let scheduler = Arc::new(NotificationScheduler::new(
        store.clone(),
        notifier.clone(),
        aurora.clone(),
        chrono::Duration::hours(config.aurora_cooldown_hours),
    ));

    // Start background tasks
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tasks = vec![
        RecurringTask::new(
            "aurora",
            Duration::from_secs(config.intervals.aurora_seconds),
            Cycle::Aurora,
            scheduler.clone(),
        )
        .spawn(shutdown_rx.clone()),
        RecurringTask::new(
            "milestones",
            Duration::from_secs(config.intervals.milestone_seconds),
            Cycle::Milestones,
            scheduler,
        )
        .spawn(shutdown_rx),
    ];
    info!("All background tasks started successfully");

    // Initialize application state
    let state = AppState {
        events,
        aurora,
        weather,
        store,
        notifier,
        calendar_product: config.calendar_product.clone(),
    };

    // Build router
    let app = build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("skywatch listening on {}", config.bind_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    for task in tasks {
        let _ = task.await;
    }

    Ok(())
}
