//! Courier API server binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use courier_common::config::AppConfig;
use courier_common::db::{create_pool, run_migrations};
use courier_common::redis_pool::create_redis_manager;
use courier_engine::store::postgres::PgStore;
use courier_engine::{DispatchEngine, DispatchSettings, EngineStores, RoutingPolicy};
use courier_notifier::{PropertyCrypto, SenderRegistry};
use courier_notifier::rate_limit::{RateLimitSettings, RedisRateLimiter};
use courier_notifier::test_send::{TestSendLimits, TestSendService};

use courier_api::routes::create_router;
use courier_api::state::AppState;

const DEFAULT_LOG_FILTER: &str =
    "courier_api=debug,courier_engine=debug,courier_notifier=debug,tower_http=debug";

fn init_tracing(json_logs: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first: it decides the log format
    let config = AppConfig::from_env()?;
    init_tracing(config.json_logs);

    tracing::info!("Starting Courier API server...");

    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    run_migrations(&pool).await?;
    tracing::info!("Database pool created, migrations applied");

    let redis = create_redis_manager(&config.redis_url).await?;
    tracing::info!("Redis connection established");

    let registry = Arc::new(SenderRegistry::from_config(&config)?);

    let mut stores = EngineStores::shared(Arc::new(PgStore::new(pool)));
    match PropertyCrypto::from_config(&config) {
        Some(crypto) => stores = stores.with_property_crypto(Arc::new(crypto)),
        None => tracing::warn!(
            "PROPERTY_ENCRYPTION_SECRET is not set, sealed channel properties will not be opened"
        ),
    }

    let engine = DispatchEngine::new(
        stores,
        registry.clone(),
        RoutingPolicy::from_config(&config),
        DispatchSettings::from(&config),
        config.default_language.clone(),
    );

    let rate_limiter = Arc::new(RedisRateLimiter::new(
        redis,
        RateLimitSettings {
            max_requests: config.test_send_max_requests,
            window: Duration::from_secs(config.test_send_window_secs),
        },
    ));
    let test_send = TestSendService::new(registry, rate_limiter, TestSendLimits::from(&config));

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("BIND_ADDR '{}' is invalid: {}", config.bind_addr, e))?;

    tracing::info!(
        routing_rules = config.routing_rules.len(),
        default_channel = ?config.default_channel_id,
        max_concurrency = config.dispatch_max_concurrency,
        send_timeout_ms = config.send_timeout_ms,
        "Dispatch engine ready"
    );

    let state = AppState::new(engine, test_send, config);

    // Request id and tracing layers are part of the router
    let app = create_router(state).layer(CorsLayer::permissive());

    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
