use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use watchlog::{
    config::Config,
    db::{create_pool, create_redis_client, run_migrations, Cache, PgStore, RedisRateLimitStore},
    routes::{create_router, AppState, AuthSettings, Stores},
    services::{SessionKeys, StatsSettings, TmdbProvider},
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "watchlog=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = create_pool(&config.database_url)
        .await
        .context("Failed to connect to Postgres")?;
    run_migrations(&pool).await?;
    info!("Database ready");

    let redis_client = create_redis_client(&config.redis_url)?;
    let (cache, cache_handle) = Cache::new(redis_client.clone());

    let tmdb_auth = config
        .tmdb_auth()
        .context("Either TMDB_READ_TOKEN or TMDB_API_KEY must be set")?;
    let metadata = TmdbProvider::new(
        cache,
        config.tmdb_api_url.clone(),
        tmdb_auth,
        config.metadata_timeout(),
        config.metadata_cache_ttl_secs,
    )?;

    let state = Arc::new(AppState::new(
        Stores::postgres(PgStore::new(pool)),
        Arc::new(metadata),
        Arc::new(RedisRateLimitStore::new(redis_client)),
        AuthSettings {
            sessions: SessionKeys::new(&config.auth_secret, config.session_ttl_hours),
            bcrypt_cost: config.bcrypt_cost,
        },
        StatsSettings {
            concurrency: config.metadata_concurrency(),
            fetch_timeout: config.metadata_timeout(),
            ..StatsSettings::default()
        },
    ));

    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    cache_handle.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
