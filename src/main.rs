use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quillpost::{
    api::{create_router, endpoints, AppState, RateLimiter},
    config::Config,
    db,
    error::AppError,
};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,quillpost=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Quillpost server v{}", env!("CARGO_PKG_VERSION"));

    // A missing JWT_SECRET stops the process here.
    let config = Arc::new(Config::from_env()?);
    tracing::info!(?config, "configuration loaded");

    let pool = db::connect(&config).await?;
    tracing::info!("database connected: {}", config.database_url);

    db::migrate(&pool).await?;
    tracing::info!("database migrations completed");

    let state = AppState::new(pool, config.clone())?;

    let rate_limiter = Arc::new(RateLimiter::new(
        config.rate_limit_max_requests,
        config.rate_limit_window_secs,
    ));
    tracing::info!(
        "rate limiter configured ({} req / {}s per IP on credential endpoints)",
        config.rate_limit_max_requests,
        config.rate_limit_window_secs
    );

    // Spawn background task for rate limiter cleanup
    {
        let limiter = rate_limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300)); // Every 5 minutes
            loop {
                interval.tick().await;
                limiter.cleanup().await;
                tracing::debug!("rate limiter cache cleaned up");
            }
        });
    }

    let app = create_router(state, rate_limiter)?;

    let addr = config.server_address();
    tracing::info!("Server listening on http://{}", addr);
    for endpoint in endpoints(&config.api_prefix) {
        tracing::info!("  {:<6} {:<24} - {}", endpoint.method, endpoint.path, endpoint.summary);
    }

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
