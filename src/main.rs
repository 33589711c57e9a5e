//! GateKit - SaaS Authentication & Authorization Backend
//! Mission: One hardened pipeline in front of every protected endpoint

use anyhow::{Context, Result};
use dotenv::dotenv;
use gatekit_backend::{
    app::build_router,
    auth::{TokenService, UserStore},
    config::AppConfig,
    middleware::RateLimiter,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::{net::TcpListener, time::interval};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often expired rate-limit windows are pruned.
const LIMITER_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    // Missing signing secrets abort here, before the listener exists.
    let config = AppConfig::from_env()?;

    let store = Arc::new(UserStore::new(&config.database_path)?);
    let tokens = Arc::new(TokenService::new(
        config.jwt_secret.clone(),
        config.jwt_refresh_secret.clone(),
    ));
    let limiter = RateLimiter::new();

    // Prune expired rate-limit entries independently of request traffic.
    let sweeper = limiter.clone();
    tokio::spawn(async move {
        let mut tick = interval(LIMITER_SWEEP_INTERVAL);
        loop {
            tick.tick().await;
            sweeper.sweep();
        }
    });

    let app = build_router(store, tokens, limiter);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("🎯 API server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Initialize tracing with env-filter overrides.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatekit_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
