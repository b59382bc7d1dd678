//! People Service
//! Mission: Serve user accounts and bearer-token authentication over HTTP

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use people_service::{
    app,
    config::Config,
    middleware::RateLimitLayer,
};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let config = Config::parse();

    info!("People service starting");

    let state = app::build_state(&config)?;

    if let Some((email, username, password)) = config.bootstrap_admin() {
        app::bootstrap_admin(&state, email, username, password)
            .context("Failed to create bootstrap admin")?;
    }

    let login_limiter = (config.login_rate_limit > 0)
        .then(|| RateLimitLayer::new(config.login_rate_limit()));

    if let Some(limiter) = login_limiter.clone() {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                limiter.cleanup();
                debug!(clients = limiter.tracked_clients(), "Login rate limiter cleaned up");
            }
        });
    }

    let router = app::router(state, login_limiter);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("API server listening on {}", config.bind_addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "people_service=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // 2) Also try the crate root .env when started from elsewhere
    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}
