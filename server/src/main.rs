//! Torque Server binary.

use torque_server::config::Config;
use torque_server::{build_router, db, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env may carry RUST_LOG, so load it before the subscriber
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "torque_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        sync_interval_secs = config.sync_interval.as_secs(),
        batch_deadline_ms = config.batch_deadline.as_millis() as u64,
        gateway_auth = config.auth_secret.is_some(),
        "starting Torque Server"
    );

    let pool = db::create_pool(&config.database_url, config.max_connections).await?;
    tracing::info!("running database migrations");
    db::run_migrations(&pool).await?;

    let addr = format!("{}:{}", config.host, config.port);
    let app = build_router(AppState::new(pool, config));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
