use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, router};
use tracker_core::config::{data_file_from_env_value, stage_order_from_env_value};
use tracker_core::{CoreConfig, DATA_FILE_ENV, DEFAULT_REST_ADDR, REST_ADDR_ENV, STAGES_FILE_ENV};

/// Main entry point for the referral tracker
///
/// Resolves configuration once, seeds the record store and serves the REST API until
/// interrupted.
///
/// # Environment Variables
/// - `TRACKER_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `REFERRAL_DATA_FILE`: JSON seed for the record store (default: "referral_data.json")
/// - `REFERRAL_STAGES_FILE`: YAML stage order (default: built-in stages)
///
/// # Returns
/// * `Ok(())` - If the server starts and shuts down cleanly
/// * `Err(anyhow::Error)` - If configuration, startup or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("referral_run=info".parse()?)
                .add_directive("api_rest=info".parse()?)
                .add_directive("tracker_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var(REST_ADDR_ENV).unwrap_or_else(|_| DEFAULT_REST_ADDR.into());

    let stage_order = stage_order_from_env_value(std::env::var(STAGES_FILE_ENV).ok())?;
    let data_file = data_file_from_env_value(std::env::var(DATA_FILE_ENV).ok());
    let cfg = Arc::new(CoreConfig::new(data_file, stage_order)?);

    tracing::info!(
        data_file = %cfg.data_file().display(),
        stages = %cfg.stage_order().names().collect::<Vec<_>>().join(" > "),
        "resolved configuration"
    );

    let state = AppState::from_config(&cfg)?;

    tracing::info!("++ Starting referral tracker REST on {}", rest_addr);

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("-- Referral tracker stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {:?}", e);
    }
}
