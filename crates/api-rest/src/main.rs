//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own.
//!
//! ## Intended use
//! Useful for development and debugging when you want the REST server (with OpenAPI/Swagger UI)
//! without the workspace's `referral-run` startup checks.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{router, AppState};
use tracker_core::config::{data_file_from_env_value, stage_order_from_env_value};
use tracker_core::{CoreConfig, DATA_FILE_ENV, DEFAULT_REST_ADDR, REST_ADDR_ENV, STAGES_FILE_ENV};

/// Main entry point for the referral tracker REST API server
///
/// # Environment Variables
/// - `TRACKER_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `REFERRAL_DATA_FILE`: JSON seed for the record store
/// - `REFERRAL_STAGES_FILE`: optional YAML stage order
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the seed or stage file cannot be loaded,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("tracker_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var(REST_ADDR_ENV).unwrap_or_else(|_| DEFAULT_REST_ADDR.into());

    let cfg = Arc::new(CoreConfig::new(
        data_file_from_env_value(std::env::var(DATA_FILE_ENV).ok()),
        stage_order_from_env_value(std::env::var(STAGES_FILE_ENV).ok())?,
    )?);
    let state = AppState::from_config(&cfg)?;

    tracing::info!("-- Starting referral tracker REST API on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}
