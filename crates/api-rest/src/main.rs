//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the triage REST API on its own.
//!
//! ## Intended use
//! Useful for development and debugging when you only want the HTTP surface. The workspace's
//! main `triage-run` binary serves the same router and also runs the periodic overdue sweep.

use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{router, AppState};
use triage_core::{constants::DEFAULT_TRIAGE_DATA_DIR, Store, TriageConfig, TriageService};

/// Main entry point for the REST server.
///
/// # Environment Variables
/// - `TRIAGE_REST_ADDR`: listen address (default: "0.0.0.0:3000")
/// - `TRIAGE_DATA_DIR`: journal directory (default: "triage_data")
/// - `TRIAGE_CONFIG_FILE`: optional YAML configuration file
/// - `API_KEY`: when set, required in the `x-api-key` header of every non-health route
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("triage_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("TRIAGE_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let config_path = std::env::var("TRIAGE_CONFIG_FILE").ok().map(PathBuf::from);
    let cfg = Arc::new(TriageConfig::resolve(config_path.as_deref())?);

    let data_dir =
        std::env::var("TRIAGE_DATA_DIR").unwrap_or_else(|_| DEFAULT_TRIAGE_DATA_DIR.into());
    let store = Arc::new(Store::open(&PathBuf::from(data_dir))?);

    let api_key = std::env::var("API_KEY").ok().filter(|k| !k.is_empty());
    if api_key.is_none() {
        tracing::warn!("API_KEY not set; REST routes are unauthenticated");
    }

    let app = router(AppState::new(TriageService::new(store, cfg), api_key));

    tracing::info!("-- Starting triage REST API on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
