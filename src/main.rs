use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{router, AppState};
use triage_core::{constants::DEFAULT_TRIAGE_DATA_DIR, Store, TriageConfig, TriageService};

const DEFAULT_SWEEP_SECS: u64 = 60;

/// Main entry point for the triage application
///
/// Starts the REST server and a periodic overdue sweep concurrently:
/// - REST server on port 3000 (configurable via TRIAGE_REST_ADDR)
/// - Sweep every 60 seconds (configurable via TRIAGE_OVERDUE_SWEEP_SECS, 0 disables it)
///
/// # Environment Variables
/// - `TRIAGE_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `TRIAGE_DATA_DIR`: journal directory (default: "triage_data")
/// - `TRIAGE_CONFIG_FILE`: optional YAML configuration file
/// - `TRIAGE_OVERDUE_SWEEP_SECS`: seconds between overdue sweeps
/// - `API_KEY`: API key required in `x-api-key` for every route except `/health`
///
/// # Returns
/// * `Ok(())` - If the server runs and shuts down cleanly
/// * `Err(anyhow::Error)` - If configuration, storage or server startup fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("triage_run=info".parse()?)
                .add_directive("triage_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("TRIAGE_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let sweep_secs: u64 = match std::env::var("TRIAGE_OVERDUE_SWEEP_SECS") {
        Ok(value) => value.parse()?,
        Err(_) => DEFAULT_SWEEP_SECS,
    };

    let config_path = std::env::var("TRIAGE_CONFIG_FILE").ok().map(PathBuf::from);
    let cfg = Arc::new(TriageConfig::resolve(config_path.as_deref())?);
    let data_dir =
        std::env::var("TRIAGE_DATA_DIR").unwrap_or_else(|_| DEFAULT_TRIAGE_DATA_DIR.into());
    let store = Arc::new(Store::open(&PathBuf::from(data_dir))?);
    let service = TriageService::new(store, cfg);

    let api_key = std::env::var("API_KEY").ok().filter(|k| !k.is_empty());
    if api_key.is_none() {
        tracing::warn!("API_KEY not set; REST routes are unauthenticated");
    }

    tracing::info!("++ Starting triage REST on {}", rest_addr);
    let rest_app = router(AppState::new(service.clone(), api_key));
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    let rest_server = tokio::spawn(async move { axum::serve(listener, rest_app).await });

    if sweep_secs > 0 {
        tracing::info!("++ Overdue sweep every {}s", sweep_secs);
        tokio::spawn(overdue_sweep(service, Duration::from_secs(sweep_secs)));
    }

    rest_server.await??;

    Ok(())
}

/// Periodically log waiting entries that have exceeded their acceptable wait.
///
/// The sweep only reports; it never changes queue state.
async fn overdue_sweep(service: TriageService, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let service = service.clone();
        let scanned = tokio::task::spawn_blocking(move || service.statistics().scan_overdue(None));
        match scanned.await {
            Ok(Ok(overdue)) if overdue.is_empty() => tracing::debug!("overdue sweep: none"),
            Ok(Ok(overdue)) => {
                for item in &overdue {
                    tracing::warn!(
                        department_id = %item.entry.department_id,
                        assessment_id = %item.entry.assessment_id,
                        level = %item.entry.level,
                        wait_minutes = item.wait_minutes,
                        threshold_minutes = item.threshold_minutes,
                        "patient overdue"
                    );
                }
            }
            Ok(Err(e)) => tracing::error!("overdue sweep failed: {}", e),
            Err(e) => tracing::error!("overdue sweep task failed: {}", e),
        }
    }
}
