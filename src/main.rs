use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, router};
use lab_core::{
    CoreConfig, WorkflowService,
    config::{bool_from_env_value, enabled_processes_from_env_value, store_backend_from_env_value},
    constants::DEFAULT_DATA_DIR,
};

/// Main entry point for the lab workflow service
///
/// Resolves configuration once from the environment and serves the REST API (with Swagger UI
/// at `/swagger-ui`).
///
/// # Environment Variables
/// - `LAB_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `LAB_DATA_DIR`: Directory holding the JSON store (default: "lab_data")
/// - `LAB_STORE`: `json` (default) or `memory`
/// - `LAB_ORDERS_FILE`: YAML file of lab test orders
/// - `LAB_ENABLED_PROCESSES`: comma separated process kinds (default: all)
/// - `LAB_AUTO_COMPLETE`: complete samples automatically when their last process closes
///
/// # Errors
/// Returns an error if the configuration is invalid, the order file cannot be loaded, the
/// address cannot be bound, or the server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lab_core=info".parse()?)
                .add_directive("api_rest=info".parse()?)
                .add_directive("lab_run=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("LAB_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let data_dir = std::env::var("LAB_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.into());
    let cfg = Arc::new(CoreConfig::new(
        PathBuf::from(data_dir),
        std::env::var("LAB_ORDERS_FILE").ok().map(PathBuf::from),
        store_backend_from_env_value(std::env::var("LAB_STORE").ok())?,
        enabled_processes_from_env_value(std::env::var("LAB_ENABLED_PROCESSES").ok())?,
        bool_from_env_value(
            "LAB_AUTO_COMPLETE",
            std::env::var("LAB_AUTO_COMPLETE").ok(),
            false,
        )?,
    )?);

    tracing::info!(
        "-- Enabled processes: {}",
        cfg.enabled_processes()
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(",")
    );

    let service = WorkflowService::from_config(cfg)?;
    let app = router(AppState::new(service));

    tracing::info!("-- Starting lab workflow REST API on {}", rest_addr);
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
