//! ML Analytics Service - trains and validates telemetry models over HTTP

use analytics_lib::health::{components, HealthRegistry};
use analytics_lib::observability::StructuredLogger;
use analytics_lib::source::open_source;
use analytics_lib::store::{ArtifactStore, FileArtifactStore};
use analytics_lib::AnalyticsEngine;
use anyhow::{Context, Result};
use ml_analytics_service::{api, config::ServiceConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting ml-analytics");

    let config = ServiceConfig::load()?;
    info!(
        port = config.port,
        data_path = %config.data_path.display(),
        data_format = ?config.data_format,
        artifact_dir = %config.artifact_dir.display(),
        "Service configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let source = open_source(config.data_format, &config.data_path, config.import_limit);
    let store: Arc<dyn ArtifactStore> = Arc::new(
        FileArtifactStore::new(&config.artifact_dir)
            .with_context(|| format!("Failed to open artifact directory {}", config.artifact_dir.display()))?,
    );

    if !config.data_path.exists() {
        health_registry
            .set_degraded(
                components::DATA_SOURCE,
                format!("{} does not exist yet", config.data_path.display()),
            )
            .await;
    }

    let logger = StructuredLogger::new(&config.instance_name);
    logger.log_startup(
        SERVICE_VERSION,
        &source.describe(),
        &config.artifact_dir.display().to_string(),
    );

    let engine = AnalyticsEngine::new(source, store, config.pipeline_settings())
        .with_health(health_registry.clone())
        .with_logger(logger.clone());
    let app_state = Arc::new(api::AppState::new(engine, health_registry.clone()));

    health_registry.set_ready(true).await;

    let shutdown_logger = logger.clone();
    api::serve(config.port, app_state, async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown_logger.log_shutdown("SIGINT received");
        }
    })
    .await?;

    info!("Shutting down");
    Ok(())
}
