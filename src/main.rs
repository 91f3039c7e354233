//! Genomic Predictor - Main Entry Point
//!
//! Loads the classifier, then serves the upload form, prediction results and
//! share links over HTTP until interrupted.

use anyhow::{Context, Result};
use genomic_predictor::{
    config::AppConfig,
    metrics::{MetricsReporter, ServiceMetrics},
    models::inference::InferenceEngine,
    server::{router, AppState},
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    init_logging(&config)?;
    info!("Starting Genomic Predictor");
    info!(
        static_dir = %config.server.static_dir.display(),
        upload_dir = %config.server.upload_dir.display(),
        max_upload_bytes = config.server.max_upload_bytes,
        "Configuration loaded successfully"
    );

    if config.share.uses_dev_secret() {
        warn!("Using the development secret key; set GENOMIC_PREDICTOR__SHARE__SECRET_KEY in production");
    }

    // Initialize metrics
    let metrics = Arc::new(ServiceMetrics::new());

    // Initialize inference engine with the ONNX model
    let engine = Arc::new(InferenceEngine::new(&config)?);
    info!(
        "Inference engine initialized: model {}, {} classes, top {}",
        engine.model_name(),
        engine.class_count(),
        engine.top_k()
    );

    let addr = config.server.bind_addr()?;
    let report_interval = config.metrics.report_interval_secs;
    let state = AppState::new(config, engine, metrics.clone())?;

    // Start metrics reporter
    if report_interval > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), report_interval);
        tokio::spawn(reporter.start());
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Print final summary
    info!("Server shutting down...");
    metrics.print_summary();

    Ok(())
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(
        format!("genomic_predictor={}", config.logging.level)
            .parse()
            .context("Invalid logging.level")?,
    );

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
