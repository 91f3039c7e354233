//! HTTP front end: routing, shared state, page rendering

pub mod error;
pub mod flash;
pub mod routes;
pub mod templates;

use crate::config::AppConfig;
use crate::metrics::ServiceMetrics;
use crate::models::InferenceEngine;
use crate::orchestrator::PredictionService;
use crate::share::ShareCodec;
use crate::uploads::UploadStore;
use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use flash::Flash;
use std::sync::Arc;
use templates::Templates;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub service: Arc<PredictionService>,
    pub codec: ShareCodec,
    pub flash: Flash,
    pub templates: Arc<Templates>,
    pub metrics: Arc<ServiceMetrics>,
}

impl AppState {
    /// Wire the prediction service around `engine`. Creates the upload
    /// directory if it does not exist.
    pub fn new(
        config: AppConfig,
        engine: Arc<InferenceEngine>,
        metrics: Arc<ServiceMetrics>,
    ) -> Result<Self> {
        let codec = ShareCodec::from_config(&config.share);
        let uploads = UploadStore::create(&config.server.upload_dir, config.server.keep_uploads)?;
        let service = PredictionService::new(engine, codec.clone(), uploads, metrics.clone());

        Ok(Self {
            flash: Flash::new(&config.share.secret_key),
            templates: Arc::new(Templates::new()?),
            service: Arc::new(service),
            codec,
            metrics,
            config: Arc::new(config),
        })
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let max_upload_bytes = state.config.server.max_upload_bytes;

    let static_files = Router::new()
        .route(
            "/sample_genomic_data.csv",
            get(routes::legacy_sample_redirect),
        )
        .fallback_service(ServeDir::new(&state.config.server.static_dir));

    Router::new()
        .route("/", get(routes::index))
        .route("/predictor", get(routes::predictor))
        .route("/predict", post(routes::predict))
        .route("/download-sample", get(routes::download_sample))
        .route("/results/share/{token}", get(routes::shared_result))
        .route("/health", get(routes::health))
        .nest("/static", static_files)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
