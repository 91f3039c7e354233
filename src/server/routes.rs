//! Page and API handlers

use super::error::AppError;
use super::flash::Flash;
use super::AppState;
use crate::orchestrator::PredictOutcome;
use crate::types::{Prediction, UploadedFile};
use crate::validator::ALLOWED_EXTENSIONS;
use anyhow::Context;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Json;
use minijinja::context;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

const FILE_FIELD: &str = "file";
const SHARE_INVALID: &str = "Invalid or expired share link.";

/// Why the multipart body could not be turned into a list of files
#[derive(Debug, Error)]
enum IntakeError {
    #[error("No file part in the request. Please upload a valid file.")]
    NoFilePart,

    #[error("No files selected. Please choose at least one file to upload.")]
    NoFilesSelected,

    #[error("File too large. The maximum upload size is {max_mb} MB.")]
    TooLarge { max_mb: usize },

    #[error("An unexpected error occurred: {0}")]
    Unreadable(String),
}

/// Context for `results.html`
#[derive(Serialize)]
struct ResultPage<'a> {
    #[serde(flatten)]
    prediction: &'a Prediction,
    share_url: Option<&'a str>,
    messages: &'a [String],
}

fn render<S: Serialize>(
    state: &AppState,
    name: &str,
    context: S,
    clear_flash: bool,
) -> Result<Response, AppError> {
    let body = state.templates.render(name, context)?;
    let mut response = Html(body).into_response();
    if clear_flash {
        response
            .headers_mut()
            .insert(SET_COOKIE, Flash::clear_cookie());
    }
    Ok(response)
}

fn max_upload_mb(state: &AppState) -> usize {
    state.config.server.max_upload_bytes / (1024 * 1024)
}

pub async fn index(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, AppError> {
    let messages = state.flash.take(&headers);
    let feature_count = state.service.validator().feature_count();

    render(
        &state,
        "index.html",
        context! { feature_count => feature_count, messages => &messages },
        !messages.is_empty(),
    )
}

pub async fn predictor(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let messages = state.flash.take(&headers);

    render(
        &state,
        "predictor.html",
        context! {
            feature_count => state.service.validator().feature_count(),
            allowed_extensions => ALLOWED_EXTENSIONS,
            max_upload_mb => max_upload_mb(&state),
            messages => &messages,
        },
        !messages.is_empty(),
    )
}

pub async fn predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("predict", request_id = %request_id);

    handle_predict(state, multipart).instrument(span).await
}

async fn handle_predict(
    state: AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    state.metrics.record_request();

    let files = match read_files(multipart, max_upload_mb(&state)).await {
        Ok(files) => files,
        Err(e) => {
            warn!(error = %e, "Upload rejected");
            return Ok(state.flash.redirect("/predictor", &[e.to_string()]));
        }
    };
    info!(files = files.len(), "Upload received");

    let service = state.service.clone();
    let report = tokio::task::spawn_blocking(move || service.process(&files))
        .await
        .context("Prediction task failed")
        .and_then(|report| report);

    let report = match report {
        Ok(report) => report,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Prediction failed");
            let message = format!("An unexpected error occurred: {}", e);
            return Ok(state.flash.redirect("/predictor", &[message]));
        }
    };

    match report.into_outcome() {
        PredictOutcome::Single { result, messages } => render(
            &state,
            "results.html",
            ResultPage {
                prediction: &result.prediction,
                share_url: Some(&result.share_url),
                messages: &messages,
            },
            false,
        ),
        PredictOutcome::Batch { results, messages } => render(
            &state,
            "results_batch.html",
            context! {
                results => &results,
                top_k => state.service.engine().top_k(),
                messages => &messages,
            },
            false,
        ),
        PredictOutcome::NoResults { messages } => {
            Ok(state.flash.redirect("/predictor", &messages))
        }
    }
}

/// Collect every `file` field with a non-empty filename, in upload order.
async fn read_files(
    multipart: Result<Multipart, MultipartRejection>,
    max_mb: usize,
) -> Result<Vec<UploadedFile>, IntakeError> {
    let mut multipart = multipart.map_err(|_| IntakeError::NoFilePart)?;
    let read_error = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            IntakeError::TooLarge { max_mb }
        } else {
            IntakeError::Unreadable(e.body_text())
        }
    };

    let mut saw_file_field = false;
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(read_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        saw_file_field = true;

        let name = field.file_name().unwrap_or_default().to_string();
        let content = field.bytes().await.map_err(read_error)?;
        if name.is_empty() {
            continue;
        }
        files.push(UploadedFile::new(name, content.to_vec()));
    }

    if !saw_file_field {
        return Err(IntakeError::NoFilePart);
    }
    if files.is_empty() {
        return Err(IntakeError::NoFilesSelected);
    }
    Ok(files)
}

pub async fn shared_result(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let prediction = match state.codec.decode(&token) {
        Ok(prediction) => prediction,
        Err(e) => {
            state.metrics.record_share(false);
            warn!(error = %e, "Share token rejected");
            return Ok(state.flash.redirect("/", &[SHARE_INVALID.to_string()]));
        }
    };
    state.metrics.record_share(true);

    let messages = state.flash.take(&headers);
    render(
        &state,
        "results.html",
        ResultPage {
            prediction: &prediction,
            share_url: None,
            messages: &messages,
        },
        !messages.is_empty(),
    )
}

pub async fn download_sample(State(state): State<AppState>) -> Result<Response, AppError> {
    let path = state.config.server.sample_path();

    let content = match tokio::fs::read(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "Sample file missing");
            return Ok((StatusCode::NOT_FOUND, "Sample file not found").into_response());
        }
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("Failed to read sample file {}", path.display()))
                .into())
        }
    };

    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("sample.csv");

    Ok((
        [
            (CONTENT_TYPE, "text/csv".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        content,
    )
        .into_response())
}

/// Old links pointed at a sample file that has since been replaced
pub async fn legacy_sample_redirect(State(state): State<AppState>) -> Redirect {
    Redirect::to(&format!("/static/{}", state.config.server.sample_file))
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let engine = state.service.engine();

    Json(json!({
        "status": "ok",
        "model": engine.model_name(),
        "classes": engine.class_count(),
        "feature_width": state.service.validator().feature_count(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::metrics::ServiceMetrics;
    use crate::server::router;
    use crate::test_support::{csv_content, test_engine};
    use crate::types::RankedLabel;
    use crate::validator::FEATURE_COUNT;
    use axum::body::{to_bytes, Body};
    use axum::http::header::{COOKIE, LOCATION};
    use axum::http::Request;
    use axum::Router;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "predictor-test-boundary";
    const SAMPLE: &str = "gene_1,gene_2\n0.1,0.2\n";

    struct Harness {
        app: Router,
        state: AppState,
        calls: Arc<std::sync::atomic::AtomicUsize>,
        _dir: tempfile::TempDir,
    }

    fn harness_with(configure: impl FnOnce(&mut AppConfig)) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let static_dir = dir.path().join("static");
        std::fs::create_dir_all(static_dir.join("uploads")).unwrap();
        std::fs::write(
            static_dir.join("uploads/sample_genomic_data_fixed.csv"),
            SAMPLE,
        )
        .unwrap();

        let mut config = AppConfig::default();
        config.server.static_dir = static_dir;
        config.server.upload_dir = dir.path().join("uploads");
        configure(&mut config);

        let (engine, calls) = test_engine();
        let state =
            AppState::new(config, Arc::new(engine), Arc::new(ServiceMetrics::new())).unwrap();

        Harness {
            app: router(state.clone()),
            state,
            calls,
            _dir: dir,
        }
    }

    fn harness() -> Harness {
        harness_with(|_| {})
    }

    fn multipart(fields: &[(&str, &str, &[u8])]) -> Request<Body> {
        let mut body = Vec::new();
        for (field, filename, content) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: text/csv\r\n\r\n",
                    BOUNDARY, field, filename
                )
                .as_bytes(),
            );
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        Request::post("/predict")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> Response {
        app.clone().oneshot(request).await.unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    /// Follow a flash redirect and return the rendered page
    async fn follow(app: &Router, response: Response) -> String {
        let location = response.headers()[LOCATION].to_str().unwrap().to_string();
        let cookie = response.headers()[SET_COOKIE]
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();

        let request = Request::get(location)
            .header(COOKIE, cookie)
            .body(Body::empty())
            .unwrap();
        let page = send(app, request).await;
        assert_eq!(page.status(), StatusCode::OK);
        assert!(page.headers()[SET_COOKIE]
            .to_str()
            .unwrap()
            .contains("Max-Age=0"));
        body_text(page).await
    }

    fn assert_redirect(response: &Response, to: &str) {
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[LOCATION], to);
    }

    #[tokio::test]
    async fn test_index_and_predictor_pages() {
        let h = harness();

        let index = send(&h.app, get("/")).await;
        assert_eq!(index.status(), StatusCode::OK);
        assert!(index.headers().get(SET_COOKIE).is_none());
        assert!(body_text(index).await.contains("37 features"));

        let form = body_text(send(&h.app, get("/predictor")).await).await;
        assert!(form.contains("name=\"file\""));
        assert!(form.contains("CSV, TXT"));
    }

    #[tokio::test]
    async fn test_single_row_renders_result_with_share_link() {
        let h = harness();
        let content = csv_content(1, FEATURE_COUNT);

        let response = send(&h.app, multipart(&[("file", "data.csv", &content)])).await;

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("COAD"));
        assert!(html.contains("60.0"));
        assert!(html.contains("share-link"));
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_batch_upload_lists_each_file() {
        let h = harness();
        let one = csv_content(1, FEATURE_COUNT);
        let three = csv_content(3, FEATURE_COUNT);
        let narrow = csv_content(2, 36);

        let response = send(
            &h.app,
            multipart(&[
                ("file", "one.csv", &one),
                ("file", "narrow.csv", &narrow),
                ("file", "three.txt", &three),
            ]),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Batch results"));
        assert!(html.contains("one.csv"));
        assert!(html.contains("three.txt"));
        assert!(html.contains("but got 36"));
        assert_eq!(h.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalid_type_redirects_with_message() {
        let h = harness();

        let response = send(&h.app, multipart(&[("file", "report.pdf", b"%PDF-1.4")])).await;

        assert_redirect(&response, "/predictor");
        let page = follow(&h.app, response).await;
        assert!(page.contains("Invalid file type for report.pdf. Allowed: CSV, TXT."));
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_file_part() {
        let h = harness();

        let response = send(&h.app, multipart(&[("other", "data.csv", b"a\n1\n")])).await;
        assert_redirect(&response, "/predictor");
        assert!(follow(&h.app, response)
            .await
            .contains("No file part in the request."));

        let response = send(&h.app, Request::post("/predict").body(Body::empty()).unwrap()).await;
        assert_redirect(&response, "/predictor");
    }

    #[tokio::test]
    async fn test_empty_selection() {
        let h = harness();

        let response = send(&h.app, multipart(&[("file", "", b"")])).await;

        assert_redirect(&response, "/predictor");
        assert!(follow(&h.app, response)
            .await
            .contains("No files selected. Please choose at least one file to upload."));
    }

    #[tokio::test]
    async fn test_oversized_upload() {
        let h = harness_with(|config| config.server.max_upload_bytes = 1024);
        let content = csv_content(20, FEATURE_COUNT);

        let response = send(&h.app, multipart(&[("file", "big.csv", &content)])).await;

        assert_redirect(&response, "/predictor");
        assert!(follow(&h.app, response).await.contains("File too large"));
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shared_result_round_trip() {
        let h = harness();
        let prediction = Prediction::from_ranked(vec![
            RankedLabel::new("LUAD", 0.75),
            RankedLabel::new("BRCA", 0.2),
            RankedLabel::new("PRAD", 0.05),
        ]);
        let url = h.state.codec.share_url(&prediction).unwrap();

        let response = send(&h.app, get(&url)).await;

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("LUAD"));
        assert!(!html.contains("share-link"));
    }

    #[tokio::test]
    async fn test_invalid_share_token_redirects_home() {
        let h = harness();

        let response = send(&h.app, get("/results/share/not-a-token")).await;

        assert_redirect(&response, "/");
        assert!(follow(&h.app, response).await.contains(SHARE_INVALID));
    }

    #[tokio::test]
    async fn test_download_sample() {
        let h = harness();

        let response = send(&h.app, get("/download-sample")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/csv");
        assert!(response.headers()[CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .starts_with("attachment"));
        assert_eq!(body_text(response).await, SAMPLE);
    }

    #[tokio::test]
    async fn test_download_sample_missing() {
        let h = harness_with(|config| config.server.sample_file = "missing.csv".to_string());

        let response = send(&h.app, get("/download-sample")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_static_files_and_legacy_redirect() {
        let h = harness();

        let response = send(&h.app, get("/static/sample_genomic_data.csv")).await;
        assert_redirect(&response, "/static/uploads/sample_genomic_data_fixed.csv");

        let response = send(&h.app, get("/static/uploads/sample_genomic_data_fixed.csv")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, SAMPLE);

        let response = send(&h.app, get("/static/nope.css")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness();

        let response = send(&h.app, get("/health")).await;

        assert_eq!(response.status(), StatusCode::OK);
        let value: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["model"], "fixed");
        assert_eq!(value["classes"], 4);
        assert_eq!(value["feature_width"], 37);
    }
}
