use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

/// Unexpected failure while building a page. Logged with an id that is also
/// returned to the client.
#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error_id = uuid::Uuid::new_v4().to_string();
        tracing::error!(error_id = %error_id, error = %format!("{:#}", self.0), "Internal error");

        let mut response = (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Internal server error (id {})", error_id),
        )
            .into_response();

        if let Ok(v) = HeaderValue::from_str(&error_id) {
            response.headers_mut().insert("x-error-id", v);
        }
        response
    }
}
