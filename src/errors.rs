use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors that cross the HTTP boundary. Everything the API surfaces maps
/// onto the uniform `{error, message, detail}` envelope.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        match &self {
            AppError::Validation(_) => {
                tracing::debug!(status = status.as_u16(), %message, "Client error");
            }
            _ => {
                tracing::error!(status = status.as_u16(), %message, error = ?self, "Server error");
            }
        }

        let body = Json(json!({
            "error": true,
            "message": message,
            "detail": if cfg!(debug_assertions) {
                Some(format!("{:?}", self))
            } else {
                None
            },
        }));

        (status, body).into_response()
    }
}

/// Stage-level failures inside the ingestion and query pipelines. These
/// never reach the HTTP layer directly; the orchestrator converts them into
/// structured fallback results at its boundary.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// User-correctable input problems
    #[error("{0}")]
    Input(String),

    /// An external service call failed or timed out
    #[error("{service} service error: {message}")]
    Upstream {
        service: &'static str,
        message: String,
    },

    /// The data itself is unusable (no text, count mismatch, ...)
    #[error("{0}")]
    Data(String),

    /// Unexpected and unclassified
    #[error("internal pipeline error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn upstream(service: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Upstream {
            service,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_400() {
        let err = AppError::Validation("bad input".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unavailable_maps_to_503() {
        let err = AppError::Unavailable("index down".into());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn internal_maps_to_500() {
        let err = AppError::Internal(anyhow::anyhow!("boom"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn upstream_helper_keeps_service_name() {
        let err = PipelineError::upstream("embedding", "connection refused");
        assert_eq!(
            err.to_string(),
            "embedding service error: connection refused"
        );
    }
}
