use crate::classifier::ModelError;
use crate::models::ErrorDetail;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use tracing::error;

/// Errors surfaced to HTTP clients as `{"detail": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Expected {expected} features, but got {actual}")]
    FeatureCount { expected: usize, actual: usize },
    #[error("{0}")]
    InvalidBody(String),
    #[error("Not Found")]
    NotFound,
    /// The model call failed; the cause is logged, never sent to the client.
    #[error("Error while processing input data")]
    Inference(#[source] ModelError),
    #[error("Error while processing input data")]
    WorkerFailed,
    #[error("Internal Server Error")]
    Metrics(#[source] prometheus::Error),
    #[error("Internal Server Error for testing")]
    Diagnostic,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::FeatureCount { .. } | ApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Inference(_)
            | ApiError::WorkerFailed
            | ApiError::Metrics(_)
            | ApiError::Diagnostic => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        error!(
            "HTTPException: status_code={}, detail={}",
            status.as_u16(),
            self
        );
        HttpResponse::build(status).json(ErrorDetail {
            detail: self.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_400() {
        let err = ApiError::FeatureCount {
            expected: 30,
            actual: 3,
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Expected 30 features, but got 3");
    }

    #[test]
    fn inference_detail_is_generic() {
        let err = ApiError::Inference(ModelError::Output("nan in tree 3".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.to_string().contains("tree 3"));
    }
}
