//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::pipeline::PredictionError;

/// Structured error response body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

const INTERNAL_MESSAGE: &str = "An internal error occurred";

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Invalid input shape: {0}")]
    InputShape(String),
    #[error("Prediction failed: {0}")]
    Prediction(#[from] PredictionError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::InputShape(_) => StatusCode::BAD_REQUEST,
            ApiError::Prediction(e) => match e {
                PredictionError::InputShape(_)
                | PredictionError::DateParse { .. }
                | PredictionError::DateOutOfRange { .. } => StatusCode::BAD_REQUEST,
                PredictionError::NumericDomain { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                PredictionError::Encoder { .. } | PredictionError::NonFinite { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::InputShape(_) => "INPUT_SHAPE",
            ApiError::Prediction(e) => match e {
                PredictionError::InputShape(_) => "INPUT_SHAPE",
                PredictionError::DateParse { .. } => "DATE_PARSE",
                PredictionError::DateOutOfRange { .. } => "DATE_OUT_OF_RANGE",
                PredictionError::NumericDomain { .. } => "NUMERIC_DOMAIN",
                PredictionError::Encoder { .. } => "ENCODER_FAILURE",
                PredictionError::NonFinite { .. } => "INTERNAL",
            },
            ApiError::Internal(_) => "INTERNAL",
        }
    }

    /// Response body. Server-side failures are logged here and their
    /// details withheld from the client.
    pub fn body(&self) -> ErrorBody {
        let message = if self.status().is_server_error() {
            tracing::error!(error = %self, "Case prediction failed");
            INTERNAL_MESSAGE.to_string()
        } else {
            match self {
                ApiError::BadRequest(detail) | ApiError::InputShape(detail) => detail.clone(),
                ApiError::Prediction(e) => e.to_string(),
                ApiError::Internal(_) => INTERNAL_MESSAGE.to_string(),
            }
        };

        ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::EncoderError;
    use axum::body::to_bytes;

    async fn json_of(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn bad_request_returns_400_with_message() {
        let (status, json) = json_of(ApiError::BadRequest("Input must be a dictionary".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
        assert_eq!(json["error"]["message"], "Input must be a dictionary");
    }

    #[tokio::test]
    async fn input_shape_keeps_message_with_its_own_code() {
        let err = ApiError::InputShape(
            "'case' (3 items) and 'dates' (2 items) must have the same length".into(),
        );
        let (status, json) = json_of(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "INPUT_SHAPE");
        assert!(json["error"]["message"].as_str().unwrap().starts_with("'case' (3 items)"));
    }

    #[tokio::test]
    async fn date_parse_returns_400() {
        let err = PredictionError::DateParse {
            index: 2,
            value: "2024-01-01".into(),
        };
        let (status, json) = json_of(err.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "DATE_PARSE");
        assert!(json["error"]["message"].as_str().unwrap().contains("2024-01-01"));
    }

    #[tokio::test]
    async fn numeric_domain_returns_422() {
        let err = PredictionError::NumericDomain {
            index: 1,
            feature: "log_prev",
            delta_days: -30.0,
        };
        let (status, json) = json_of(err.into()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["error"]["code"], "NUMERIC_DOMAIN");
    }

    #[tokio::test]
    async fn encoder_failure_hides_details() {
        let err = PredictionError::Encoder {
            index: 0,
            source: EncoderError::Inference("CUDA out of memory at 0xdeadbeef".into()),
        };
        let (status, json) = json_of(err.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"]["code"], "ENCODER_FAILURE");
        assert_eq!(json["error"]["message"], INTERNAL_MESSAGE);
    }

    #[tokio::test]
    async fn internal_returns_500() {
        let (status, json) = json_of(ApiError::Internal("task panicked".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        // Internal errors hide details from client
        assert_eq!(json["error"]["message"], INTERNAL_MESSAGE);
    }
}
