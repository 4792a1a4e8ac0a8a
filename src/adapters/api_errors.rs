use crate::domain::error::PipelineError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// HTTP face of [`PipelineError`]. Internal detail is logged, not returned.
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self.0 {
            PipelineError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                msg.clone(),
            ),
            PipelineError::WebhookSignature(_) => (
                StatusCode::BAD_REQUEST,
                "signature_error",
                "invalid signature".to_string(),
            ),
            PipelineError::EmptyPayload
            | PipelineError::InvalidJson(_)
            | PipelineError::MissingData
            | PipelineError::MissingPaymentId => (
                StatusCode::BAD_REQUEST,
                "payload_error",
                self.0.to_string(),
            ),
            PipelineError::LockTimeout { .. } => (
                StatusCode::CONFLICT,
                "payment_processing",
                "payment is being processed, retry later".to_string(),
            ),
            PipelineError::OrderNotFound(_) => (
                StatusCode::NOT_FOUND,
                "order_not_found",
                self.0.to_string(),
            ),
            PipelineError::Provider(msg) => {
                tracing::error!("provider error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "provider_error",
                    "payment provider unavailable".to_string(),
                )
            }
            PipelineError::Database(_)
            | PipelineError::Serialization(_)
            | PipelineError::Config(_)
            | PipelineError::Internal(_) => {
                tracing::error!("internal error: {}", self.0);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error_code": error_code,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}
