//! API error types and responses.
//!
//! The two endpoints answer in different shapes: checkout speaks JSON to the
//! browser, while the webhook answers Stripe in plain text and only uses the
//! status code to decide whether Stripe should redeliver.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tokenpay_core::CreditError;

use crate::handlers::webhooks::WebhookResponse;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Bad request - body could not be decoded.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Checkout request failed.
    #[error(transparent)]
    Checkout(CreditError),

    /// Webhook delivery failed.
    #[error(transparent)]
    Webhook(CreditError),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(msg) => json_error(StatusCode::BAD_REQUEST, msg),
            Self::Checkout(err) => {
                let status = match &err {
                    CreditError::InvalidAmount { .. } | CreditError::InvalidUserReference => {
                        StatusCode::BAD_REQUEST
                    }
                    CreditError::Upstream(_) => StatusCode::BAD_GATEWAY,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                json_error(status, err.to_string())
            }
            Self::Webhook(err) => webhook_error(err),
        }
    }
}

fn json_error(status: StatusCode, message: String) -> Response {
    (status, Json(ErrorResponse { error: message })).into_response()
}

fn webhook_error(err: CreditError) -> Response {
    match err {
        CreditError::AuthenticationFailed(_) | CreditError::MissingUserReference { .. } => {
            (StatusCode::BAD_REQUEST, err.to_string()).into_response()
        }
        // Redelivery cannot fix an unmapped amount; the processor already alerted.
        CreditError::UnknownAmount { .. } => Json(WebhookResponse { received: true }).into_response(),
        CreditError::Persistence(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Settlement failed, please retry".to_string(),
        )
            .into_response(),
        other => {
            tracing::error!(error = %other, "Unexpected webhook error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal error occurred".to_string(),
            )
                .into_response()
        }
    }
}
