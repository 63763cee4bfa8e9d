//! Webhook handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;
use crate::stripe::STRIPE_SIGNATURE_HEADER;

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was received.
    pub received: bool,
}

/// Handle Stripe webhook.
///
/// POST /api/webhooks/stripe
///
/// The body is taken as raw bytes: the signature covers the exact payload,
/// so it must not be decoded before verification.
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    state
        .processor
        .process(&body, signature)
        .await
        .map_err(ApiError::Webhook)?;

    Ok(Json(WebhookResponse { received: true }))
}
