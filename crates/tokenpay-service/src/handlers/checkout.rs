//! Checkout handlers.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for `POST /api/checkout`.
#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    /// Package price in minor units.
    pub amount: i64,
    /// Buyer's user id.
    pub uid: String,
}

/// Response body for a created checkout session.
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    /// Hosted payment page to redirect the browser to.
    pub url: String,
}

/// Create a checkout session.
///
/// POST /api/checkout
pub async fn create_checkout(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CheckoutBody>, JsonRejection>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let Json(body) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let redirect = state
        .initiator
        .initiate(body.amount, &body.uid)
        .await
        .map_err(ApiError::Checkout)?;

    Ok(Json(CheckoutResponse { url: redirect.url }))
}

/// Answer a preflight for the checkout endpoint.
///
/// OPTIONS /api/checkout
///
/// The allowed origin is `*` when the configured list contains it,
/// otherwise the request's `Origin` echoed back if it is listed.
pub async fn checkout_preflight(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let mut response = HeaderMap::new();
    response.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    response.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );

    let origins = &state.config.cors_origins;
    if origins.iter().any(|o| o == "*") {
        response.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
    } else if let Some(origin) = headers.get(header::ORIGIN) {
        if origins.iter().any(|o| o.as_bytes() == origin.as_bytes()) {
            response.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
            response.insert(header::VARY, HeaderValue::from_static("origin"));
        }
    }

    (StatusCode::NO_CONTENT, response)
}
