//! Stripe API types.

use std::collections::HashMap;

use serde::Deserialize;

/// Event type that settles a purchase.
pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

/// Metadata key carrying our user reference on a checkout session.
pub const UID_METADATA_KEY: &str = "uid";

/// Stripe Checkout session object.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutSession {
    /// Session ID.
    pub id: String,
    /// Checkout URL to redirect the user to.
    #[serde(default)]
    pub url: Option<String>,
    /// Payment status.
    #[serde(default)]
    pub payment_status: Option<String>,
    /// Total amount in minor units.
    #[serde(default)]
    pub amount_total: Option<i64>,
    /// Three-letter ISO currency code, lowercase.
    #[serde(default)]
    pub currency: Option<String>,
    /// Client reference ID (our `uid`).
    #[serde(default)]
    pub client_reference_id: Option<String>,
    /// Metadata. Stripe sends `null` or an object of string values.
    #[serde(default, deserialize_with = "nullable_metadata")]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    /// The user reference we attached when creating the session.
    #[must_use]
    pub fn uid(&self) -> Option<&str> {
        self.metadata
            .get(UID_METADATA_KEY)
            .map(String::as_str)
            .filter(|uid| !uid.trim().is_empty())
    }
}

fn nullable_metadata<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<HashMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Stripe webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Event ID.
    pub id: String,
    /// Event type (e.g., "checkout.session.completed").
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event data; only completed checkout events are required to carry it.
    #[serde(default)]
    pub data: Option<WebhookEventData>,
    /// Created timestamp (Unix).
    #[serde(default)]
    pub created: i64,
    /// Whether the event came from live mode.
    #[serde(default)]
    pub livemode: bool,
}

/// Webhook event data container.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    /// The event object.
    pub object: serde_json::Value,
}

/// Stripe API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorResponse {
    /// Error details.
    pub error: StripeErrorDetail,
}

/// Stripe error detail.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorDetail {
    /// Error type.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error message.
    #[serde(default)]
    pub message: String,
    /// Error code.
    #[serde(default)]
    pub code: Option<String>,
    /// Parameter that caused the error.
    #[serde(default)]
    pub param: Option<String>,
}
