//! Error taxonomy for checkout and settlement requests.

/// Result type for tokenpay operations.
pub type Result<T> = std::result::Result<T, CreditError>;

/// Errors that can end a checkout or settlement request.
///
/// Validation and authentication errors are terminal for the request.
/// `Persistence` is the only variant meant to be retried, by the provider's
/// redelivery of the notification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CreditError {
    /// Requested amount is not in the price table.
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount in minor units.
        amount: i64,
    },

    /// Checkout request carried no usable user id.
    #[error("Invalid user reference")]
    InvalidUserReference,

    /// Notification signature or payload could not be verified.
    #[error("Webhook error: {0}")]
    AuthenticationFailed(String),

    /// Authentic notification without the user id metadata.
    #[error("UID not found")]
    MissingUserReference {
        /// Session the notification was about.
        session_id: String,
    },

    /// Charged amount does not map to a token grant.
    #[error("unknown amount {amount:?} for session {session_id}")]
    UnknownAmount {
        /// Session the notification was about.
        session_id: String,
        /// Charged amount, if the notification carried one.
        amount: Option<i64>,
    },

    /// Payment provider call failed or was rejected.
    #[error("{0}")]
    Upstream(String),

    /// Store unavailable, timed out, or conflicts exhausted retries.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl CreditError {
    /// Whether the notification transport should redeliver.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}
