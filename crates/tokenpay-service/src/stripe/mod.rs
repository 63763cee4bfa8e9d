//! Stripe integration for token purchases.
//!
//! Stripe handles:
//! - Hosted Checkout sessions for package purchases
//! - Signed webhook deliveries for completed payments

pub mod client;
pub mod signature;
pub mod types;

pub use client::StripeClient;
pub use client::StripeError;
pub use signature::{SignatureError, WebhookVerifier, STRIPE_SIGNATURE_HEADER};
pub use types::*;
