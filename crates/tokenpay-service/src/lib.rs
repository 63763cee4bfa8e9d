//! Tokenpay HTTP API Service.
//!
//! This crate provides the HTTP API for selling token packages:
//!
//! - Checkout session creation against the price table (Stripe Checkout)
//! - Settlement of `checkout.session.completed` webhooks into user balances
//!
//! # Settlement guarantees
//!
//! Webhooks are authenticated against the raw request bytes before anything
//! in them is trusted, and each payment session credits its user at most
//! once. Duplicate and concurrent deliveries are serialized by the store, not
//! by this process.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result

pub mod checkout;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod settlement;
pub mod state;
pub mod stripe;

pub use checkout::{CheckoutRedirect, CheckoutRequest, PaymentProvider, SessionInitiator};
pub use config::{ConfigError, ServiceConfig, StoreConfig};
pub use error::ApiError;
pub use routes::create_router;
pub use settlement::SettlementProcessor;
pub use state::AppState;
pub use stripe::{StripeClient, StripeError, WebhookVerifier};
