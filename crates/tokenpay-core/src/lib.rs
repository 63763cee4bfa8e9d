//! Core types for tokenpay.
//!
//! This crate provides the foundational types shared by the checkout and
//! settlement sides of the service:
//!
//! - **Identifiers**: `UserId`, `SessionId`
//! - **Pricing**: `PriceTable`, `TokenGrant`
//! - **Settlement**: `SettlementRecord`, `UserBalance`, `SettlementOutcome`
//! - **Errors**: `CreditError`, the request-level error taxonomy
//!
//! # Units
//!
//! Monetary amounts are integer minor units of the price table currency
//! (3900 = 39.00 EUR). Token counts are unsigned and never go below zero.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod pricing;
pub mod settlement;

pub use error::{CreditError, Result};
pub use ids::{IdError, SessionId, UserId};
pub use pricing::{PriceTable, TokenGrant, REFERENCE_CURRENCY};
pub use settlement::{SettlementOutcome, SettlementRecord, UserBalance};
