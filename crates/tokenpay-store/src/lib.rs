//! Storage layer for tokenpay.
//!
//! The store owns two kinds of records:
//!
//! - **Settlement fences**: one `SettlementRecord` per payment session,
//!   keyed by `sessions/{session_id}`
//! - **Balances**: one `UserBalance` per user, keyed by `users/{uid}/tokens`
//!
//! The only write path is [`Store::settle`], which creates the fence and
//! increments the balance as one atomic unit of work. Mutual exclusion between
//! duplicate deliveries of the same session lives here, in the backend's own
//! concurrency control, so that the service can be scaled horizontally.
//!
//! # Backends
//!
//! - [`MemoryStore`]: a single lock around both maps (tests and local dev)
//! - `RocksStore` (`rocksdb-backend`): pessimistic `TransactionDB`
//! - `PgStore` (`postgres-backend`): unique constraint + transaction
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> tokenpay_store::Result<()> {
//! use tokenpay_core::{SessionId, SettlementRecord, TokenGrant, UserId};
//! use tokenpay_store::{MemoryStore, Store};
//!
//! let store = MemoryStore::new();
//! let record = SettlementRecord::new(
//!     SessionId::new("cs_test_1").unwrap(),
//!     UserId::new("user-1").unwrap(),
//!     3900,
//!     TokenGrant::new(2500).unwrap(),
//! );
//!
//! let outcome = store.settle(&record).await?;
//! assert!(outcome.is_settled());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod memory;
#[cfg(feature = "postgres-backend")]
pub mod postgres;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "postgres-backend")]
pub use postgres::PgStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use std::time::Duration;

use async_trait::async_trait;
use tokenpay_core::{SessionId, SettlementOutcome, SettlementRecord, UserBalance, UserId};

/// Default number of times a conflicting settlement is retried.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Pause between conflicting settlement attempts, multiplied by the attempt number.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(25);

/// Linear backoff before retrying after the `attempt`-th conflict.
#[cfg(any(feature = "rocksdb-backend", feature = "postgres-backend"))]
pub(crate) fn retry_delay(attempt: u32) -> Duration {
    RETRY_BACKOFF * attempt
}

/// The storage trait defining all settlement operations.
///
/// This trait abstracts the storage layer, allowing for different
/// implementations (e.g., `RocksDB`, `PostgreSQL`, in-memory for testing).
#[async_trait]
pub trait Store: Send + Sync {
    /// Create the settlement fence for `record.session_id` and add
    /// `record.grant` to the user's balance, atomically.
    ///
    /// Returns `SettlementOutcome::Settled` with the new balance when the
    /// fence was created, or `SettlementOutcome::Duplicate` when it already
    /// existed (in which case nothing was written).
    ///
    /// # Errors
    ///
    /// - `StoreError::Conflict` if lock conflicts exhausted the retries.
    /// - `StoreError::BalanceOverflow` if the grant would overflow the balance.
    /// - `StoreError::Database` / `StoreError::Serialization` on backend failure.
    async fn settle(&self, record: &SettlementRecord) -> Result<SettlementOutcome>;

    /// Get the settlement fence for a session, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_settlement(&self, session_id: &SessionId) -> Result<Option<SettlementRecord>>;

    /// Get a user's balance. Users that were never credited have zero tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_balance(&self, user_id: &UserId) -> Result<UserBalance>;
}
