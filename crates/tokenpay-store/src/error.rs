//! Error types for tokenpay storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Concurrent writers kept conflicting on the same keys.
    #[error("settlement conflict persisted after {attempts} attempts")]
    Conflict {
        /// Number of attempts made.
        attempts: u32,
    },

    /// Crediting would overflow the balance.
    #[error("balance overflow for user {user_id}")]
    BalanceOverflow {
        /// The user whose balance would overflow.
        user_id: String,
    },
}

#[cfg(feature = "postgres-backend")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}
