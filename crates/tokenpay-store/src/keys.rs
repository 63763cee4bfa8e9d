//! Key encoding for settlement fences and balances.
//!
//! Keys are path-like strings so that the same layout can be used by any
//! key-value backend.

use tokenpay_core::{SessionId, UserId};

/// Prefix of settlement fence keys.
pub const SETTLEMENT_PREFIX: &str = "sessions/";

/// Prefix of balance keys.
pub const BALANCE_PREFIX: &str = "users/";

/// Suffix of balance keys.
pub const BALANCE_SUFFIX: &str = "/tokens";

/// Settlement fence key: `sessions/{session_id}`.
#[must_use]
pub fn settlement_key(session_id: &SessionId) -> String {
    format!("{SETTLEMENT_PREFIX}{session_id}")
}

/// Balance key: `users/{uid}/tokens`.
#[must_use]
pub fn balance_key(user_id: &UserId) -> String {
    format!("{BALANCE_PREFIX}{user_id}{BALANCE_SUFFIX}")
}
