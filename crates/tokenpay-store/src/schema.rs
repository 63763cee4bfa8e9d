//! Database schema definitions.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Settlement fences, keyed by `sessions/{session_id}`.
    pub const SETTLEMENTS: &str = "settlements";

    /// User balances, keyed by `users/{uid}/tokens`.
    pub const BALANCES: &str = "balances";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::SETTLEMENTS, cf::BALANCES]
}

/// `PostgreSQL` schema, applied statement by statement at startup.
///
/// The primary key on `settlements.session_id` is the idempotency fence.
pub const POSTGRES_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS settlements (
        session_id   TEXT PRIMARY KEY,
        user_id      TEXT NOT NULL,
        amount_minor BIGINT NOT NULL,
        tokens       BIGINT NOT NULL CHECK (tokens > 0),
        processed_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS user_balances (
        user_id    TEXT PRIMARY KEY,
        tokens     BIGINT NOT NULL DEFAULT 0 CHECK (tokens >= 0),
        updated_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS settlements_user_id_idx ON settlements (user_id)",
];
