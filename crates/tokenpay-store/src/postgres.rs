//! `PostgreSQL` storage implementation.
//!
//! The settlement fence is the primary key of `settlements`. Inside one
//! transaction the fence row is inserted with `ON CONFLICT DO NOTHING` and,
//! only if a row was inserted, the balance is upserted. A concurrent insert of
//! the same key waits on the unique index until the first transaction ends
//! and then inserts nothing.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};

use tokenpay_core::{
    SessionId, SettlementOutcome, SettlementRecord, TokenGrant, UserBalance, UserId,
};

use crate::error::{Result, StoreError};
use crate::schema::POSTGRES_SCHEMA;
use crate::{retry_delay, Store, DEFAULT_MAX_RETRIES};

/// Maximum pooled connections.
const MAX_CONNECTIONS: u32 = 10;

/// SQLSTATE codes worth retrying: `serialization_failure`, `deadlock_detected`.
const RETRYABLE_SQLSTATES: &[&str] = &["40001", "40P01"];

/// PostgreSQL-backed storage implementation.
pub struct PgStore {
    pool: PgPool,
    max_retries: u32,
}

impl PgStore {
    /// Connect to `database_url` with a bounded pool.
    ///
    /// # Errors
    ///
    /// Returns an error if no connection can be established in time.
    pub async fn connect(database_url: &str, acquire_timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;

        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Set how many times a conflicting settlement is retried.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Create tables and indexes if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if a schema statement fails.
    pub async fn migrate(&self) -> Result<()> {
        for statement in POSTGRES_SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("PostgreSQL schema ready");
        Ok(())
    }

    async fn try_settle(
        &self,
        record: &SettlementRecord,
    ) -> std::result::Result<SettlementOutcome, sqlx::Error> {
        let tokens = to_db_tokens(record.grant.tokens())?;
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO settlements (session_id, user_id, amount_minor, tokens, processed_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (session_id) DO NOTHING",
        )
        .bind(record.session_id.as_str())
        .bind(record.user_id.as_str())
        .bind(record.amount_minor)
        .bind(tokens)
        .bind(record.processed_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Ok(SettlementOutcome::Duplicate {
                session_id: record.session_id.clone(),
            });
        }

        let new_balance: i64 = sqlx::query_scalar(
            "INSERT INTO user_balances (user_id, tokens, updated_at)
             VALUES ($1, $2, $3)
             ON CONFLICT (user_id)
             DO UPDATE SET tokens = user_balances.tokens + EXCLUDED.tokens,
                           updated_at = EXCLUDED.updated_at
             RETURNING tokens",
        )
        .bind(record.user_id.as_str())
        .bind(tokens)
        .bind(record.processed_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(SettlementOutcome::Settled {
            session_id: record.session_id.clone(),
            user_id: record.user_id.clone(),
            tokens_granted: record.grant.tokens(),
            new_balance: from_db_tokens(new_balance)?,
        })
    }
}

fn to_db_tokens(tokens: u64) -> std::result::Result<i64, sqlx::Error> {
    i64::try_from(tokens).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

fn from_db_tokens(tokens: i64) -> std::result::Result<u64, sqlx::Error> {
    u64::try_from(tokens).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn is_retryable(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| RETRYABLE_SQLSTATES.iter().any(|state| *state == code))
}

#[async_trait]
impl Store for PgStore {
    async fn settle(&self, record: &SettlementRecord) -> Result<SettlementOutcome> {
        let attempts = self.max_retries + 1;

        for attempt in 1..=attempts {
            match self.try_settle(record).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if is_retryable(&err) => {
                    tracing::warn!(
                        session_id = %record.session_id,
                        attempt,
                        error = %err,
                        "Settlement transaction conflicted"
                    );
                    if attempt < attempts {
                        tokio::time::sleep(retry_delay(attempt)).await;
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(StoreError::Conflict { attempts })
    }

    async fn get_settlement(&self, session_id: &SessionId) -> Result<Option<SettlementRecord>> {
        let row: Option<(String, i64, i64, DateTime<Utc>)> = sqlx::query_as(
            "SELECT user_id, amount_minor, tokens, processed_at
             FROM settlements WHERE session_id = $1",
        )
        .bind(session_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(user_id, amount_minor, tokens, processed_at)| {
            let user_id =
                UserId::new(user_id).map_err(|e| StoreError::Serialization(e.to_string()))?;
            let grant = from_db_tokens(tokens)
                .ok()
                .and_then(TokenGrant::new)
                .ok_or_else(|| StoreError::Serialization(format!("invalid token count {tokens}")))?;

            Ok(SettlementRecord {
                session_id: session_id.clone(),
                user_id,
                amount_minor,
                grant,
                processed_at,
            })
        })
        .transpose()
    }

    async fn get_balance(&self, user_id: &UserId) -> Result<UserBalance> {
        let row: Option<(i64, DateTime<Utc>)> =
            sqlx::query_as("SELECT tokens, updated_at FROM user_balances WHERE user_id = $1")
                .bind(user_id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((tokens, updated_at)) => Ok(UserBalance {
                user_id: user_id.clone(),
                tokens: from_db_tokens(tokens)?,
                updated_at: Some(updated_at),
            }),
            None => Ok(UserBalance::empty(user_id.clone())),
        }
    }
}
