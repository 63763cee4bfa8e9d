//! `RocksDB` storage implementation.
//!
//! Settlement runs inside a pessimistic `TransactionDB` transaction: the fence
//! key and the balance key are both read with `get_for_update`, which takes an
//! exclusive lock until commit. A second delivery of the same session blocks
//! on the fence lock and then observes the committed record.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, ErrorKind, MultiThreaded, Options, TransactionDB,
    TransactionDBOptions,
};

use tokenpay_core::{SessionId, SettlementOutcome, SettlementRecord, UserBalance, UserId};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{retry_delay, Store, DEFAULT_MAX_RETRIES};

type Db = TransactionDB<MultiThreaded>;

/// How long a transaction waits for a row lock before giving up.
const LOCK_TIMEOUT_MS: i64 = 2_000;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<Db>,
    max_retries: u32,
}

/// Why a single settlement attempt failed.
enum AttemptError {
    /// Lock timeout or write conflict; worth another attempt.
    Conflict(rocksdb::Error),
    /// Anything else.
    Fatal(StoreError),
}

impl From<rocksdb::Error> for AttemptError {
    fn from(err: rocksdb::Error) -> Self {
        match err.kind() {
            ErrorKind::Busy | ErrorKind::TimedOut | ErrorKind::TryAgain => Self::Conflict(err),
            _ => Self::Fatal(StoreError::Database(err.to_string())),
        }
    }
}

impl From<StoreError> for AttemptError {
    fn from(err: StoreError) -> Self {
        Self::Fatal(err)
    }
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let mut txn_opts = TransactionDBOptions::default();
        txn_opts.set_txn_lock_timeout(LOCK_TIMEOUT_MS);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = Db::open_cf_descriptors(&opts, &txn_opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Set how many times a conflicting settlement is retried.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Get a column family handle.
    fn cf<'a>(db: &'a Db, name: &str) -> Result<Arc<BoundColumnFamily<'a>>> {
        db.cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// One settlement attempt. Dropping the transaction without commit rolls
    /// it back, so every early return leaves the database untouched.
    fn try_settle(
        db: &Db,
        record: &SettlementRecord,
    ) -> std::result::Result<SettlementOutcome, AttemptError> {
        let settlements = Self::cf(db, cf::SETTLEMENTS)?;
        let balances = Self::cf(db, cf::BALANCES)?;

        let fence_key = keys::settlement_key(&record.session_id);
        let balance_key = keys::balance_key(&record.user_id);

        let txn = db.transaction();

        // Lock order is always fence, then balance.
        if txn
            .get_for_update_cf(&settlements, &fence_key, true)?
            .is_some()
        {
            txn.rollback()?;
            return Ok(SettlementOutcome::Duplicate {
                session_id: record.session_id.clone(),
            });
        }

        let current = match txn.get_for_update_cf(&balances, &balance_key, true)? {
            Some(data) => Self::deserialize::<UserBalance>(&data)?,
            None => UserBalance::empty(record.user_id.clone()),
        };

        let updated = current
            .credited(record.grant)
            .ok_or_else(|| StoreError::BalanceOverflow {
                user_id: record.user_id.to_string(),
            })?;

        txn.put_cf(&settlements, &fence_key, Self::serialize(record)?)?;
        txn.put_cf(&balances, &balance_key, Self::serialize(&updated)?)?;
        txn.commit()?;

        Ok(SettlementOutcome::Settled {
            session_id: record.session_id.clone(),
            user_id: record.user_id.clone(),
            tokens_granted: record.grant.tokens(),
            new_balance: updated.tokens,
        })
    }

    /// Read and decode one value outside of a transaction.
    fn read<T: serde::de::DeserializeOwned>(db: &Db, family: &str, key: &str) -> Result<Option<T>> {
        let handle = Self::cf(db, family)?;
        db.get_cf(&handle, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Db) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StoreError::Database(format!("blocking task failed: {e}")))?
    }
}

#[async_trait]
impl Store for RocksStore {
    async fn settle(&self, record: &SettlementRecord) -> Result<SettlementOutcome> {
        let attempts = self.max_retries + 1;

        for attempt in 1..=attempts {
            let db = Arc::clone(&self.db);
            let owned = record.clone();
            let result = tokio::task::spawn_blocking(move || Self::try_settle(&db, &owned))
                .await
                .map_err(|e| StoreError::Database(format!("blocking task failed: {e}")))?;

            match result {
                Ok(outcome) => return Ok(outcome),
                Err(AttemptError::Fatal(err)) => return Err(err),
                Err(AttemptError::Conflict(err)) => {
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
            }
        }

        Err(StoreError::Conflict { attempts })
    }

    async fn get_settlement(&self, session_id: &SessionId) -> Result<Option<SettlementRecord>> {
        let key = keys::settlement_key(session_id);
        self.blocking(move |db| Self::read(db, cf::SETTLEMENTS, &key))
            .await
    }

    async fn get_balance(&self, user_id: &UserId) -> Result<UserBalance> {
        let key = keys::balance_key(user_id);
        let balance: Option<UserBalance> = self
            .blocking(move |db| Self::read(db, cf::BALANCES, &key))
            .await?;
        Ok(balance.unwrap_or_else(|| UserBalance::empty(user_id.clone())))
    }
}
