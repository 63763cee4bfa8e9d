//! In-memory storage implementation.
//!
//! Both maps sit behind one lock, so the fence check and the balance update
//! are a single critical section. Only suitable for a single process.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokenpay_core::{SessionId, SettlementOutcome, SettlementRecord, UserBalance, UserId};

use crate::error::{Result, StoreError};
use crate::Store;

#[derive(Default)]
struct Tables {
    settlements: HashMap<SessionId, SettlementRecord>,
    balances: HashMap<UserId, UserBalance>,
}

/// Memory-backed storage implementation.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Database("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn settle(&self, record: &SettlementRecord) -> Result<SettlementOutcome> {
        let mut tables = self.lock()?;

        if tables.settlements.contains_key(&record.session_id) {
            return Ok(SettlementOutcome::Duplicate {
                session_id: record.session_id.clone(),
            });
        }

        let current = tables
            .balances
            .get(&record.user_id)
            .cloned()
            .unwrap_or_else(|| UserBalance::empty(record.user_id.clone()));

        let updated = current
            .credited(record.grant)
            .ok_or_else(|| StoreError::BalanceOverflow {
                user_id: record.user_id.to_string(),
            })?;
        let new_balance = updated.tokens;

        tables
            .settlements
            .insert(record.session_id.clone(), record.clone());
        tables.balances.insert(record.user_id.clone(), updated);

        Ok(SettlementOutcome::Settled {
            session_id: record.session_id.clone(),
            user_id: record.user_id.clone(),
            tokens_granted: record.grant.tokens(),
            new_balance,
        })
    }

    async fn get_settlement(&self, session_id: &SessionId) -> Result<Option<SettlementRecord>> {
        Ok(self.lock()?.settlements.get(session_id).cloned())
    }

    async fn get_balance(&self, user_id: &UserId) -> Result<UserBalance> {
        Ok(self
            .lock()?
            .balances
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| UserBalance::empty(user_id.clone())))
    }
}
