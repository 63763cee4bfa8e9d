//! Settlement records and balances.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{SessionId, TokenGrant, UserId};

/// Proof that a payment session has been credited.
///
/// Created once per session id, in the same atomic unit of work as the
/// balance increment, and never updated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    /// The payment session this record fences.
    pub session_id: SessionId,

    /// The user that was credited.
    pub user_id: UserId,

    /// Amount charged, in minor units.
    pub amount_minor: i64,

    /// Tokens added to the balance.
    pub grant: TokenGrant,

    /// When the settlement was written.
    pub processed_at: DateTime<Utc>,
}

impl SettlementRecord {
    /// Create a record stamped with the current time.
    #[must_use]
    pub fn new(session_id: SessionId, user_id: UserId, amount_minor: i64, grant: TokenGrant) -> Self {
        Self {
            session_id,
            user_id,
            amount_minor,
            grant,
            processed_at: Utc::now(),
        }
    }
}

/// A user's token balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBalance {
    /// The balance owner.
    pub user_id: UserId,

    /// Current token count.
    pub tokens: u64,

    /// Last mutation time; `None` for a user that was never credited.
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserBalance {
    /// A zero balance for a user with no history.
    #[must_use]
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            tokens: 0,
            updated_at: None,
        }
    }

    /// Return the balance with `grant` added, or `None` on overflow.
    #[must_use]
    pub fn credited(mut self, grant: TokenGrant) -> Option<Self> {
        self.tokens = self.tokens.checked_add(grant.tokens())?;
        self.updated_at = Some(Utc::now());
        Some(self)
    }
}

/// Result of handling one payment notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// The grant was applied and the fence written.
    Settled {
        /// Session that was settled.
        session_id: SessionId,
        /// User that was credited.
        user_id: UserId,
        /// Tokens added.
        tokens_granted: u64,
        /// Balance after the grant.
        new_balance: u64,
    },

    /// The session was already settled; nothing changed.
    Duplicate {
        /// Session that was already settled.
        session_id: SessionId,
    },

    /// The event type does not trigger settlement.
    Ignored {
        /// The provider's event type.
        event_type: String,
    },
}

impl SettlementOutcome {
    /// Whether this outcome mutated a balance.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Settled { .. })
    }
}
