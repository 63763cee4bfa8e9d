//! Price table for token packages.
//!
//! The table is the only thing the checkout and settlement paths share: the
//! checkout path uses it to validate a requested amount, the settlement path
//! uses it to turn the charged amount back into a token grant.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Currency of the reference price table.
pub const REFERENCE_CURRENCY: &str = "eur";

/// Number of tokens granted for a purchase. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenGrant(u64);

impl TokenGrant {
    /// Create a grant. Returns `None` for zero.
    #[must_use]
    pub const fn new(tokens: u64) -> Option<Self> {
        if tokens == 0 {
            None
        } else {
            Some(Self(tokens))
        }
    }

    /// Number of tokens.
    #[must_use]
    pub const fn tokens(self) -> u64 {
        self.0
    }
}

/// Immutable mapping from amount (minor units) to token grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTable {
    currency: String,
    entries: BTreeMap<i64, TokenGrant>,
}

impl PriceTable {
    /// Build a table from `(amount_minor, tokens)` pairs.
    ///
    /// Pairs with a non-positive amount or a zero token count are dropped.
    #[must_use]
    pub fn new(currency: impl Into<String>, entries: impl IntoIterator<Item = (i64, u64)>) -> Self {
        let entries = entries
            .into_iter()
            .filter(|(amount, _)| *amount > 0)
            .filter_map(|(amount, tokens)| TokenGrant::new(tokens).map(|grant| (amount, grant)))
            .collect();

        Self {
            currency: currency.into(),
            entries,
        }
    }

    /// The reference deployment table: 39, 95 and 290 EUR packages.
    #[must_use]
    pub fn reference() -> Self {
        Self::new(
            REFERENCE_CURRENCY,
            [(3900, 2500), (9500, 6500), (29000, 20000)],
        )
    }

    /// ISO currency code (lowercase, as the provider expects it).
    #[must_use]
    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Whether `amount_minor` is a purchasable amount.
    #[must_use]
    pub fn contains(&self, amount_minor: i64) -> bool {
        self.entries.contains_key(&amount_minor)
    }

    /// Token grant for `amount_minor`, if the amount is in the table.
    #[must_use]
    pub fn grant_for(&self, amount_minor: i64) -> Option<TokenGrant> {
        self.entries.get(&amount_minor).copied()
    }

    /// Purchasable amounts in ascending order.
    pub fn amounts(&self) -> impl Iterator<Item = i64> + '_ {
        self.entries.keys().copied()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PriceTable {
    fn default() -> Self {
        Self::reference()
    }
}
