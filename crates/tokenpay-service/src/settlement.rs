//! Settlement of completed checkout sessions.
//!
//! [`SettlementProcessor::process`] takes a webhook delivery exactly as it
//! arrived and runs it through authentication, event filtering, extraction,
//! grant lookup and the store's idempotent settle. Everything before the
//! store call is pure; the store alone decides whether a session was already
//! settled.

use std::sync::Arc;
use std::time::Duration;

use tokenpay_core::{
    CreditError, PriceTable, Result, SessionId, SettlementOutcome, SettlementRecord, UserId,
};
use tokenpay_store::Store;

use crate::stripe::{CheckoutSession, WebhookEvent, WebhookVerifier, CHECKOUT_SESSION_COMPLETED};

/// Turns verified provider notifications into balance credits.
#[derive(Clone)]
pub struct SettlementProcessor {
    store: Arc<dyn Store>,
    prices: Arc<PriceTable>,
    verifier: WebhookVerifier,
    store_timeout: Duration,
}

impl SettlementProcessor {
    /// Create a processor.
    pub fn new(
        store: Arc<dyn Store>,
        prices: Arc<PriceTable>,
        verifier: WebhookVerifier,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            prices,
            verifier,
            store_timeout,
        }
    }

    /// Process one webhook delivery.
    ///
    /// `payload` must be the untouched request body; `signature` is the
    /// `Stripe-Signature` header value, if any.
    pub async fn process(&self, payload: &[u8], signature: Option<&str>) -> Result<SettlementOutcome> {
        self.verifier.verify(payload, signature).map_err(|e| {
            tracing::warn!(error = %e, "Rejected webhook with invalid signature");
            CreditError::AuthenticationFailed(e.to_string())
        })?;

        let event: WebhookEvent = serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(error = %e, "Rejected signed webhook with malformed payload");
            CreditError::AuthenticationFailed(format!("Malformed event payload: {e}"))
        })?;

        if event.event_type != CHECKOUT_SESSION_COMPLETED {
            tracing::debug!(
                event_id = %event.id,
                event_type = %event.event_type,
                "Ignoring webhook event"
            );
            return Ok(SettlementOutcome::Ignored {
                event_type: event.event_type,
            });
        }

        let Some(data) = event.data else {
            tracing::warn!(event_id = %event.id, "Completed event without data");
            return Err(CreditError::AuthenticationFailed(
                "Malformed checkout session: missing event data".into(),
            ));
        };

        let session: CheckoutSession = serde_json::from_value(data.object).map_err(|e| {
            tracing::warn!(event_id = %event.id, error = %e, "Completed event without a checkout session");
            CreditError::AuthenticationFailed(format!("Malformed checkout session: {e}"))
        })?;

        let record = self.settlement_record(&event.id, session)?;
        self.settle(&record).await
    }

    /// Validate a completed session and price it.
    fn settlement_record(&self, event_id: &str, session: CheckoutSession) -> Result<SettlementRecord> {
        let Some(user_id) = session.uid().and_then(|uid| UserId::new(uid).ok()) else {
            tracing::warn!(
                event_id = %event_id,
                session_id = %session.id,
                "Completed checkout session has no uid"
            );
            return Err(CreditError::MissingUserReference {
                session_id: session.id,
            });
        };

        let session_id = SessionId::new(session.id.as_str()).map_err(|e| {
            tracing::warn!(event_id = %event_id, error = %e, "Completed checkout session has no id");
            CreditError::AuthenticationFailed(e.to_string())
        })?;

        let Some((amount, grant)) = session
            .amount_total
            .and_then(|amount| self.prices.grant_for(amount).map(|grant| (amount, grant)))
        else {
            tracing::error!(
                event_id = %event_id,
                session_id = %session_id,
                user_id = %user_id,
                amount_total = ?session.amount_total,
                currency = ?session.currency,
                "Paid amount has no token grant; session left unsettled"
            );
            return Err(CreditError::UnknownAmount {
                session_id: session_id.to_string(),
                amount: session.amount_total,
            });
        };

        Ok(SettlementRecord::new(session_id, user_id, amount, grant))
    }

    async fn settle(&self, record: &SettlementRecord) -> Result<SettlementOutcome> {
        let outcome = tokio::time::timeout(self.store_timeout, self.store.settle(record))
            .await
            .map_err(|_| {
                tracing::error!(
                    session_id = %record.session_id,
                    timeout_ms = u64::try_from(self.store_timeout.as_millis()).unwrap_or(u64::MAX),
                    "Settlement timed out"
                );
                CreditError::Persistence("settlement timed out".into())
            })?
            .map_err(|e| {
                tracing::error!(session_id = %record.session_id, error = %e, "Settlement failed");
                CreditError::Persistence(e.to_string())
            })?;

        match &outcome {
            SettlementOutcome::Settled {
                session_id,
                user_id,
                tokens_granted,
                new_balance,
            } => tracing::info!(
                session_id = %session_id,
                user_id = %user_id,
                tokens_granted,
                new_balance,
                "Checkout session settled"
            ),
            SettlementOutcome::Duplicate { session_id } => {
                tracing::info!(session_id = %session_id, "Duplicate delivery; already settled");
            }
            SettlementOutcome::Ignored { .. } => {}
        }

        Ok(outcome)
    }
}
