//! Checkout session creation.
//!
//! [`SessionInitiator`] turns a purchase request into a hosted payment page
//! URL. Nothing is persisted here; the purchase only becomes real when the
//! provider later reports the completed session to the settlement webhook.

use std::sync::Arc;

use async_trait::async_trait;
use tokenpay_core::{CreditError, PriceTable, Result, SessionId, UserId};

use crate::stripe::{CheckoutSession, StripeError};

/// Everything the provider needs to open one checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    /// Charge in minor currency units; always a price table key.
    pub amount_minor: i64,
    /// Lowercase ISO currency code.
    pub currency: String,
    /// Line item name.
    pub product_name: String,
    /// Redirect after payment.
    pub success_url: String,
    /// Redirect after abandoning the page.
    pub cancel_url: String,
    /// Buyer; echoed back in the session metadata.
    pub user_id: UserId,
}

/// External payment provider able to open hosted checkout sessions.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Open a checkout session for `request`.
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> std::result::Result<CheckoutSession, StripeError>;
}

/// A created checkout session the buyer should be sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRedirect {
    /// Provider session ID; the settlement key once paid.
    pub session_id: SessionId,
    /// Hosted payment page.
    pub url: String,
}

/// Creates provider checkout sessions for price table packages.
#[derive(Clone)]
pub struct SessionInitiator {
    provider: Arc<dyn PaymentProvider>,
    prices: Arc<PriceTable>,
    product_name: String,
    success_url: String,
    cancel_url: String,
}

impl SessionInitiator {
    /// Create an initiator.
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        prices: Arc<PriceTable>,
        product_name: impl Into<String>,
        success_url: impl Into<String>,
        cancel_url: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            prices,
            product_name: product_name.into(),
            success_url: success_url.into(),
            cancel_url: cancel_url.into(),
        }
    }

    /// Open a checkout session for `amount_minor` on behalf of `uid`.
    ///
    /// Validation happens before the provider is contacted: an amount that is
    /// not a package price or a blank `uid` never reaches Stripe.
    pub async fn initiate(&self, amount_minor: i64, uid: &str) -> Result<CheckoutRedirect> {
        if !self.prices.contains(amount_minor) {
            tracing::info!(amount_minor, "Rejected checkout for unknown amount");
            return Err(CreditError::InvalidAmount {
                amount: amount_minor,
            });
        }

        let user_id = UserId::new(uid).map_err(|_| CreditError::InvalidUserReference)?;

        let request = CheckoutRequest {
            amount_minor,
            currency: self.prices.currency().to_string(),
            product_name: self.product_name.clone(),
            success_url: self.success_url.clone(),
            cancel_url: self.cancel_url.clone(),
            user_id,
        };

        let session = self
            .provider
            .create_checkout_session(&request)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, amount_minor, "Checkout session creation failed");
                CreditError::Upstream(e.to_string())
            })?;

        let url = session.url.clone().ok_or_else(|| {
            let e = StripeError::MissingUrl(session.id.clone());
            tracing::error!(error = %e, "Checkout session creation failed");
            CreditError::Upstream(e.to_string())
        })?;

        let session_id = SessionId::new(session.id).map_err(|e| {
            tracing::error!(error = %e, "Stripe returned a session without an ID");
            CreditError::Upstream(e.to_string())
        })?;

        tracing::info!(
            session_id = %session_id,
            user_id = %request.user_id,
            amount_minor,
            "Checkout session created"
        );

        Ok(CheckoutRedirect { session_id, url })
    }
}
