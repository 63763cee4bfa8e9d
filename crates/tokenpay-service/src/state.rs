//! Application state.

use std::sync::Arc;
use std::time::Duration;

use tokenpay_store::Store;

use crate::checkout::{PaymentProvider, SessionInitiator};
use crate::config::ServiceConfig;
use crate::settlement::SettlementProcessor;
use crate::stripe::WebhookVerifier;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: ServiceConfig,

    /// Creates checkout sessions.
    pub initiator: SessionInitiator,

    /// Settles webhook deliveries.
    pub processor: SettlementProcessor,
}

impl AppState {
    /// Wire the components from configuration and injected collaborators.
    #[must_use]
    pub fn new(
        config: ServiceConfig,
        store: Arc<dyn Store>,
        provider: Arc<dyn PaymentProvider>,
    ) -> Self {
        let prices = Arc::new(config.prices.clone());

        let initiator = SessionInitiator::new(
            provider,
            Arc::clone(&prices),
            config.product_name.clone(),
            config.success_url(),
            config.cancel_url(),
        );

        let processor = SettlementProcessor::new(
            store,
            prices,
            WebhookVerifier::new(
                config.stripe_webhook_secret.clone(),
                i64::from(config.webhook_tolerance_seconds),
            ),
            Duration::from_secs(config.store_timeout_seconds),
        );

        Self {
            config,
            initiator,
            processor,
        }
    }
}
