//! Common test utilities for tokenpay integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderName, HeaderValue};
use axum_test::{TestResponse, TestServer};
use serde_json::{json, Value};
use tempfile::TempDir;

use tokenpay_core::{SessionId, SettlementOutcome, SettlementRecord, UserBalance, UserId};
use tokenpay_service::stripe::CheckoutSession;
use tokenpay_service::{
    create_router, AppState, CheckoutRequest, PaymentProvider, ServiceConfig, StripeError,
    WebhookVerifier,
};
use tokenpay_store::{MemoryStore, Store, StoreError};

/// Webhook signing secret used by every harness.
pub const WEBHOOK_SECRET: &str = "whsec_integration_test";

/// Redirect URL returned by [`MockProvider`].
pub const CHECKOUT_URL: &str = "https://checkout.stripe.test/c/pay/cs_test_mock";

/// Store wrapper counting every call that reaches the backend.
pub struct CountingStore {
    inner: Arc<dyn Store>,
    calls: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: Arc<dyn Store>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for CountingStore {
    async fn settle(&self, record: &SettlementRecord) -> tokenpay_store::Result<SettlementOutcome> {
        self.touch();
        self.inner.settle(record).await
    }

    async fn get_settlement(
        &self,
        session_id: &SessionId,
    ) -> tokenpay_store::Result<Option<SettlementRecord>> {
        self.touch();
        self.inner.get_settlement(session_id).await
    }

    async fn get_balance(&self, user_id: &UserId) -> tokenpay_store::Result<UserBalance> {
        self.touch();
        self.inner.get_balance(user_id).await
    }
}

/// How a [`FlakyStore`] answers `settle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleMode {
    /// Delegate to the in-memory store.
    Healthy,
    /// Fail with a database error.
    Failing,
    /// Never finish.
    Hanging,
}

/// In-memory store whose `settle` can be switched to fail or hang; reads always work.
pub struct FlakyStore {
    inner: MemoryStore,
    mode: Mutex<SettleMode>,
}

impl FlakyStore {
    pub fn new(mode: SettleMode) -> Self {
        Self {
            inner: MemoryStore::new(),
            mode: Mutex::new(mode),
        }
    }

    pub fn set_mode(&self, mode: SettleMode) {
        *self.mode.lock().unwrap() = mode;
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn settle(&self, record: &SettlementRecord) -> tokenpay_store::Result<SettlementOutcome> {
        let mode = *self.mode.lock().unwrap();
        match mode {
            SettleMode::Healthy => self.inner.settle(record).await,
            SettleMode::Failing => Err(StoreError::Database("connection refused".into())),
            SettleMode::Hanging => std::future::pending().await,
        }
    }

    async fn get_settlement(
        &self,
        session_id: &SessionId,
    ) -> tokenpay_store::Result<Option<SettlementRecord>> {
        self.inner.get_settlement(session_id).await
    }

    async fn get_balance(&self, user_id: &UserId) -> tokenpay_store::Result<UserBalance> {
        self.inner.get_balance(user_id).await
    }
}

/// Payment provider double recording every request.
#[derive(Default)]
pub struct MockProvider {
    requests: Mutex<Vec<CheckoutRequest>>,
    failure: Mutex<Option<String>>,
}

impl MockProvider {
    pub fn requests(&self) -> Vec<CheckoutRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Make every following call fail with a Stripe API error carrying `message`.
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }
}

#[async_trait]
impl PaymentProvider for MockProvider {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, StripeError> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(StripeError::Api {
                error_type: "api_error".into(),
                message,
                code: None,
            });
        }

        Ok(CheckoutSession {
            id: "cs_test_mock".into(),
            url: Some(CHECKOUT_URL.into()),
            ..CheckoutSession::default()
        })
    }
}

/// Configuration for tests; the store itself is injected.
pub fn test_config() -> ServiceConfig {
    ServiceConfig::from_lookup(|key| {
        let value = match key {
            "BASE_URL" => "https://shop.example",
            "STRIPE_API_KEY" => "sk_test_123",
            "STRIPE_WEBHOOK_SECRET" => WEBHOOK_SECRET,
            "STORE_BACKEND" => "memory",
            "LISTEN_ADDR" => "127.0.0.1:0",
            _ => return None,
        };
        Some(value.to_string())
    })
    .expect("test configuration is complete")
}

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Counting view of the store the service writes to.
    pub store: Arc<CountingStore>,
    /// Provider double behind the checkout endpoint.
    pub provider: Arc<MockProvider>,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: Option<TempDir>,
}

impl TestHarness {
    /// Create a new test harness over an in-memory store.
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), None)
    }

    /// Create a harness over a [`FlakyStore`] with a one second store timeout.
    pub fn with_flaky_store(mode: SettleMode) -> (Self, Arc<FlakyStore>) {
        let flaky = Arc::new(FlakyStore::new(mode));
        let mut config = test_config();
        config.store_timeout_seconds = 1;
        let harness = Self::with_config(config, flaky.clone(), None);
        (harness, flaky)
    }

    /// Create a new test harness over a fresh `RocksDB` database.
    #[cfg(feature = "rocksdb-backend")]
    pub fn with_rocks() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = tokenpay_store::RocksStore::open(temp_dir.path())
            .expect("Failed to open store")
            .with_max_retries(10);
        Self::with_store(Arc::new(store), Some(temp_dir))
    }

    fn with_store(inner: Arc<dyn Store>, temp_dir: Option<TempDir>) -> Self {
        Self::with_config(test_config(), inner, temp_dir)
    }

    fn with_config(config: ServiceConfig, inner: Arc<dyn Store>, temp_dir: Option<TempDir>) -> Self {
        let store = Arc::new(CountingStore::new(inner));
        let provider = Arc::new(MockProvider::default());

        let state = AppState::new(config, store.clone(), provider.clone());
        let server = TestServer::new(create_router(state)).expect("Failed to create test server");

        Self {
            server,
            store,
            provider,
            _temp_dir: temp_dir,
        }
    }

    /// POST a webhook body with an optional signature header.
    pub async fn post_webhook(&self, payload: &[u8], signature: Option<&str>) -> TestResponse {
        let mut request = self
            .server
            .post("/api/webhooks/stripe")
            .add_header(
                HeaderName::from_static("content-type"),
                HeaderValue::from_static("application/json"),
            )
            .bytes(Bytes::copy_from_slice(payload));

        if let Some(signature) = signature {
            request = request.add_header(
                HeaderName::from_static("stripe-signature"),
                HeaderValue::from_str(signature).expect("signature is a valid header value"),
            );
        }

        request.await
    }

    /// POST a correctly signed webhook body.
    pub async fn post_signed_webhook(&self, payload: &[u8]) -> TestResponse {
        let signature = sign(payload);
        self.post_webhook(payload, Some(&signature)).await
    }

    /// Current balance of `uid`, read around the counter.
    pub async fn balance(&self, uid: &str) -> u64 {
        self.store
            .inner
            .get_balance(&UserId::new(uid).unwrap())
            .await
            .unwrap()
            .tokens
    }

    /// Whether a settlement record exists for `session`, read around the counter.
    pub async fn is_settled(&self, session: &str) -> bool {
        self.store
            .inner
            .get_settlement(&SessionId::new(session).unwrap())
            .await
            .unwrap()
            .is_some()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Signature header for `payload` signed now with the test secret.
pub fn sign(payload: &[u8]) -> String {
    sign_at(payload, chrono::Utc::now().timestamp())
}

/// Signature header for `payload` signed at `timestamp` with the test secret.
pub fn sign_at(payload: &[u8], timestamp: i64) -> String {
    WebhookVerifier::new(WEBHOOK_SECRET, 300).sign(payload, timestamp)
}

/// A `checkout.session.completed` event body.
pub fn completed_event(session: &str, amount_total: Option<i64>, uid: Option<&str>) -> Vec<u8> {
    let metadata = uid.map_or(json!({}), |uid| json!({ "uid": uid }));
    event_bytes(
        "checkout.session.completed",
        json!({
            "id": session,
            "object": "checkout.session",
            "amount_total": amount_total,
            "currency": "eur",
            "payment_status": "paid",
            "metadata": metadata
        }),
    )
}

/// A webhook event body of arbitrary type.
pub fn event_bytes(event_type: &str, object: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": format!("evt_{}", object["id"].as_str().unwrap_or("none")),
        "object": "event",
        "type": event_type,
        "created": chrono::Utc::now().timestamp(),
        "livemode": false,
        "data": { "object": object }
    }))
    .unwrap()
}
