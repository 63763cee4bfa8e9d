//! Stripe client tests against a local mock of the Stripe API.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tokenpay_core::UserId;
use tokenpay_service::{create_router, AppState, CheckoutRequest, StripeClient, StripeError};
use tokenpay_store::MemoryStore;

const API_KEY: &str = "sk_test_123";
/// Base64 of `sk_test_123:`.
const BASIC_AUTH: &str = "Basic c2tfdGVzdF8xMjM6";

fn client(server: &MockServer) -> StripeClient {
    StripeClient::new(API_KEY, format!("{}/v1", server.uri())).unwrap()
}

fn request(amount_minor: i64) -> CheckoutRequest {
    CheckoutRequest {
        amount_minor,
        currency: "eur".into(),
        product_name: "Credits".into(),
        success_url: "https://shop.example".into(),
        cancel_url: "https://shop.example/upgrade".into(),
        user_id: UserId::new("user-42").unwrap(),
    }
}

#[tokio::test]
async fn checkout_session_is_form_encoded() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .and(header("authorization", BASIC_AUTH))
        .and(body_string_contains("mode=payment"))
        .and(body_string_contains("payment_method_types%5B0%5D=card"))
        .and(body_string_contains(
            "line_items%5B0%5D%5Bprice_data%5D%5Bcurrency%5D=eur",
        ))
        .and(body_string_contains(
            "line_items%5B0%5D%5Bprice_data%5D%5Bunit_amount%5D=3900",
        ))
        .and(body_string_contains(
            "line_items%5B0%5D%5Bprice_data%5D%5Bproduct_data%5D%5Bname%5D=Credits",
        ))
        .and(body_string_contains("line_items%5B0%5D%5Bquantity%5D=1"))
        .and(body_string_contains("metadata%5Buid%5D=user-42"))
        .and(body_string_contains("client_reference_id=user-42"))
        .and(body_string_contains(
            "success_url=https%3A%2F%2Fshop.example&",
        ))
        .and(body_string_contains(
            "cancel_url=https%3A%2F%2Fshop.example%2Fupgrade",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_test_wire",
            "object": "checkout.session",
            "url": "https://checkout.stripe.com/c/pay/cs_test_wire",
            "amount_total": 3900,
            "currency": "eur",
            "payment_status": "unpaid",
            "metadata": { "uid": "user-42" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = client(&server)
        .create_checkout_session(&request(3900))
        .await
        .unwrap();

    assert_eq!(session.id, "cs_test_wire");
    assert_eq!(
        session.url.as_deref(),
        Some("https://checkout.stripe.com/c/pay/cs_test_wire")
    );
    assert_eq!(session.uid(), Some("user-42"));
}

#[tokio::test]
async fn api_error_envelope_is_decoded() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {
                "type": "invalid_request_error",
                "message": "Invalid API Key provided: sk_test_***123",
                "code": "api_key_invalid"
            }
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .create_checkout_session(&request(9500))
        .await
        .unwrap_err();

    match err {
        StripeError::Api {
            error_type,
            message,
            code,
        } => {
            assert_eq!(error_type, "invalid_request_error");
            assert!(message.starts_with("Invalid API Key provided"));
            assert_eq!(code.as_deref(), Some("api_key_invalid"));
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn non_json_error_reports_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let err = client(&server)
        .create_checkout_session(&request(29000))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StripeError::Api { ref message, .. } if message.contains("503")
    ));
}

#[tokio::test]
async fn checkout_endpoint_through_stripe_client() {
    let stripe = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .and(body_string_contains(
            "line_items%5B0%5D%5Bprice_data%5D%5Bunit_amount%5D=29000",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_test_e2e",
            "url": "https://checkout.stripe.com/c/pay/cs_test_e2e"
        })))
        .expect(1)
        .mount(&stripe)
        .await;

    let state = AppState::new(
        common::test_config(),
        Arc::new(MemoryStore::new()),
        Arc::new(client(&stripe)),
    );
    let server = TestServer::new(create_router(state)).unwrap();

    let response = server
        .post("/api/checkout")
        .json(&json!({ "amount": 29000, "uid": "user-42" }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["url"], "https://checkout.stripe.com/c/pay/cs_test_e2e");
}

#[tokio::test]
async fn rejected_amount_never_calls_stripe() {
    let stripe = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&stripe)
        .await;

    let state = AppState::new(
        common::test_config(),
        Arc::new(MemoryStore::new()),
        Arc::new(client(&stripe)),
    );
    let server = TestServer::new(create_router(state)).unwrap();

    server
        .post("/api/checkout")
        .json(&json!({ "amount": 1000, "uid": "user-42" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}
