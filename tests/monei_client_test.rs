//! `MoneiClient` against a local stand-in for the provider API.

use axum::{
    Json, Router,
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use monei_sync::adapters::monei_client::MoneiClient;
use monei_sync::domain::error::PipelineError;
use monei_sync::domain::id::PaymentId;
use monei_sync::domain::provider::MoneiApi;
use serde_json::{Value, json};
use std::time::Duration;

const API_KEY: &str = "pk_test_key";

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("Authorization").and_then(|v| v.to_str().ok()) == Some(API_KEY)
}

async fn get_payment(Path(id): Path<String>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Unauthorized"}))).into_response();
    }
    match id.as_str() {
        "missing" => (
            StatusCode::NOT_FOUND,
            Json(json!({"status": 404, "message": "Payment not found"})),
        )
            .into_response(),
        "down" => (StatusCode::SERVICE_UNAVAILABLE, "<html>upstream</html>").into_response(),
        _ => Json(json!({
            "id": id,
            "orderId": "100",
            "status": "AUTHORIZED",
            "amount": 1000,
            "currency": "EUR",
        }))
        .into_response(),
    }
}

async fn action(
    Path((id, action)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Unauthorized"}))).into_response();
    }
    let status = match action.as_str() {
        "cancel" => "CANCELED",
        "capture" => "SUCCEEDED",
        "refund" => "REFUNDED",
        _ => return StatusCode::NOT_FOUND.into_response(),
    };
    Json(json!({ "id": id, "status": status, "received": body })).into_response()
}

async fn spawn_provider() -> String {
    let app = Router::new()
        .route("/v1/payments/{id}", get(get_payment))
        .route("/v1/payments/{id}/{action}", post(action));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/v1/")
}

async fn client() -> MoneiClient {
    MoneiClient::new(spawn_provider().await, API_KEY, Duration::from_secs(5)).unwrap()
}

fn id(raw: &str) -> PaymentId {
    PaymentId::new(raw).unwrap()
}

#[tokio::test]
async fn get_payment_returns_raw_json() {
    let payment = client().await.get_payment(&id("pay_1")).await.unwrap();
    assert_eq!(payment["id"], "pay_1");
    assert_eq!(payment["status"], "AUTHORIZED");
}

#[tokio::test]
async fn provider_message_is_passed_through() {
    match client().await.get_payment(&id("missing")).await {
        Err(PipelineError::Provider(msg)) => assert_eq!(msg, "Payment not found"),
        other => panic!("expected provider error, got {other:?}"),
    }
}

#[tokio::test]
async fn non_json_error_falls_back_to_status_text() {
    let err = client().await.get_payment(&id("down")).await.unwrap_err();
    assert_eq!(err.to_string(), "Service Unavailable");
}

#[tokio::test]
async fn wrong_key_is_rejected_upstream() {
    let client = MoneiClient::new(spawn_provider().await, "bad", Duration::from_secs(5)).unwrap();
    let err = client.get_payment(&id("pay_1")).await.unwrap_err();
    assert_eq!(err.to_string(), "Unauthorized");
}

#[tokio::test]
async fn cancel_sends_reason() {
    let res = client()
        .await
        .cancel_payment(&id("pay_1"), "abandoned")
        .await
        .unwrap();
    assert_eq!(res["status"], "CANCELED");
    assert_eq!(res["received"], json!({"cancellationReason": "abandoned"}));
}

#[tokio::test]
async fn capture_and_refund_send_optional_amounts() {
    let client = client().await;

    let full = client.capture_payment(&id("pay_1"), None).await.unwrap();
    assert_eq!(full["status"], "SUCCEEDED");
    assert_eq!(full["received"], json!({}));

    let partial = client
        .refund_payment(&id("pay_1"), Some(250), "requested_by_customer")
        .await
        .unwrap();
    assert_eq!(partial["status"], "REFUNDED");
    assert_eq!(
        partial["received"],
        json!({"refundReason": "requested_by_customer", "amount": 250})
    );
}

#[tokio::test]
async fn unreachable_provider_is_a_provider_error() {
    let client = MoneiClient::new("http://127.0.0.1:9", API_KEY, Duration::from_millis(500)).unwrap();
    assert!(matches!(
        client.get_payment(&id("pay_1")).await,
        Err(PipelineError::Provider(_))
    ));
}

#[tokio::test]
async fn base_url_without_trailing_slash_keeps_its_path() {
    let base = spawn_provider().await;
    let client = MoneiClient::new(base.trim_end_matches('/'), API_KEY, Duration::from_secs(5)).unwrap();
    let payment = client.get_payment(&id("pay_1")).await.unwrap();
    assert_eq!(payment["id"], "pay_1");
}

#[test]
fn unusable_base_url_is_a_config_error() {
    for base in ["not a url", "mailto:api@monei.com"] {
        assert!(
            matches!(
                MoneiClient::new(base, API_KEY, Duration::from_secs(5)),
                Err(PipelineError::Config(_))
            ),
            "base {base:?}"
        );
    }
}

#[test]
fn ids_that_could_reshape_the_request_path_are_refused() {
    for raw in ["../x", "pay_1/refund", "a?b=c", "pay%2F1", "pay 1", "pay_1#frag"] {
        assert!(
            matches!(PaymentId::new(raw), Err(PipelineError::Validation(_))),
            "id {raw:?}"
        );
    }
    assert!(PaymentId::new("a".repeat(65)).is_err());
    assert!(PaymentId::new("a".repeat(64)).is_ok());
}
