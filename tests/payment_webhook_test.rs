//! Gateway webhook deliveries: signature checks over the raw body and the
//! acknowledgement rules for events that cannot be applied.

mod common;

use axum::http::StatusCode;
use common::{webhook_event, TestApp, USER_ID, WEBHOOK_SECRET};
use serde_json::json;
use storefront_api::{entities::order::PaymentMethod, services::signature::sign};
use uuid::Uuid;

#[tokio::test]
async fn captured_payment_marks_order_paid() {
    let app = TestApp::new().await;
    let order = app.create_order(PaymentMethod::Gateway).await;
    let event = webhook_event(
        "payment.captured",
        Some(order.id),
        order.gateway_order_id.as_deref().unwrap(),
    );

    let (status, body) = app.post_webhook(&event).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Payment recorded");
    let stored = app.order(order.id).await;
    assert!(stored.is_paid);
    assert_eq!(stored.status.as_str(), "Processing");
    assert_eq!(stored.payment_result.unwrap().email_address.as_deref(), Some("buyer@example.com"));
}

#[tokio::test]
async fn redelivered_event_is_idempotent() {
    let app = TestApp::new().await;
    let order = app.create_order(PaymentMethod::Gateway).await;
    let event = webhook_event(
        "order.paid",
        Some(order.id),
        order.gateway_order_id.as_deref().unwrap(),
    );

    let (_, first) = app.post_webhook(&event).await;
    let (status, second) = app.post_webhook(&event).await;

    assert_eq!(first["message"], "Payment recorded");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["message"], "Order already paid");
    assert_eq!(app.mailer.sent().len(), 1);
}

#[tokio::test]
async fn empty_notes_array_is_acknowledged() {
    let app = TestApp::new().await;
    let event = webhook_event("payment.captured", None, "order_unlinked");
    assert_eq!(event["payload"]["payment"]["entity"]["notes"], json!([]));

    let (status, body) = app.post_webhook(&event).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Internal order id missing in notes");
}

#[tokio::test]
async fn unknown_order_is_acknowledged() {
    let app = TestApp::new().await;
    let event = webhook_event("payment.captured", Some(Uuid::new_v4()), "order_ghost");

    let (status, body) = app.post_webhook(&event).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Order not found; event acknowledged");
}

#[tokio::test]
async fn failed_payment_is_recorded_without_status_change() {
    let app = TestApp::new().await;
    let order = app.create_order(PaymentMethod::Gateway).await;
    let event = webhook_event(
        "payment.failed",
        Some(order.id),
        order.gateway_order_id.as_deref().unwrap(),
    );

    let (status, body) = app.post_webhook(&event).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Payment failure recorded");
    let stored = app.order(order.id).await;
    assert!(!stored.is_paid);
    assert_eq!(stored.status.as_str(), "pending");
    assert_eq!(stored.payment_result.unwrap().status, "failed");
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn unrelated_events_are_ignored() {
    let app = TestApp::new().await;
    let order = app.create_order(PaymentMethod::Gateway).await;
    let event = webhook_event(
        "refund.created",
        Some(order.id),
        order.gateway_order_id.as_deref().unwrap(),
    );

    let (status, body) = app.post_webhook(&event).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Event ignored");
    assert!(!app.order(order.id).await.is_paid);
}

#[tokio::test]
async fn bad_signature_is_unauthorized() {
    let app = TestApp::new().await;
    app.seed_cart(USER_ID).await;
    let order = app.create_order(PaymentMethod::Gateway).await;
    let event = webhook_event(
        "payment.captured",
        Some(order.id),
        order.gateway_order_id.as_deref().unwrap(),
    );
    let raw = serde_json::to_vec(&event).unwrap();
    let forged = sign("not_the_secret", &raw);

    let (status, body) = app.post_webhook_raw(raw, Some(&forged)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert!(!app.order(order.id).await.is_paid);
    let cart = app.state.services.carts.get_cart(USER_ID).await.unwrap();
    assert_eq!(cart.len(), 1);
}

#[tokio::test]
async fn missing_signature_is_unauthorized() {
    let app = TestApp::new().await;
    let raw = serde_json::to_vec(&webhook_event("payment.captured", None, "order_x")).unwrap();

    let (status, _) = app.post_webhook_raw(raw, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn signature_covers_exact_bytes() {
    let app = TestApp::new().await;
    let order = app.create_order(PaymentMethod::Gateway).await;
    let event = webhook_event(
        "payment.captured",
        Some(order.id),
        order.gateway_order_id.as_deref().unwrap(),
    );
    let compact = serde_json::to_vec(&event).unwrap();
    let signature = sign(WEBHOOK_SECRET, &compact);
    // Same JSON value, different bytes
    let pretty = serde_json::to_vec_pretty(&event).unwrap();

    let (status, _) = app.post_webhook_raw(pretty, Some(&signature)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_payload_with_valid_signature_is_bad_request() {
    let app = TestApp::new().await;
    let raw = b"not json".to_vec();
    let signature = sign(WEBHOOK_SECRET, &raw);

    let (status, _) = app.post_webhook_raw(raw, Some(&signature)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}
