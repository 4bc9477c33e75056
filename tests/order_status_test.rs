//! Order intake and operator status updates.

mod common;

use axum::http::{Method, StatusCode};
use common::{TestApp, USER_ID};
use rstest::rstest;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use storefront_api::{entities::order::PaymentMethod, notifications::OrderEmail};
use uuid::Uuid;

fn checkout_body() -> serde_json::Value {
    json!({
        "userId": USER_ID,
        "email": "buyer@example.com",
        "items": [
            { "productId": "kurta-1", "name": "Cotton Kurta", "quantity": 2, "unitPrice": "799.00", "size": "M" },
            { "productId": "dupatta-1", "name": "Silk Dupatta", "quantity": 1, "unitPrice": "1200.00" }
        ],
        "shippingAddress": {
            "fullName": "Asha Rao",
            "address": "12 MG Road",
            "city": "Bengaluru",
            "state": "Karnataka",
            "postalCode": "560001",
            "country": "India",
            "phone": "9876543210"
        },
        "paymentMethod": "gateway",
        "gatewayOrderId": "order_checkout_1"
    })
}

// ==================== Order Intake ====================

#[tokio::test]
async fn checkout_creates_pending_order() {
    let app = TestApp::new().await;

    let (status, body) = app
        .request(Method::POST, "/api/v1/orders", Some(checkout_body()))
        .await;

    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["message"], "Order created");
    assert_eq!(body["order"]["status"], "pending");
    assert_eq!(body["order"]["isPaid"], false);
    let total: Decimal = body["order"]["totalPrice"].as_str().unwrap().parse().unwrap();
    assert_eq!(total, dec!(2798));
    assert_eq!(body["order"]["items"][0]["itemStatus"], "Ordered");
}

#[tokio::test]
async fn checkout_without_items_is_rejected() {
    let app = TestApp::new().await;
    let mut body = checkout_body();
    body["items"] = json!([]);

    let (status, _) = app.request(Method::POST, "/api/v1/orders", Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_order_validates_id() {
    let app = TestApp::new().await;

    let (bad, _) = app.request(Method::GET, "/api/v1/orders/nope", None).await;
    let (missing, _) = app
        .request(Method::GET, &format!("/api/v1/orders/{}", Uuid::new_v4()), None)
        .await;

    assert_eq!(bad, StatusCode::BAD_REQUEST);
    assert_eq!(missing, StatusCode::NOT_FOUND);
}

// ==================== Status Updates ====================

#[rstest]
#[case("confirmed", "Confirmed")]
#[case("CONFIRMED", "Confirmed")]
#[case("shipped", "Dispatched")]
#[case("delivered", "Completed")]
#[case("canceled", "Cancelled")]
#[tokio::test]
async fn status_names_are_normalized(#[case] requested: &str, #[case] stored: &str) {
    let app = TestApp::new().await;
    let order = app.create_order(PaymentMethod::Cod).await;

    let (status, body) = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{}/status", order.id),
            Some(json!({ "status": requested })),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["order"]["status"], stored);
    assert_eq!(body["message"], format!("Order status updated to {}", stored));
    assert_eq!(app.order(order.id).await.status.as_str(), stored);
}

#[tokio::test]
async fn repeating_current_status_is_a_no_op() {
    let app = TestApp::new().await;
    let order = app.confirmed_order().await;
    let emails_before = app.mailer.sent().len();

    let (status, body) = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{}/status", order.id),
            Some(json!({ "status": "confirmed" })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Order is already Confirmed");
    assert_eq!(app.mailer.sent().len(), emails_before);
}

#[tokio::test]
async fn terminal_orders_reject_changes() {
    let app = TestApp::new().await;
    let order = app.create_order(PaymentMethod::Cod).await;
    let uri = format!("/api/v1/orders/{}/status", order.id);

    let (status, _) = app
        .request(Method::PUT, &uri, Some(json!({ "status": "Completed" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .request(Method::PUT, &uri, Some(json!({ "status": "Processing" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(app.order(order.id).await.status.as_str(), "Completed");
}

#[tokio::test]
async fn unknown_status_is_bad_request() {
    let app = TestApp::new().await;
    let order = app.create_order(PaymentMethod::Cod).await;

    let (status, _) = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{}/status", order.id),
            Some(json!({ "status": "teleported" })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn pending_cannot_be_set_by_operator() {
    let app = TestApp::new().await;
    let order = app.confirmed_order().await;

    let (status, _) = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{}/status", order.id),
            Some(json!({ "status": "pending" })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cancellation_records_reason_and_notifies() {
    let app = TestApp::new().await;
    let order = app.create_order(PaymentMethod::Cod).await;

    let (status, body) = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{}/status", order.id),
            Some(json!({ "status": "Cancelled", "reason": "customer request" })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order"]["cancelReason"], "customer request");
    assert!(body["order"]["cancelRequestedAt"].is_string());
    assert!(body["order"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .all(|line| line["itemStatus"] == "Cancelled"));

    let sent = app.mailer.sent();
    assert!(matches!(
        sent.last(),
        Some(OrderEmail::StatusUpdate { reason: Some(r), .. }) if r == "customer request"
    ));
}
