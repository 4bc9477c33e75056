mod common;

use axum::http::{Method, StatusCode};
use common::{TestApp, USER_ID};
use serde_json::json;
use storefront_api::entities::order::PaymentMethod;

#[tokio::test]
async fn purchaser_review_is_verified() {
    let app = TestApp::new().await;
    let order = app.create_order(PaymentMethod::Cod).await;
    app.state
        .services
        .order_status
        .update_status(order.id, "delivered", None)
        .await
        .unwrap();

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/products/kurta-1/reviews",
            Some(json!({ "userId": USER_ID, "rating": 5, "comment": "Lovely fabric" })),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["review"]["verified"], true);
    assert_eq!(body["review"]["rating"], 5);
}

#[tokio::test]
async fn review_resubmission_replaces_previous() {
    let app = TestApp::new().await;
    let uri = "/api/v1/products/kurta-1/reviews";

    app.request(
        Method::POST,
        uri,
        Some(json!({ "userId": "shopper", "rating": 2, "comment": "Runs small" })),
    )
    .await;
    let (_, second) = app
        .request(
            Method::POST,
            uri,
            Some(json!({ "userId": "shopper", "rating": 4, "comment": "Exchanged, fits now" })),
        )
        .await;
    assert_eq!(second["review"]["verified"], false);

    let (status, body) = app.request(Method::GET, uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let reviews = body["reviews"].as_array().unwrap();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0]["rating"], 4);
    assert_eq!(reviews[0]["comment"], "Exchanged, fits now");
}

#[tokio::test]
async fn out_of_range_rating_is_rejected() {
    let app = TestApp::new().await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/products/kurta-1/reviews",
            Some(json!({ "userId": USER_ID, "rating": 0 })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}
