//! Router-level behaviour shared by every endpoint.

mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use common::TestApp;
use storefront_api::build_router;
use tower::ServiceExt;

#[tokio::test]
async fn health_reports_database_up() {
    let app = TestApp::new().await;

    let (status, body) = app.request(Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "up");
    assert_eq!(body["database"], "up");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::new().await;

    let (status, body) = app.request(Method::GET, "/api-docs/openapi.json", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["info"]["title"], "Storefront API");
    assert!(body["paths"]["/api/v1/payments/verify"].is_object());
}

#[tokio::test]
async fn responses_carry_request_id() {
    let app = TestApp::new().await;
    let router = build_router(app.state.clone());

    let response = router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.headers().contains_key("x-request-id"));

    let response = router
        .oneshot(
            Request::get("/health")
                .header("x-request-id", "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-123");
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let app = TestApp::new().await;

    let (status, _) = app.request(Method::GET, "/api/v1/nowhere", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
