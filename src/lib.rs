//! Storefront API Library
//!
//! Payment confirmation, order status transitions, carrier shipments, server
//! carts and reviews behind an axum router, plus the client-side cart
//! reconciliation engine.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod cache;
pub mod cart;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod migrator;
pub mod notifications;
pub mod openapi;
pub mod services;

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::{config::AppConfig, db::DbPool, handlers::AppServices};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: AppConfig,
    pub services: AppServices,
}

/// Routes mounted under `/api/v1`
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/payments/verify", post(handlers::payments::verify_payment))
        .route(
            "/payments/webhook",
            post(handlers::payment_webhooks::payment_webhook),
        )
        .route("/orders", post(handlers::orders::create_order))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route(
            "/orders/:id/status",
            put(handlers::orders::update_order_status),
        )
        .route("/shipments", post(handlers::shipments::create_shipment))
        .route(
            "/shipments/status",
            get(handlers::shipments::next_shipment_statuses)
                .put(handlers::shipments::update_shipment_status),
        )
        .route(
            "/carts/:user_id",
            get(handlers::carts::get_cart).put(handlers::carts::save_cart),
        )
        .route(
            "/products/:product_id/reviews",
            get(handlers::reviews::list_reviews).post(handlers::reviews::submit_review),
        )
}

fn cors_layer(cfg: &AppConfig) -> CorsLayer {
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .filter_map(|origin| HeaderValue::from_str(origin).ok())
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    if let Some(origins) = configured_origins {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.should_allow_permissive_cors() {
        info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        CorsLayer::permissive()
    } else {
        warn!("No CORS origins configured; cross-origin requests will be refused");
        CorsLayer::new()
    }
}

/// Full application router: health, OpenAPI document and the v1 API
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let timeout = state.config.request_timeout();

    Router::<AppState>::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .nest("/api/v1", api_v1_routes())
        .layer(TimeoutLayer::new(timeout))
        .layer(cors)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
