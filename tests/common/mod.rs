#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use storefront_api::{
    build_router,
    config::AppConfig,
    db,
    entities::order::{Model as OrderModel, PaymentMethod, ShippingAddress},
    handlers::AppServices,
    notifications::{Mailer, NotificationError, OrderEmail},
    services::{
        carrier::DelhiveryClient,
        orders::{CreateOrderLine, CreateOrderRequest},
        signature::sign,
    },
    AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

pub const KEY_SECRET: &str = "test_key_secret";
pub const WEBHOOK_SECRET: &str = "test_webhook_secret";
pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";
pub const USER_ID: &str = "user-1";

/// Mailer that keeps every message it is handed
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OrderEmail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OrderEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OrderEmail) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

/// Application over an in-memory SQLite database
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub mailer: Arc<RecordingMailer>,
}

impl TestApp {
    /// No pickup location configured, so shipments fall back to demo waybills
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Carrier pointed at `base_url` with a registered pickup location
    pub async fn with_carrier(base_url: &str, timeout: Duration) -> Self {
        let base_url = base_url.to_string();
        Self::with_config(move |cfg| {
            cfg.carrier.base_url = base_url;
            cfg.carrier.api_token = Some("carrier-token".into());
            cfg.carrier.pickup_location = Some("Main Warehouse".into());
            cfg.carrier.timeout_secs = timeout.as_secs().max(1);
        })
        .await
    }

    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.cors_allow_any_origin = true;
        cfg.payment.key_secret = Some(KEY_SECRET.into());
        cfg.payment.webhook_secret = Some(WEBHOOK_SECRET.into());
        adjust(&mut cfg);

        let pool = db::in_memory().await.expect("in-memory database");
        let db_arc = Arc::new(pool);

        let mailer = Arc::new(RecordingMailer::default());
        let carrier = Arc::new(
            DelhiveryClient::new(
                cfg.carrier.base_url.clone(),
                cfg.carrier.api_token.clone(),
                cfg.carrier.timeout(),
            )
            .expect("carrier client"),
        );
        let services = AppServices::new(db_arc.clone(), &cfg, mailer.clone(), carrier);

        let state = AppState {
            db: db_arc,
            config: cfg,
            services,
        };

        Self {
            router: build_router(state.clone()),
            state,
            mailer,
        }
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).unwrap())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).unwrap()).await
    }

    /// Posts `body` to the webhook route, signed with the webhook secret
    pub async fn post_webhook(&self, body: &Value) -> (StatusCode, Value) {
        let raw = serde_json::to_vec(body).unwrap();
        let signature = sign(WEBHOOK_SECRET, &raw);
        self.post_webhook_raw(raw, Some(&signature)).await
    }

    pub async fn post_webhook_raw(&self, raw: Vec<u8>, signature: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header("content-type", "application/json");
        if let Some(sig) = signature {
            builder = builder.header(SIGNATURE_HEADER, sig);
        }
        self.send(builder.body(Body::from(raw)).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request");
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| json!(String::from_utf8_lossy(&bytes)))
        };
        (status, body)
    }

    pub async fn create_order(&self, method: PaymentMethod) -> OrderModel {
        let gateway_order_id = match method {
            PaymentMethod::Gateway => Some(format!("order_{}", Uuid::new_v4().simple())),
            PaymentMethod::Cod => None,
        };
        self.state
            .services
            .orders
            .create_order(CreateOrderRequest {
                user_id: USER_ID.into(),
                email: "buyer@example.com".into(),
                items: vec![
                    CreateOrderLine {
                        product_id: "kurta-1".into(),
                        name: "Cotton Kurta".into(),
                        quantity: 2,
                        unit_price: dec!(799),
                        size: Some("M".into()),
                    },
                    CreateOrderLine {
                        product_id: "dupatta-1".into(),
                        name: "Silk Dupatta".into(),
                        quantity: 1,
                        unit_price: dec!(1200),
                        size: None,
                    },
                ],
                shipping_address: ShippingAddress {
                    full_name: "Asha Rao".into(),
                    address: "12 MG Road".into(),
                    city: "Bengaluru".into(),
                    state: "Karnataka".into(),
                    postal_code: "560001".into(),
                    country: "India".into(),
                    phone: "9876543210".into(),
                },
                payment_method: method,
                gateway_order_id,
            })
            .await
            .expect("create order")
    }

    /// Walks a fresh order to `Confirmed`
    pub async fn confirmed_order(&self) -> OrderModel {
        let order = self.create_order(PaymentMethod::Cod).await;
        let statuses = &self.state.services.order_status;
        statuses
            .update_status(order.id, "Processing", None)
            .await
            .expect("processing");
        statuses
            .update_status(order.id, "Confirmed", None)
            .await
            .expect("confirmed")
            .order
    }

    pub async fn order(&self, id: Uuid) -> OrderModel {
        self.state.services.orders.get_order(id).await.expect("order exists")
    }

    pub async fn seed_cart(&self, user_id: &str) {
        self.state
            .services
            .carts
            .save_cart(
                user_id,
                vec![storefront_api::entities::cart::CartLine {
                    product_id: "kurta-1".into(),
                    quantity: 2,
                    size: Some("M".into()),
                    price: dec!(799),
                }],
            )
            .await
            .expect("seed cart");
    }
}

/// Signature the client would send for a gateway confirmation
pub fn payment_signature(gateway_order_id: &str, gateway_payment_id: &str) -> String {
    sign(KEY_SECRET, format!("{}|{}", gateway_order_id, gateway_payment_id).as_bytes())
}

pub fn webhook_event(event: &str, internal_order_id: Option<Uuid>, gateway_order_id: &str) -> Value {
    let notes = match internal_order_id {
        Some(id) => json!({ "internal_order_id": id.to_string() }),
        None => json!([]),
    };
    json!({
        "event": event,
        "payload": {
            "payment": {
                "entity": {
                    "id": format!("pay_{}", Uuid::new_v4().simple()),
                    "order_id": gateway_order_id,
                    "amount": 279800,
                    "currency": "INR",
                    "status": if event == "payment.failed" { "failed" } else { "captured" },
                    "email": "buyer@example.com",
                    "notes": notes
                }
            }
        }
    })
}
