pub mod carts;
pub mod common;
pub mod health;
pub mod orders;
pub mod payment_webhooks;
pub mod payments;
pub mod reviews;
pub mod shipments;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::DbPool,
    notifications::Mailer,
    services::{
        carrier::CarrierClient, carts::CartService, order_status::OrderStatusService,
        orders::OrderService, payments::PaymentService, reviews::ReviewService,
        shipments::ShipmentService, signature::SignatureVerifier,
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub order_status: Arc<OrderStatusService>,
    pub payments: Arc<PaymentService>,
    pub shipments: Arc<ShipmentService>,
    pub carts: Arc<CartService>,
    pub reviews: Arc<ReviewService>,
}

impl AppServices {
    /// Wires every service over one pool, mailer and carrier client
    pub fn new(
        db_pool: Arc<DbPool>,
        config: &AppConfig,
        mailer: Arc<dyn Mailer>,
        carrier: Arc<dyn CarrierClient>,
    ) -> Self {
        let orders = OrderService::new(db_pool.clone(), mailer.clone());
        let verifier = SignatureVerifier::new(
            config.payment.key_secret.clone(),
            config.payment.webhook_secret.clone(),
        );
        let payments = PaymentService::new(orders.clone(), verifier);
        let order_status = OrderStatusService::new(db_pool.clone(), mailer.clone());
        let shipments =
            ShipmentService::new(db_pool.clone(), carrier, mailer, config.carrier.clone());

        Self {
            orders: Arc::new(orders),
            order_status: Arc::new(order_status),
            payments: Arc::new(payments),
            shipments: Arc::new(shipments),
            carts: Arc::new(CartService::new(db_pool.clone())),
            reviews: Arc::new(ReviewService::new(db_pool)),
        }
    }
}
