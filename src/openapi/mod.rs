use axum::Json;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.1.0",
        description = r#"
# Storefront API

Payment confirmation, order status transitions, carrier shipments, carts and
product reviews for the storefront.

## Error Handling

Failures share one envelope:

```json
{
  "success": false,
  "error": "Conflict",
  "message": "Conflict: shipment already created for this order",
  "timestamp": "2024-01-01T00:00:00Z"
}
```

Payment webhooks answer 200 for events that cannot be applied but would not
succeed on retry (missing order linkage, unknown orders).
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "payments", description = "Payment confirmation and gateway webhooks"),
        (name = "orders", description = "Order creation and status"),
        (name = "shipments", description = "Carrier shipment booking and status flow"),
        (name = "carts", description = "Server-side cart persistence"),
        (name = "reviews", description = "Product reviews"),
        (name = "health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::payments::verify_payment,
        crate::handlers::payment_webhooks::payment_webhook,
        crate::handlers::orders::create_order,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::shipments::create_shipment,
        crate::handlers::shipments::update_shipment_status,
        crate::handlers::shipments::next_shipment_statuses,
        crate::handlers::carts::get_cart,
        crate::handlers::carts::save_cart,
        crate::handlers::reviews::submit_review,
        crate::handlers::reviews::list_reviews,
        crate::handlers::health::health_check,
    ),
    components(
        schemas(
            crate::handlers::common::MessageResponse,
            crate::handlers::common::OrderEnvelope,
            crate::handlers::orders::UpdateOrderStatusRequest,
            crate::handlers::shipments::CreateShipmentRequest,
            crate::handlers::shipments::ShipmentCreatedResponse,
            crate::handlers::shipments::UpdateShipmentStatusRequest,
            crate::handlers::shipments::NextStatusResponse,
            crate::handlers::carts::CartResponse,
            crate::handlers::carts::SaveCartRequest,
            crate::handlers::reviews::ReviewResponse,
            crate::handlers::reviews::ReviewListResponse,
            crate::handlers::health::HealthResponse,
            crate::services::payments::VerifyPaymentRequest,
            crate::services::orders::CreateOrderRequest,
            crate::services::orders::CreateOrderLine,
            crate::services::reviews::SubmitReviewRequest,
            crate::entities::order::OrderStatus,
            crate::entities::order::PaymentMethod,
            crate::entities::order::ShippingAddress,
            crate::entities::order::Dimensions,
            crate::entities::cart::CartLine,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

/// `GET /api-docs/openapi.json`
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDocV1::openapi())
}
