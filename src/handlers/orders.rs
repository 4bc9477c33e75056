use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::common::{parse_uuid, OrderEnvelope};
use crate::{errors::ServiceError, services::orders::CreateOrderRequest, AppState};

/// Operator status change
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderStatusRequest {
    /// Any capitalization; `shipped`, `delivered` and `canceled` are accepted aliases
    #[schema(example = "Confirmed")]
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = OrderEnvelope),
        (status = 400, description = "Invalid order", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderEnvelope>), ServiceError> {
    let order = state.services.orders.create_order(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(OrderEnvelope::with_message(order, "Order created")),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = String, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order", body = OrderEnvelope),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OrderEnvelope>, ServiceError> {
    let order_id = parse_uuid(&id, "order id")?;
    let order = state.services.orders.get_order(order_id).await?;
    Ok(Json(OrderEnvelope::new(order)))
}

#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/status",
    params(("id" = String, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status applied or already set", body = OrderEnvelope),
        (status = 400, description = "Unknown or disallowed status", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is in a terminal status", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Json<OrderEnvelope>, ServiceError> {
    let order_id = parse_uuid(&id, "order id")?;
    let change = state
        .services
        .order_status
        .update_status(order_id, &request.status, request.reason)
        .await?;

    let message = if change.changed {
        format!("Order status updated to {}", change.order.status)
    } else {
        format!("Order is already {}", change.order.status)
    };
    Ok(Json(OrderEnvelope::with_message(change.order, message)))
}
