use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::common::{parse_uuid, OrderEnvelope};
use crate::{
    entities::order::{Dimensions, Model as OrderModel, OrderStatus},
    errors::ServiceError,
    services::{
        order_status::{next_statuses, parse_status},
        shipments::ShipmentOptions,
    },
    AppState,
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateShipmentRequest {
    pub order_id: String,
    #[serde(default)]
    pub shipping_mode: Option<String>,
    /// Grams
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub dimensions: Option<Dimensions>,
    #[serde(default)]
    pub pickup_location: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentCreatedResponse {
    pub success: bool,
    pub message: String,
    pub waybills: Vec<String>,
    /// True when the waybill was generated locally
    pub demo_mode: bool,
    #[schema(value_type = Object)]
    pub order: OrderModel,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateShipmentStatusRequest {
    pub order_id: String,
    pub new_status: String,
    #[serde(default)]
    pub waybill_number: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct NextStatusQuery {
    /// Current status in any capitalization
    pub current: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NextStatusResponse {
    pub success: bool,
    pub current: OrderStatus,
    pub next: Vec<OrderStatus>,
}

#[utoipa::path(
    post,
    path = "/api/v1/shipments",
    request_body = CreateShipmentRequest,
    responses(
        (status = 201, description = "Shipment booked", body = ShipmentCreatedResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Shipment exists or order not Confirmed", body = crate::errors::ErrorResponse),
        (status = 502, description = "Carrier rejected the shipment", body = crate::errors::ErrorResponse),
        (status = 504, description = "Carrier timed out; outcome unknown", body = crate::errors::ErrorResponse)
    ),
    tag = "shipments"
)]
pub async fn create_shipment(
    State(state): State<AppState>,
    Json(request): Json<CreateShipmentRequest>,
) -> Result<(StatusCode, Json<ShipmentCreatedResponse>), ServiceError> {
    let order_id = parse_uuid(&request.order_id, "order id")?;
    let options = ShipmentOptions {
        shipping_mode: request.shipping_mode,
        weight: request.weight,
        dimensions: request.dimensions,
        pickup_location: request.pickup_location,
    };

    let booking = state
        .services
        .shipments
        .create_shipment(order_id, options)
        .await?;

    let message = if booking.demo_mode {
        "Shipment created in demo mode"
    } else {
        "Shipment created"
    };
    Ok((
        StatusCode::CREATED,
        Json(ShipmentCreatedResponse {
            success: true,
            message: message.to_string(),
            waybills: booking.waybills,
            demo_mode: booking.demo_mode,
            order: booking.order,
        }),
    ))
}

#[utoipa::path(
    put,
    path = "/api/v1/shipments/status",
    request_body = UpdateShipmentStatusRequest,
    responses(
        (status = 200, description = "Status applied or already set", body = OrderEnvelope),
        (status = 400, description = "Unknown status", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Move not allowed from the current status", body = crate::errors::ErrorResponse)
    ),
    tag = "shipments"
)]
pub async fn update_shipment_status(
    State(state): State<AppState>,
    Json(request): Json<UpdateShipmentStatusRequest>,
) -> Result<Json<OrderEnvelope>, ServiceError> {
    let order_id = parse_uuid(&request.order_id, "order id")?;
    let change = state
        .services
        .order_status
        .update_shipment_status(
            order_id,
            &request.new_status,
            request.waybill_number,
            request.reason,
        )
        .await?;

    let message = if change.changed {
        format!("Shipment status updated to {}", change.order.status)
    } else {
        format!("Order is already {}", change.order.status)
    };
    Ok(Json(OrderEnvelope::with_message(change.order, message)))
}

#[utoipa::path(
    get,
    path = "/api/v1/shipments/status",
    params(NextStatusQuery),
    responses(
        (status = 200, description = "Legal next statuses", body = NextStatusResponse),
        (status = 400, description = "Unknown status", body = crate::errors::ErrorResponse)
    ),
    tag = "shipments"
)]
pub async fn next_shipment_statuses(
    Query(query): Query<NextStatusQuery>,
) -> Result<Json<NextStatusResponse>, ServiceError> {
    let current = parse_status(&query.current)?;
    Ok(Json(NextStatusResponse {
        success: true,
        current,
        next: next_statuses(current).to_vec(),
    }))
}
