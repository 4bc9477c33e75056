use axum::{extract::State, Json};

use super::common::MessageResponse;
use crate::{errors::ServiceError, services::payments::VerifyPaymentRequest, AppState};

/// Client confirmation after checkout; COD orders skip the signature check
#[utoipa::path(
    post,
    path = "/api/v1/payments/verify",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Payment applied or already applied", body = MessageResponse),
        (status = 400, description = "Missing fields or wrong payment method", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "payments"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    let ack = state.services.payments.confirm(request).await?;
    Ok(Json(MessageResponse::ok(ack.message).with_order(ack.order_id)))
}
