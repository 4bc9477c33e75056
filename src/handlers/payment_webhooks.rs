use axum::{extract::State, http::HeaderMap, Json};
use bytes::Bytes;

use super::common::MessageResponse;
use crate::{errors::ServiceError, AppState};

// POST /api/v1/payments/webhook
//
// The signature covers the exact bytes sent, so the body is taken raw.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Webhook acknowledged", body = MessageResponse),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse)
    ),
    tag = "payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MessageResponse>, ServiceError> {
    let signature = headers
        .get(state.config.payment.signature_header.as_str())
        .and_then(|v| v.to_str().ok());

    let ack = state
        .services
        .payments
        .handle_webhook(&body, signature)
        .await?;
    Ok(Json(MessageResponse::ok(ack.message).with_order(ack.order_id)))
}
