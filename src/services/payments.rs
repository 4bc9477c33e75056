use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::order::{PaymentMethod, PaymentResult},
    errors::ServiceError,
    services::{
        orders::{OrderService, PaymentOutcome},
        parse_uuid,
        signature::SignatureVerifier,
    },
};

pub const MSG_PAYMENT_VERIFIED: &str = "Payment verified successfully";
pub const MSG_ALREADY_PAID: &str = "Order already paid";
pub const MSG_COD_PLACED: &str = "Order placed with cash on delivery";
pub const MSG_COD_ALREADY_PLACED: &str = "Order already placed";
pub const MSG_NOTES_MISSING: &str = "Internal order id missing in notes";
pub const MSG_ORDER_NOT_FOUND: &str = "Order not found; event acknowledged";
pub const MSG_PAYMENT_RECORDED: &str = "Payment recorded";
pub const MSG_FAILURE_RECORDED: &str = "Payment failure recorded";
pub const MSG_EVENT_IGNORED: &str = "Event ignored";

/// Client-side payment confirmation
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    pub order_id: String,
    #[serde(default)]
    pub gateway_payment_id: Option<String>,
    #[serde(default)]
    pub gateway_order_id: Option<String>,
    #[serde(default)]
    pub gateway_signature: Option<String>,
    pub payment_method: PaymentMethod,
}

/// Outcome reported back to the client or gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentAck {
    pub message: &'static str,
    pub order_id: Option<Uuid>,
    /// Whether this call changed the order
    pub applied: bool,
}

impl PaymentAck {
    fn ignored(message: &'static str) -> Self {
        Self {
            message,
            order_id: None,
            applied: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event: String,
    #[serde(default)]
    payload: WebhookPayload,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    payment: Option<PaymentWrapper>,
}

#[derive(Debug, Deserialize)]
struct PaymentWrapper {
    entity: PaymentEntity,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    id: String,
    #[serde(default)]
    order_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    email: Option<String>,
    /// Gateway sends `[]` when no notes were attached
    #[serde(default)]
    notes: Value,
}

impl PaymentEntity {
    fn internal_order_id(&self) -> Option<&str> {
        self.notes
            .get("internal_order_id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    fn result(&self, status: &str) -> PaymentResult {
        PaymentResult {
            id: self.id.clone(),
            status: self.status.clone().unwrap_or_else(|| status.to_string()),
            update_time: Utc::now().to_rfc3339(),
            email_address: self.email.clone(),
        }
    }
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, ServiceError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServiceError::ValidationError(format!("{} is required", field)))
}

/// Entry points for both payment confirmation paths
#[derive(Clone)]
pub struct PaymentService {
    orders: OrderService,
    verifier: SignatureVerifier,
}

impl PaymentService {
    pub fn new(orders: OrderService, verifier: SignatureVerifier) -> Self {
        Self { orders, verifier }
    }

    /// Synchronous confirmation from the client after checkout
    #[instrument(skip(self, request), fields(order_id = %request.order_id, method = ?request.payment_method))]
    pub async fn confirm(&self, request: VerifyPaymentRequest) -> Result<PaymentAck, ServiceError> {
        let order_id = parse_uuid(&request.order_id, "order id")?;

        if request.payment_method == PaymentMethod::Cod {
            let outcome = self.orders.place_cod_order(order_id).await?;
            return Ok(PaymentAck {
                message: if outcome.was_applied() {
                    MSG_COD_PLACED
                } else {
                    MSG_COD_ALREADY_PLACED
                },
                order_id: Some(order_id),
                applied: outcome.was_applied(),
            });
        }

        let gateway_order_id = required(&request.gateway_order_id, "gatewayOrderId")?;
        let gateway_payment_id = required(&request.gateway_payment_id, "gatewayPaymentId")?;
        let signature = required(&request.gateway_signature, "gatewaySignature")?;

        self.verifier
            .verify_payment(gateway_order_id, gateway_payment_id, signature)?;

        let order = self.orders.get_order(order_id).await?;
        if order.payment_method != PaymentMethod::Gateway {
            return Err(ServiceError::BadRequest(
                "order was not placed for gateway payment".to_string(),
            ));
        }
        if let Some(expected) = order.gateway_order_id.as_deref() {
            if expected != gateway_order_id {
                warn!(expected, received = gateway_order_id, "Gateway order mismatch");
                return Err(ServiceError::Unauthorized(
                    "payment does not belong to this order".to_string(),
                ));
            }
        }

        let result = PaymentResult {
            id: gateway_payment_id.to_string(),
            status: "captured".to_string(),
            update_time: Utc::now().to_rfc3339(),
            email_address: Some(order.email.clone()),
        };
        let outcome = self.orders.mark_paid(order_id, result).await?;
        Ok(ack_for(outcome, order_id, MSG_PAYMENT_VERIFIED))
    }

    /// Asynchronous gateway webhook over the raw request body.
    ///
    /// Problems the gateway cannot fix by retrying (missing linkage, unknown
    /// order) are acknowledged; storage failures surface so it retries.
    #[instrument(skip(self, body, signature), fields(body_len = body.len()))]
    pub async fn handle_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<PaymentAck, ServiceError> {
        self.verifier.verify_webhook(body, signature)?;

        let envelope: WebhookEnvelope = serde_json::from_slice(body)
            .map_err(|e| ServiceError::BadRequest(format!("invalid webhook payload: {}", e)))?;

        let is_capture = matches!(envelope.event.as_str(), "payment.captured" | "order.paid");
        let is_failure = envelope.event == "payment.failed";
        if !is_capture && !is_failure {
            info!(event = %envelope.event, "Ignoring webhook event");
            return Ok(PaymentAck::ignored(MSG_EVENT_IGNORED));
        }

        let Some(entity) = envelope.payload.payment.map(|p| p.entity) else {
            warn!(event = %envelope.event, "Webhook carried no payment entity");
            return Ok(PaymentAck::ignored(MSG_NOTES_MISSING));
        };

        let Some(raw_id) = entity.internal_order_id() else {
            warn!(payment_id = %entity.id, "Webhook payment has no internal order id");
            return Ok(PaymentAck::ignored(MSG_NOTES_MISSING));
        };

        let Ok(order_id) = Uuid::parse_str(raw_id) else {
            warn!(payment_id = %entity.id, raw_id, "Webhook internal order id is not a valid id");
            return Ok(PaymentAck::ignored(MSG_ORDER_NOT_FOUND));
        };

        let order = match self.orders.get_order(order_id).await {
            Ok(order) => order,
            Err(ServiceError::NotFound(_)) => {
                warn!(order_id = %order_id, "Webhook references unknown order");
                return Ok(PaymentAck::ignored(MSG_ORDER_NOT_FOUND));
            }
            Err(e) => return Err(e),
        };

        if let (Some(expected), Some(received)) =
            (order.gateway_order_id.as_deref(), entity.order_id.as_deref())
        {
            if expected != received {
                warn!(expected, received, "Webhook gateway order mismatch; ignoring");
                return Ok(PaymentAck::ignored(MSG_EVENT_IGNORED));
            }
        }

        if is_failure {
            let recorded = self
                .orders
                .record_payment_failure(order_id, entity.result("failed"))
                .await?;
            return Ok(PaymentAck {
                message: if recorded {
                    MSG_FAILURE_RECORDED
                } else {
                    MSG_ALREADY_PAID
                },
                order_id: Some(order_id),
                applied: recorded,
            });
        }

        match self.orders.mark_paid(order_id, entity.result("captured")).await {
            Ok(outcome) => Ok(ack_for(outcome, order_id, MSG_PAYMENT_RECORDED)),
            Err(ServiceError::NotFound(_)) => Ok(PaymentAck::ignored(MSG_ORDER_NOT_FOUND)),
            Err(e) => Err(e),
        }
    }
}

fn ack_for(outcome: PaymentOutcome, order_id: Uuid, applied_message: &'static str) -> PaymentAck {
    let applied = outcome.was_applied();
    PaymentAck {
        message: if applied {
            applied_message
        } else {
            MSG_ALREADY_PAID
        },
        order_id: Some(order_id),
        applied,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn notes_as_empty_array_have_no_order_id() {
        let entity: PaymentEntity = serde_json::from_value(json!({
            "id": "pay_1",
            "order_id": "order_1",
            "notes": []
        }))
        .unwrap();
        assert_eq!(entity.internal_order_id(), None);
    }

    #[test]
    fn notes_object_yields_order_id() {
        let entity: PaymentEntity = serde_json::from_value(json!({
            "id": "pay_1",
            "notes": {"internal_order_id": " 7d1c0d5e-8d5e-4a1e-9a8e-0c1f0b9f6a11 "}
        }))
        .unwrap();
        assert_eq!(
            entity.internal_order_id(),
            Some("7d1c0d5e-8d5e-4a1e-9a8e-0c1f0b9f6a11")
        );
    }

    #[test]
    fn result_prefers_gateway_status() {
        let entity: PaymentEntity = serde_json::from_value(json!({
            "id": "pay_1",
            "status": "captured",
            "email": "x@example.com"
        }))
        .unwrap();
        let result = entity.result("fallback");
        assert_eq!(result.status, "captured");
        assert_eq!(result.email_address.as_deref(), Some("x@example.com"));
    }

    #[test]
    fn blank_required_fields_are_rejected() {
        assert!(required(&Some("  ".into()), "gatewaySignature").is_err());
        assert!(required(&None, "gatewaySignature").is_err());
        assert_eq!(required(&Some("sig".into()), "x").unwrap(), "sig");
    }
}
