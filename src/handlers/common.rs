use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::order::Model as OrderModel;

pub use crate::services::parse_uuid;

/// `{success, message}` acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            order_id: None,
        }
    }

    pub fn with_order(mut self, order_id: Option<Uuid>) -> Self {
        self.order_id = order_id;
        self
    }
}

/// `{success, message?, order}` envelope
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[schema(value_type = Object)]
    pub order: OrderModel,
}

impl OrderEnvelope {
    pub fn new(order: OrderModel) -> Self {
        Self {
            success: true,
            message: None,
            order,
        }
    }

    pub fn with_message(order: OrderModel, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            order,
        }
    }
}
