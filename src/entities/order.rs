use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Item status written when an order completes
pub const ITEM_STATUS_DELIVERED: &str = "Delivered";
/// Item status written when an order is cancelled
pub const ITEM_STATUS_CANCELLED: &str = "Cancelled";
/// Item status of a freshly placed order
pub const ITEM_STATUS_ORDERED: &str = "Ordered";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: String,
    pub email: String,
    #[sea_orm(column_type = "Json")]
    pub items: OrderLines,
    #[sea_orm(column_type = "Json")]
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total_price: Decimal,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    #[sea_orm(column_type = "Json", nullable)]
    pub payment_result: Option<PaymentResult>,
    pub gateway_order_id: Option<String>,
    pub status: OrderStatus,
    pub shipment_created: bool,
    #[sea_orm(column_type = "Json", nullable)]
    pub shipment_details: Option<ShipmentDetails>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub cancel_requested_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Sum of line quantities
    pub fn total_quantity(&self) -> u32 {
        self.items.0.iter().map(|line| line.quantity).sum()
    }

    /// Whether any line references the given product
    pub fn contains_product(&self, product_id: &str) -> bool {
        self.items.0.iter().any(|line| line.product_id == product_id)
    }
}

/// Canonical order status.
///
/// Stored and serialized with the values the storefront has always used
/// (`pending` lowercase, the rest capitalized). Parsing is case-insensitive
/// and folds the legacy lowercase track (`shipped`, `delivered`, `canceled`)
/// onto these values.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    ToSchema,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[strum(ascii_case_insensitive)]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    #[serde(rename = "pending")]
    #[strum(to_string = "pending")]
    Pending,
    #[sea_orm(string_value = "Processing")]
    Processing,
    #[sea_orm(string_value = "Confirmed")]
    Confirmed,
    #[sea_orm(string_value = "Dispatched")]
    #[strum(to_string = "Dispatched", serialize = "shipped")]
    Dispatched,
    #[sea_orm(string_value = "Completed")]
    #[strum(to_string = "Completed", serialize = "delivered")]
    Completed,
    #[sea_orm(string_value = "Cancelled")]
    #[strum(to_string = "Cancelled", serialize = "canceled")]
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        (*self).into()
    }

    /// Completed and Cancelled accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "gateway")]
    Gateway,
    #[sea_orm(string_value = "cod")]
    Cod,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    #[schema(value_type = String, example = "499.00")]
    pub unit_price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Per-line fulfillment status; carries the waybill once shipped
    pub item_status: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize, FromJsonQueryResult, ToSchema)]
#[serde(transparent)]
pub struct OrderLines(pub Vec<OrderLine>);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub full_name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub phone: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResult {
    pub id: String,
    pub status: String,
    pub update_time: String,
    #[serde(default)]
    pub email_address: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Dimensions {
    pub length: f64,
    pub breadth: f64,
    pub height: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, FromJsonQueryResult, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentDetails {
    pub waybills: Vec<String>,
    pub pickup_location: String,
    pub shipping_mode: String,
    /// Grams
    pub weight: f64,
    pub dimensions: Dimensions,
    /// Raw carrier response, or the synthesized demo record
    #[schema(value_type = Object)]
    pub delhivery_response: serde_json::Value,
    pub demo_mode: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("pending", OrderStatus::Pending)]
    #[case("PENDING", OrderStatus::Pending)]
    #[case("processing", OrderStatus::Processing)]
    #[case("Processing", OrderStatus::Processing)]
    #[case("confirmed", OrderStatus::Confirmed)]
    #[case("Dispatched", OrderStatus::Dispatched)]
    #[case("shipped", OrderStatus::Dispatched)]
    #[case("Shipped", OrderStatus::Dispatched)]
    #[case("delivered", OrderStatus::Completed)]
    #[case("Completed", OrderStatus::Completed)]
    #[case("canceled", OrderStatus::Cancelled)]
    #[case("CANCELLED", OrderStatus::Cancelled)]
    fn aliases_normalize_to_canonical(#[case] raw: &str, #[case] expected: OrderStatus) {
        assert_eq!(raw.parse::<OrderStatus>().unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("refunded")]
    #[case("on_hold")]
    fn unknown_statuses_are_rejected(#[case] raw: &str) {
        assert!(raw.parse::<OrderStatus>().is_err());
    }

    #[test]
    fn serialized_values_match_stored_values() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Confirmed,
            OrderStatus::Dispatched,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
        ] {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, serde_json::Value::String(status.as_str().to_string()));
            assert_eq!(status.to_value(), status.as_str().to_string());
            assert_eq!(status.to_string(), status.as_str());
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Dispatched.is_terminal());
    }

    #[test]
    fn payment_method_is_lowercase_on_the_wire() {
        assert_eq!(
            serde_json::to_value(PaymentMethod::Cod).unwrap(),
            serde_json::json!("cod")
        );
        let parsed: PaymentMethod = serde_json::from_value(serde_json::json!("gateway")).unwrap();
        assert_eq!(parsed, PaymentMethod::Gateway);
    }
}
