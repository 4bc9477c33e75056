//! Carrier (Delhivery-style) shipment booking.
//!
//! [`build_payload`] is the pure order-to-carrier mapping; [`DelhiveryClient`]
//! performs the HTTP call. No retries happen here: a timeout is an unknown
//! outcome and is reported as such.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::entities::order::{Dimensions, Model as OrderModel, PaymentMethod};
use crate::errors::ServiceError;

const CREATE_PATH: &str = "/api/cmu/create.json";

#[derive(Debug, Error)]
pub enum CarrierError {
    #[error("pickup location not registered with carrier: {0}")]
    PickupLocationNotRegistered(String),
    #[error("carrier is not configured: {0}")]
    NotConfigured(String),
    #[error("carrier request timed out")]
    Timeout,
    #[error("carrier transport error: {0}")]
    Transport(String),
    #[error("carrier rejected shipment: {0}")]
    Rejected(String),
    #[error("unexpected carrier response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for CarrierError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CarrierError::Timeout
        } else {
            CarrierError::Transport(err.to_string())
        }
    }
}

impl From<CarrierError> for ServiceError {
    fn from(err: CarrierError) -> Self {
        match err {
            CarrierError::Timeout => ServiceError::UpstreamTimeout(
                "carrier did not answer in time; shipment outcome unknown".to_string(),
            ),
            CarrierError::NotConfigured(msg) => ServiceError::ConfigurationError(msg),
            other => ServiceError::ExternalServiceError(other.to_string()),
        }
    }
}

/// Parcel attributes after applying request overrides to configured defaults
#[derive(Debug, Clone, PartialEq)]
pub struct ParcelSpec {
    pub shipping_mode: String,
    /// Grams
    pub weight: f64,
    pub dimensions: Dimensions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CarrierPaymentMode {
    #[serde(rename = "COD")]
    Cod,
    Prepaid,
}

#[derive(Debug, Clone, Serialize)]
pub struct CarrierShipment {
    pub name: String,
    pub add: String,
    pub pin: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub phone: String,
    pub order: String,
    pub payment_mode: CarrierPaymentMode,
    pub products_desc: String,
    pub cod_amount: Decimal,
    pub total_amount: Decimal,
    pub quantity: u32,
    pub weight: f64,
    pub shipment_width: f64,
    pub shipment_height: f64,
    pub shipment_length: f64,
    pub shipping_mode: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PickupLocation {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CarrierPayload {
    pub shipments: Vec<CarrierShipment>,
    pub pickup_location: PickupLocation,
}

/// Maps an order onto the carrier's create-shipment schema
pub fn build_payload(order: &OrderModel, parcel: &ParcelSpec, pickup_location: &str) -> CarrierPayload {
    let address = &order.shipping_address;
    let payment_mode = match order.payment_method {
        PaymentMethod::Cod => CarrierPaymentMode::Cod,
        PaymentMethod::Gateway => CarrierPaymentMode::Prepaid,
    };
    let cod_amount = match payment_mode {
        CarrierPaymentMode::Cod => order.total_price,
        CarrierPaymentMode::Prepaid => Decimal::ZERO,
    };
    let products_desc = order
        .items
        .0
        .iter()
        .map(|line| match &line.size {
            Some(size) => format!("{} ({}) x{}", line.name, size, line.quantity),
            None => format!("{} x{}", line.name, line.quantity),
        })
        .collect::<Vec<_>>()
        .join(", ");

    CarrierPayload {
        shipments: vec![CarrierShipment {
            name: address.full_name.clone(),
            add: address.address.clone(),
            pin: address.postal_code.clone(),
            city: address.city.clone(),
            state: address.state.clone(),
            country: address.country.clone(),
            phone: address.phone.clone(),
            order: order.id.to_string(),
            payment_mode,
            products_desc,
            cod_amount,
            total_amount: order.total_price,
            quantity: order.total_quantity(),
            weight: parcel.weight,
            shipment_width: parcel.dimensions.breadth,
            shipment_height: parcel.dimensions.height,
            shipment_length: parcel.dimensions.length,
            shipping_mode: parcel.shipping_mode.clone(),
        }],
        pickup_location: PickupLocation {
            name: pickup_location.to_string(),
        },
    }
}

/// A booked shipment
#[derive(Debug, Clone, PartialEq)]
pub struct Booking {
    pub waybills: Vec<String>,
    /// Carrier response body as received
    pub raw: Value,
}

#[async_trait]
pub trait CarrierClient: Send + Sync {
    async fn create_shipment(&self, payload: &CarrierPayload) -> Result<Booking, CarrierError>;
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    rmk: Option<String>,
    #[serde(default)]
    packages: Vec<CreatedPackage>,
}

#[derive(Debug, Deserialize)]
struct CreatedPackage {
    #[serde(default)]
    waybill: Option<String>,
    #[serde(default)]
    remarks: Value,
}

/// Whether carrier remarks say the pickup warehouse is unknown to the account
pub fn is_missing_pickup_location(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.contains("clientwarehouse matching query does not exist")
        || (lower.contains("pickup location") && lower.contains("not registered"))
}

fn remarks_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(remarks_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("; "),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Interprets a create-shipment response body
fn interpret_response(raw: Value) -> Result<Booking, CarrierError> {
    let parsed: CreateResponse = serde_json::from_value(raw.clone())
        .map_err(|e| CarrierError::InvalidResponse(e.to_string()))?;

    let mut remarks: Vec<String> = parsed
        .packages
        .iter()
        .map(|p| remarks_text(&p.remarks))
        .filter(|s| !s.is_empty())
        .collect();
    if let Some(rmk) = parsed.rmk.as_ref().filter(|r| !r.is_empty()) {
        remarks.push(rmk.clone());
    }
    let remarks = remarks.join("; ");

    if is_missing_pickup_location(&remarks) {
        return Err(CarrierError::PickupLocationNotRegistered(remarks));
    }

    let waybills: Vec<String> = parsed
        .packages
        .into_iter()
        .filter_map(|p| p.waybill)
        .filter(|w| !w.trim().is_empty())
        .collect();

    if !parsed.success {
        return Err(CarrierError::Rejected(if remarks.is_empty() {
            "no remarks".to_string()
        } else {
            remarks
        }));
    }
    if waybills.is_empty() {
        return Err(CarrierError::InvalidResponse(
            "response carried no waybill".to_string(),
        ));
    }

    Ok(Booking { waybills, raw })
}

/// HTTP client for the Delhivery CMU create API
#[derive(Clone)]
pub struct DelhiveryClient {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl DelhiveryClient {
    pub fn new(
        base_url: String,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, CarrierError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }
}

#[async_trait]
impl CarrierClient for DelhiveryClient {
    #[instrument(skip(self, payload), fields(pickup = %payload.pickup_location.name))]
    async fn create_shipment(&self, payload: &CarrierPayload) -> Result<Booking, CarrierError> {
        let token = self
            .api_token
            .as_deref()
            .ok_or_else(|| CarrierError::NotConfigured("carrier API token missing".to_string()))?;

        let data = serde_json::to_string(payload)
            .map_err(|e| CarrierError::InvalidResponse(e.to_string()))?;

        let response = self
            .client
            .post(format!("{}{}", self.base_url, CREATE_PATH))
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", token))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[("format", "json"), ("data", data.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(status = status.as_u16(), "Carrier responded");

        let raw: Value = serde_json::from_str(&body).map_err(|_| {
            if is_missing_pickup_location(&body) {
                CarrierError::PickupLocationNotRegistered(body.clone())
            } else {
                warn!(status = status.as_u16(), "Carrier returned non-JSON body");
                CarrierError::InvalidResponse(format!("HTTP {}: {}", status.as_u16(), body))
            }
        })?;

        interpret_response(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::order::{OrderLine, OrderLines, OrderStatus, ShippingAddress};
    use assert_matches::assert_matches;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use uuid::Uuid;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn order(method: PaymentMethod) -> OrderModel {
        let now = Utc::now();
        OrderModel {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            email: "u1@example.com".into(),
            items: OrderLines(vec![
                OrderLine {
                    product_id: "p1".into(),
                    name: "Kurta".into(),
                    quantity: 2,
                    unit_price: dec!(500),
                    size: Some("L".into()),
                    item_status: "Ordered".into(),
                },
                OrderLine {
                    product_id: "p2".into(),
                    name: "Dupatta".into(),
                    quantity: 1,
                    unit_price: dec!(250),
                    size: None,
                    item_status: "Ordered".into(),
                },
            ]),
            shipping_address: ShippingAddress {
                full_name: "Meera".into(),
                address: "4 Lake View".into(),
                city: "Chennai".into(),
                state: "TN".into(),
                postal_code: "600001".into(),
                country: "India".into(),
                phone: "9876543210".into(),
            },
            payment_method: method,
            total_price: dec!(1250),
            is_paid: method == PaymentMethod::Gateway,
            paid_at: None,
            payment_result: None,
            gateway_order_id: None,
            status: OrderStatus::Confirmed,
            shipment_created: false,
            shipment_details: None,
            delivered_at: None,
            cancel_reason: None,
            cancel_requested_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn parcel() -> ParcelSpec {
        ParcelSpec {
            shipping_mode: "Surface".into(),
            weight: 500.0,
            dimensions: Dimensions {
                length: 10.0,
                breadth: 10.0,
                height: 10.0,
            },
        }
    }

    #[test]
    fn cod_orders_collect_total() {
        let payload = build_payload(&order(PaymentMethod::Cod), &parcel(), "Main Warehouse");
        let shipment = &payload.shipments[0];
        assert_eq!(shipment.payment_mode, CarrierPaymentMode::Cod);
        assert_eq!(shipment.cod_amount, dec!(1250));
        assert_eq!(shipment.quantity, 3);
        assert_eq!(shipment.products_desc, "Kurta (L) x2, Dupatta x1");
    }

    #[test]
    fn prepaid_orders_collect_nothing() {
        let payload = build_payload(&order(PaymentMethod::Gateway), &parcel(), "Main Warehouse");
        let shipment = &payload.shipments[0];
        assert_eq!(shipment.payment_mode, CarrierPaymentMode::Prepaid);
        assert_eq!(shipment.cod_amount, Decimal::ZERO);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["shipments"][0]["payment_mode"], "Prepaid");
        assert_eq!(json["pickup_location"]["name"], "Main Warehouse");
    }

    #[test]
    fn detects_missing_warehouse_wording() {
        assert!(is_missing_pickup_location(
            "ClientWarehouse matching query does not exist."
        ));
        assert!(is_missing_pickup_location(
            "Pickup location 'X' is not registered"
        ));
        assert!(!is_missing_pickup_location("Duplicate order id"));
    }

    #[test]
    fn missing_warehouse_in_package_remarks() {
        let raw = json!({
            "success": false,
            "rmk": "",
            "packages": [{"waybill": "", "remarks": ["ClientWarehouse matching query does not exist."]}]
        });
        assert_matches!(
            interpret_response(raw),
            Err(CarrierError::PickupLocationNotRegistered(_))
        );
    }

    #[test]
    fn rejection_without_waybill() {
        let raw = json!({"success": false, "packages": [{"remarks": ["Duplicate order id"]}]});
        assert_matches!(interpret_response(raw), Err(CarrierError::Rejected(msg)) if msg.contains("Duplicate"));
    }

    #[tokio::test]
    async fn posts_form_with_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CREATE_PATH))
            .and(header("authorization", "Token secret-token"))
            .and(body_string_contains("format=json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "packages": [{"waybill": "1234567890", "status": "Success", "remarks": []}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = DelhiveryClient::new(
            server.uri(),
            Some("secret-token".into()),
            Duration::from_secs(2),
        )
        .unwrap();
        let payload = build_payload(&order(PaymentMethod::Cod), &parcel(), "Main Warehouse");
        let booking = client.create_shipment(&payload).await.unwrap();
        assert_eq!(booking.waybills, vec!["1234567890".to_string()]);
    }

    #[tokio::test]
    async fn slow_carrier_is_a_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_json(json!({"success": true})),
            )
            .mount(&server)
            .await;

        let client =
            DelhiveryClient::new(server.uri(), Some("t".into()), Duration::from_millis(50)).unwrap();
        let payload = build_payload(&order(PaymentMethod::Cod), &parcel(), "Main Warehouse");
        assert_matches!(
            client.create_shipment(&payload).await,
            Err(CarrierError::Timeout)
        );
    }

    #[test]
    fn timeout_maps_to_gateway_timeout() {
        let err: ServiceError = CarrierError::Timeout.into();
        assert_matches!(err, ServiceError::UpstreamTimeout(_));
    }
}
