use chrono::{DateTime, Utc};
use metrics::counter;
use rand::Rng;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::CarrierConfig,
    db::DbPool,
    entities::order::{
        self, ActiveModel as OrderActiveModel, Dimensions, Entity as OrderEntity,
        Model as OrderModel, OrderLines, OrderStatus, ShipmentDetails,
    },
    errors::ServiceError,
    notifications::{send_best_effort, Mailer, OrderEmail},
    services::carrier::{build_payload, CarrierClient, CarrierError, ParcelSpec},
};

/// Marker stored in `delhiveryResponse.rmk` for synthesized waybills
pub const DEMO_MODE_REMARK: &str =
    "DEMO MODE: pickup location not registered with carrier; waybill generated locally";

/// Operator overrides for a shipment; unset fields fall back to configuration
#[derive(Debug, Clone, Default)]
pub struct ShipmentOptions {
    pub shipping_mode: Option<String>,
    pub weight: Option<f64>,
    pub dimensions: Option<Dimensions>,
    pub pickup_location: Option<String>,
}

/// Result of a successful shipment creation
#[derive(Debug, Clone)]
pub struct ShipmentBooking {
    pub order: OrderModel,
    pub waybills: Vec<String>,
    pub demo_mode: bool,
}

/// Synthesized waybill: `DH` + unix millis + four random digits
pub fn demo_waybill(now: DateTime<Utc>) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
    format!("DH{}{:04}", now.timestamp_millis(), suffix)
}

/// Books carrier shipments for confirmed orders
#[derive(Clone)]
pub struct ShipmentService {
    db_pool: Arc<DbPool>,
    carrier: Arc<dyn CarrierClient>,
    mailer: Arc<dyn Mailer>,
    defaults: CarrierConfig,
}

impl ShipmentService {
    pub fn new(
        db_pool: Arc<DbPool>,
        carrier: Arc<dyn CarrierClient>,
        mailer: Arc<dyn Mailer>,
        defaults: CarrierConfig,
    ) -> Self {
        Self {
            db_pool,
            carrier,
            mailer,
            defaults,
        }
    }

    fn parcel(&self, options: &ShipmentOptions) -> ParcelSpec {
        ParcelSpec {
            shipping_mode: options
                .shipping_mode
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| self.defaults.default_shipping_mode.clone()),
            weight: options
                .weight
                .filter(|w| *w > 0.0)
                .unwrap_or(self.defaults.default_weight_grams),
            dimensions: options.dimensions.clone().unwrap_or(Dimensions {
                length: self.defaults.default_length_cm,
                breadth: self.defaults.default_breadth_cm,
                height: self.defaults.default_height_cm,
            }),
        }
    }

    /// Creates the carrier shipment for a Confirmed order.
    ///
    /// The order is reserved first (`shipment_created` flipped under a
    /// status/flag guard) so only one caller reaches the carrier. Carrier
    /// failures release the reservation; a missing pickup warehouse produces
    /// a locally generated demo waybill instead.
    #[instrument(skip(self, options), fields(order_id = %order_id))]
    pub async fn create_shipment(
        &self,
        order_id: Uuid,
        options: ShipmentOptions,
    ) -> Result<ShipmentBooking, ServiceError> {
        let db = &*self.db_pool;
        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.shipment_created {
            return Err(ServiceError::Conflict(
                "shipment already created for this order".to_string(),
            ));
        }
        if order.status != OrderStatus::Confirmed {
            return Err(ServiceError::Conflict(format!(
                "order must be Confirmed to ship; current status is {}",
                order.status
            )));
        }

        self.reserve(order_id).await?;

        let parcel = self.parcel(&options);
        let pickup_location = options
            .pickup_location
            .clone()
            .filter(|p| !p.trim().is_empty())
            .or_else(|| self.defaults.pickup_location.clone());

        let booked = match pickup_location.as_deref() {
            Some(pickup) => {
                let payload = build_payload(&order, &parcel, pickup);
                self.carrier.create_shipment(&payload).await
            }
            None => Err(CarrierError::PickupLocationNotRegistered(
                "no pickup location configured".to_string(),
            )),
        };

        let now = Utc::now();
        let (waybills, response, demo_mode) = match booked {
            Ok(booking) => (booking.waybills, booking.raw, false),
            Err(CarrierError::PickupLocationNotRegistered(detail)) => {
                let waybill = demo_waybill(now);
                warn!(%waybill, %detail, "Pickup location not registered; using demo waybill");
                counter!("storefront.shipments.demo_waybills", 1);
                let response = demo_response(&waybill, &detail);
                (vec![waybill], response, true)
            }
            Err(e) => {
                error!(error = %e, "Carrier booking failed; releasing reservation");
                counter!("storefront.shipments.carrier_failures", 1);
                self.release(order_id).await;
                return Err(e.into());
            }
        };

        let primary = waybills.first().cloned().unwrap_or_default();
        let details = ShipmentDetails {
            waybills: waybills.clone(),
            pickup_location: pickup_location.unwrap_or_default(),
            shipping_mode: parcel.shipping_mode,
            weight: parcel.weight,
            dimensions: parcel.dimensions,
            delhivery_response: response,
            demo_mode,
            created_at: now,
        };

        let mut lines = order.items.0.clone();
        lines.iter_mut().for_each(|l| l.item_status = primary.clone());

        let mut active: OrderActiveModel = order.into();
        active.shipment_created = Set(true);
        active.shipment_details = Set(Some(details));
        active.status = Set(OrderStatus::Dispatched);
        active.items = Set(OrderLines(lines));
        active.updated_at = Set(now);

        let updated = active.update(db).await.map_err(|e| {
            error!(error = %e, waybill = %primary, "Shipment booked but order update failed");
            ServiceError::DatabaseError(e)
        })?;

        counter!("storefront.shipments.created", 1);
        info!(waybill = %primary, demo_mode, "Shipment created");

        send_best_effort(self.mailer.as_ref(), OrderEmail::status_update(&updated)).await;

        Ok(ShipmentBooking {
            order: updated,
            waybills,
            demo_mode,
        })
    }

    async fn reserve(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let reserved = OrderEntity::update_many()
            .col_expr(order::Column::ShipmentCreated, Expr::value(true))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(OrderStatus::Confirmed))
            .filter(order::Column::ShipmentCreated.eq(false))
            .exec(&*self.db_pool)
            .await?;

        if reserved.rows_affected == 0 {
            return Err(ServiceError::Conflict(
                "shipment already created for this order".to_string(),
            ));
        }
        Ok(())
    }

    async fn release(&self, order_id: Uuid) {
        let released = OrderEntity::update_many()
            .col_expr(order::Column::ShipmentCreated, Expr::value(false))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(OrderStatus::Confirmed))
            .filter(order::Column::ShipmentDetails.is_null())
            .exec(&*self.db_pool)
            .await;

        if let Err(e) = released {
            error!(error = %e, order_id = %order_id, "Failed to release shipment reservation");
        }
    }
}

fn demo_response(waybill: &str, detail: &str) -> Value {
    json!({
        "success": true,
        "rmk": DEMO_MODE_REMARK,
        "detail": detail,
        "packages": [{ "waybill": waybill, "status": "Success", "remarks": [] }],
    })
}
