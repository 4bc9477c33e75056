use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait,
    QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::order::{
        self, ActiveModel as OrderActiveModel, Entity as OrderEntity, Model as OrderModel,
        OrderLine, OrderLines, OrderStatus, PaymentMethod, PaymentResult, ShippingAddress,
        ITEM_STATUS_ORDERED,
    },
    errors::ServiceError,
    notifications::{send_best_effort, Mailer, OrderEmail},
    services::carts::CartService,
};

/// Checkout submission
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "user id is required"))]
    pub user_id: String,
    #[validate(email(message = "a valid email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "an order needs at least one item"))]
    pub items: Vec<CreateOrderLine>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    /// Gateway order created at checkout; checked again on confirmation
    #[serde(default)]
    pub gateway_order_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderLine {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    #[schema(value_type = String, example = "499.00")]
    pub unit_price: Decimal,
    #[serde(default)]
    pub size: Option<String>,
}

/// Result of a mark-paid or COD placement attempt
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    /// This call performed the transition
    Applied(OrderModel),
    /// The transition had already happened; nothing was changed
    AlreadyApplied(OrderModel),
}

impl PaymentOutcome {
    pub fn order(&self) -> &OrderModel {
        match self {
            PaymentOutcome::Applied(order) | PaymentOutcome::AlreadyApplied(order) => order,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, PaymentOutcome::Applied(_))
    }
}

/// Order intake plus the payment transitions of the order state machine
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    mailer: Arc<dyn Mailer>,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>, mailer: Arc<dyn Mailer>) -> Self {
        Self { db, mailer }
    }

    /// Creates a pending, unpaid order from a checkout submission
    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<OrderModel, ServiceError> {
        request.validate()?;

        if let Some(line) = request.items.iter().find(|l| l.quantity == 0) {
            return Err(ServiceError::ValidationError(format!(
                "quantity for product {} must be at least 1",
                line.product_id
            )));
        }
        if let Some(line) = request.items.iter().find(|l| l.unit_price.is_sign_negative()) {
            return Err(ServiceError::ValidationError(format!(
                "unit price for product {} must not be negative",
                line.product_id
            )));
        }
        if request.payment_method == PaymentMethod::Gateway && request.gateway_order_id.is_none() {
            return Err(ServiceError::ValidationError(
                "gateway orders need a gatewayOrderId".to_string(),
            ));
        }

        let total_price: Decimal = request
            .items
            .iter()
            .map(|l| l.unit_price * Decimal::from(l.quantity))
            .sum();
        let lines = request
            .items
            .into_iter()
            .map(|l| OrderLine {
                product_id: l.product_id,
                name: l.name,
                quantity: l.quantity,
                unit_price: l.unit_price,
                size: l.size,
                item_status: ITEM_STATUS_ORDERED.to_string(),
            })
            .collect();

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let model = OrderActiveModel {
            id: Set(order_id),
            user_id: Set(request.user_id),
            email: Set(request.email),
            items: Set(OrderLines(lines)),
            shipping_address: Set(request.shipping_address),
            payment_method: Set(request.payment_method),
            total_price: Set(total_price),
            is_paid: Set(false),
            paid_at: Set(None),
            payment_result: Set(None),
            gateway_order_id: Set(request.gateway_order_id),
            status: Set(OrderStatus::Pending),
            shipment_created: Set(false),
            shipment_details: Set(None),
            delivered_at: Set(None),
            cancel_reason: Set(None),
            cancel_requested_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let order = model.insert(&*self.db).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to create order");
            ServiceError::DatabaseError(e)
        })?;

        counter!("storefront.orders.created", 1);
        info!(order_id = %order_id, total_price = %order.total_price, "Order created");
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Records a captured payment.
    ///
    /// `isPaid` is claimed with a compare-and-swap inside the transaction, so
    /// of several concurrent confirmations exactly one observes
    /// [`PaymentOutcome::Applied`]. The cart is cleared in the same
    /// transaction; the confirmation email goes out after commit.
    #[instrument(skip(self, result), fields(order_id = %order_id))]
    pub async fn mark_paid(
        &self,
        order_id: Uuid,
        result: PaymentResult,
    ) -> Result<PaymentOutcome, ServiceError> {
        let txn = self.begin().await?;
        let order = find_in(&txn, order_id).await?;

        if order.is_paid {
            rollback(txn).await;
            counter!("storefront.payments.duplicate_confirmations", 1);
            info!("Order already paid; skipping side effects");
            return Ok(PaymentOutcome::AlreadyApplied(order));
        }

        let now = Utc::now();
        let claimed = OrderEntity::update_many()
            .col_expr(order::Column::IsPaid, Expr::value(true))
            .col_expr(order::Column::PaidAt, Expr::value(now))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::IsPaid.eq(false))
            .exec(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to claim payment");
                ServiceError::DatabaseError(e)
            })?;

        if claimed.rows_affected == 0 {
            rollback(txn).await;
            counter!("storefront.payments.duplicate_confirmations", 1);
            let current = self.get_order(order_id).await?;
            info!("Concurrent confirmation won the race; skipping side effects");
            return Ok(PaymentOutcome::AlreadyApplied(current));
        }

        let user_id = order.user_id.clone();
        let next_status = if order.status == OrderStatus::Pending {
            OrderStatus::Processing
        } else {
            order.status
        };

        let mut active: OrderActiveModel = order.into();
        active.is_paid = Set(true);
        active.paid_at = Set(Some(now));
        active.payment_result = Set(Some(result));
        active.status = Set(next_status);
        active.updated_at = Set(now);
        let updated = active.update(&txn).await.map_err(|e| {
            error!(error = %e, "Failed to record payment");
            ServiceError::DatabaseError(e)
        })?;

        CartService::clear_cart_in(&txn, &user_id).await.map_err(|e| {
            error!(error = %e, %user_id, "Failed to clear cart during payment");
            ServiceError::DatabaseError(e)
        })?;

        self.commit(txn).await?;

        counter!("storefront.payments.verified", 1);
        info!(status = %updated.status, "Payment recorded");

        send_best_effort(self.mailer.as_ref(), OrderEmail::confirmation(&updated)).await;
        Ok(PaymentOutcome::Applied(updated))
    }

    /// Places a cash-on-delivery order: `pending -> Processing` with the
    /// same claim-then-clear transaction as a paid order.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn place_cod_order(&self, order_id: Uuid) -> Result<PaymentOutcome, ServiceError> {
        let txn = self.begin().await?;
        let order = find_in(&txn, order_id).await?;

        if order.payment_method != PaymentMethod::Cod {
            rollback(txn).await;
            return Err(ServiceError::BadRequest(
                "order was not placed as cash on delivery".to_string(),
            ));
        }
        if order.status != OrderStatus::Pending {
            rollback(txn).await;
            info!(status = %order.status, "COD order already placed");
            return Ok(PaymentOutcome::AlreadyApplied(order));
        }

        let now = Utc::now();
        let claimed = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Processing))
            .col_expr(order::Column::UpdatedAt, Expr::value(now))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .exec(&txn)
            .await?;

        if claimed.rows_affected == 0 {
            rollback(txn).await;
            let current = self.get_order(order_id).await?;
            return Ok(PaymentOutcome::AlreadyApplied(current));
        }

        CartService::clear_cart_in(&txn, &order.user_id).await?;
        self.commit(txn).await?;

        let mut placed = order;
        placed.status = OrderStatus::Processing;
        placed.updated_at = now;

        counter!("storefront.orders.cod_placed", 1);
        info!("COD order placed");
        send_best_effort(self.mailer.as_ref(), OrderEmail::confirmation(&placed)).await;
        Ok(PaymentOutcome::Applied(placed))
    }

    /// Records a failed gateway payment on an unpaid order.
    ///
    /// Status and `isPaid` are untouched; a paid order is left as is.
    #[instrument(skip(self, result), fields(order_id = %order_id))]
    pub async fn record_payment_failure(
        &self,
        order_id: Uuid,
        result: PaymentResult,
    ) -> Result<bool, ServiceError> {
        let updated = OrderEntity::update_many()
            .col_expr(order::Column::PaymentResult, Expr::value(result))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::IsPaid.eq(false))
            .exec(&*self.db)
            .await?;

        if updated.rows_affected == 0 {
            warn!("Payment failure ignored; order missing or already paid");
            return Ok(false);
        }
        counter!("storefront.payments.failed", 1);
        Ok(true)
    }

    async fn begin(&self) -> Result<DatabaseTransaction, ServiceError> {
        self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            ServiceError::DatabaseError(e)
        })
    }

    async fn commit(&self, txn: DatabaseTransaction) -> Result<(), ServiceError> {
        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit transaction");
            ServiceError::DatabaseError(e)
        })
    }
}

/// Loads an order inside a transaction, mapping absence to `NotFound`
pub(crate) async fn find_in(
    txn: &DatabaseTransaction,
    order_id: Uuid,
) -> Result<OrderModel, ServiceError> {
    OrderEntity::find_by_id(order_id)
        .one(txn)
        .await
        .map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to fetch order");
            ServiceError::DatabaseError(e)
        })?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
}

/// Rolls back a transaction whose outcome no longer matters
pub(crate) async fn rollback(txn: DatabaseTransaction) {
    if let Err(e) = txn.rollback().await {
        warn!(error = %e, "Transaction rollback failed");
    }
}
