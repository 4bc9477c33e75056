use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveValue::Set, ColumnTrait, DbErr, EntityTrait, QueryFilter, TransactionTrait};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::order::{
        self, ActiveModel as OrderActiveModel, Entity as OrderEntity, Model as OrderModel,
        OrderLines, OrderStatus, ITEM_STATUS_CANCELLED, ITEM_STATUS_DELIVERED,
    },
    errors::ServiceError,
    notifications::{send_best_effort, Mailer, OrderEmail},
    services::orders::{find_in, rollback},
};

/// Legal forward moves per status. Terminal statuses have none.
pub const STATUS_FLOW: &[(OrderStatus, &[OrderStatus])] = &[
    (
        OrderStatus::Pending,
        &[OrderStatus::Processing, OrderStatus::Cancelled],
    ),
    (
        OrderStatus::Processing,
        &[OrderStatus::Confirmed, OrderStatus::Cancelled],
    ),
    (
        OrderStatus::Confirmed,
        &[OrderStatus::Dispatched, OrderStatus::Cancelled],
    ),
    (
        OrderStatus::Dispatched,
        &[OrderStatus::Completed, OrderStatus::Cancelled],
    ),
    (OrderStatus::Completed, &[]),
    (OrderStatus::Cancelled, &[]),
];

/// Statuses an operator may set directly
const ADMIN_STATUSES: &[OrderStatus] = &[
    OrderStatus::Processing,
    OrderStatus::Confirmed,
    OrderStatus::Dispatched,
    OrderStatus::Completed,
    OrderStatus::Cancelled,
];

pub fn next_statuses(current: OrderStatus) -> &'static [OrderStatus] {
    STATUS_FLOW
        .iter()
        .find(|(status, _)| *status == current)
        .map(|(_, next)| *next)
        .unwrap_or(&[])
}

pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    next_statuses(from).contains(&to)
}

/// Normalizes an external status string to the canonical enum
pub fn parse_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    raw.trim()
        .parse::<OrderStatus>()
        .map_err(|_| ServiceError::InvalidStatus(format!("unknown order status '{}'", raw)))
}

fn parse_admin_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    let status = parse_status(raw)?;
    if ADMIN_STATUSES.contains(&status) {
        Ok(status)
    } else {
        Err(ServiceError::InvalidStatus(format!(
            "'{}' cannot be set directly; allowed: Processing, Confirmed, Dispatched, Completed, Cancelled",
            raw
        )))
    }
}

/// Outcome of a status request
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub order: OrderModel,
    /// False when the order already had the requested status
    pub changed: bool,
}

/// Which rule set a status request is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransitionPolicy {
    /// Admin allow-list; any non-terminal order may move to any allowed status
    Admin,
    /// Strict forward flow used by the shipment workflow
    Flow,
}

#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DbPool>,
    mailer: Arc<dyn Mailer>,
}

impl OrderStatusService {
    pub fn new(db: Arc<DbPool>, mailer: Arc<dyn Mailer>) -> Self {
        Self { db, mailer }
    }

    /// Operator status update from the order admin screen
    #[instrument(skip(self, reason), fields(order_id = %order_id, requested = %status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        status: &str,
        reason: Option<String>,
    ) -> Result<StatusChange, ServiceError> {
        let target = parse_admin_status(status)?;
        self.transition(order_id, target, reason, None, TransitionPolicy::Admin)
            .await
    }

    /// Shipment workflow status update, restricted to [`STATUS_FLOW`]
    #[instrument(skip(self, reason), fields(order_id = %order_id, requested = %status))]
    pub async fn update_shipment_status(
        &self,
        order_id: Uuid,
        status: &str,
        waybill: Option<String>,
        reason: Option<String>,
    ) -> Result<StatusChange, ServiceError> {
        let target = parse_status(status)?;
        self.transition(order_id, target, reason, waybill, TransitionPolicy::Flow)
            .await
    }

    async fn transition(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        reason: Option<String>,
        waybill: Option<String>,
        policy: TransitionPolicy,
    ) -> Result<StatusChange, ServiceError> {
        let txn = self.db.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        let order = find_in(&txn, order_id).await?;
        let current = order.status;

        if current == target {
            rollback(txn).await;
            info!(status = %current, "Order already has requested status");
            return Ok(StatusChange {
                order,
                changed: false,
            });
        }

        if current.is_terminal() {
            rollback(txn).await;
            return Err(ServiceError::Conflict(format!(
                "order is {} and cannot change status",
                current
            )));
        }

        if policy == TransitionPolicy::Flow && !can_transition(current, target) {
            rollback(txn).await;
            return Err(ServiceError::Conflict(format!(
                "cannot move order from {} to {}; allowed: {:?}",
                current,
                target,
                next_statuses(current)
            )));
        }

        let now = Utc::now();
        let mut lines = order.items.0.clone();
        let mut active: OrderActiveModel = order.into();
        active.status = Set(target);
        active.updated_at = Set(now);

        match target {
            OrderStatus::Completed => {
                active.delivered_at = Set(Some(now));
                lines
                    .iter_mut()
                    .for_each(|l| l.item_status = ITEM_STATUS_DELIVERED.to_string());
                active.items = Set(OrderLines(lines));
            }
            OrderStatus::Cancelled => {
                active.cancel_reason = Set(reason.filter(|r| !r.trim().is_empty()));
                active.cancel_requested_at = Set(Some(now));
                lines
                    .iter_mut()
                    .for_each(|l| l.item_status = ITEM_STATUS_CANCELLED.to_string());
                active.items = Set(OrderLines(lines));
            }
            OrderStatus::Dispatched => {
                if let Some(waybill) = waybill.filter(|w| !w.trim().is_empty()) {
                    lines.iter_mut().for_each(|l| l.item_status = waybill.clone());
                    active.items = Set(OrderLines(lines));
                }
            }
            _ => {}
        }

        // Guard against a concurrent writer moving the order meanwhile
        let updated = OrderEntity::update(active)
            .filter(order::Column::Status.eq(current))
            .exec(&txn)
            .await
            .map_err(|e| match e {
                DbErr::RecordNotUpdated => {
                    warn!("Order status changed concurrently");
                    ServiceError::Conflict("order status changed concurrently".to_string())
                }
                other => {
                    error!(error = %other, "Failed to update order status");
                    ServiceError::DatabaseError(other)
                }
            })?;

        txn.commit().await.map_err(|e| {
            error!("Failed to commit transaction for order {}: {}", order_id, e);
            ServiceError::DatabaseError(e)
        })?;

        info!(from = %current, to = %target, "Order status updated");

        send_best_effort(self.mailer.as_ref(), OrderEmail::status_update(&updated)).await;
        Ok(StatusChange {
            order: updated,
            changed: true,
        })
    }
}
