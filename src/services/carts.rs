use chrono::Utc;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::{
    db::DbPool,
    entities::cart::{self, ActiveModel as CartActiveModel, CartLine, CartLines, Entity as CartEntity},
    errors::ServiceError,
};

/// Server-side cart persistence. One cart per user, overwritten on every save.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DbPool>,
}

impl CartService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Returns the user's cart lines, empty when no cart exists yet
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: &str) -> Result<Vec<CartLine>, ServiceError> {
        let cart = CartEntity::find_by_id(user_id.to_string())
            .one(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, user_id, "Failed to load cart");
                ServiceError::DatabaseError(e)
            })?;
        Ok(cart.map(|c| c.items.0).unwrap_or_default())
    }

    /// Replaces the user's cart wholesale (last writer wins)
    #[instrument(skip(self, items), fields(line_count = items.len()))]
    pub async fn save_cart(
        &self,
        user_id: &str,
        items: Vec<CartLine>,
    ) -> Result<Vec<CartLine>, ServiceError> {
        if user_id.trim().is_empty() {
            return Err(ServiceError::ValidationError("user id is required".to_string()));
        }
        if let Some(line) = items.iter().find(|l| l.product_id.trim().is_empty()) {
            return Err(ServiceError::ValidationError(format!(
                "cart line with quantity {} has no product id",
                line.quantity
            )));
        }
        if let Some(line) = items.iter().find(|l| l.quantity == 0) {
            return Err(ServiceError::ValidationError(format!(
                "quantity for product {} must be at least 1",
                line.product_id
            )));
        }

        let now = Utc::now();
        let model = CartActiveModel {
            user_id: Set(user_id.to_string()),
            items: Set(CartLines(items.clone())),
            created_at: Set(now),
            updated_at: Set(now),
        };

        CartEntity::insert(model)
            .on_conflict(
                OnConflict::column(cart::Column::UserId)
                    .update_columns([cart::Column::Items, cart::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, user_id, "Failed to save cart");
                ServiceError::DatabaseError(e)
            })?;

        info!(user_id, line_count = items.len(), "Cart saved");
        Ok(items)
    }

    /// Empties a user's cart on the given connection or transaction.
    ///
    /// The row is kept; a missing cart is not an error.
    pub async fn clear_cart_in<C: ConnectionTrait>(conn: &C, user_id: &str) -> Result<(), DbErr> {
        CartEntity::update_many()
            .col_expr(cart::Column::Items, Expr::value(CartLines::default()))
            .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(cart::Column::UserId.eq(user_id))
            .exec(conn)
            .await?;
        Ok(())
    }
}
