use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{
        order::{self, Entity as OrderEntity, OrderStatus},
        review::{self, ActiveModel as ReviewActiveModel, Entity as ReviewEntity, Model as ReviewModel},
    },
    errors::ServiceError,
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReviewRequest {
    #[validate(length(min = 1, message = "user id is required"))]
    pub user_id: String,
    #[validate(range(min = 1, max = 5, message = "rating must be between 1 and 5"))]
    pub rating: i32,
    #[validate(length(max = 2000, message = "comment is too long"))]
    #[serde(default)]
    pub comment: String,
}

#[derive(Clone)]
pub struct ReviewService {
    db: Arc<DbPool>,
}

impl ReviewService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Creates or updates the user's single review of a product
    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn submit_review(
        &self,
        product_id: &str,
        request: SubmitReviewRequest,
    ) -> Result<ReviewModel, ServiceError> {
        request.validate()?;
        if product_id.trim().is_empty() {
            return Err(ServiceError::ValidationError("product id is required".to_string()));
        }

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        let verified = OrderEntity::find()
            .filter(order::Column::UserId.eq(request.user_id.as_str()))
            .filter(order::Column::Status.eq(OrderStatus::Completed))
            .all(&txn)
            .await?
            .iter()
            .any(|o| o.contains_product(product_id));

        let existing = ReviewEntity::find()
            .filter(review::Column::ProductId.eq(product_id))
            .filter(review::Column::UserId.eq(request.user_id.as_str()))
            .one(&txn)
            .await?;

        let now = Utc::now();
        let saved = match existing {
            Some(current) => {
                let mut active: ReviewActiveModel = current.into();
                active.rating = Set(request.rating);
                active.comment = Set(request.comment);
                active.verified = Set(verified);
                active.updated_at = Set(now);
                active.update(&txn).await?
            }
            None => {
                ReviewActiveModel {
                    id: Set(Uuid::new_v4()),
                    product_id: Set(product_id.to_string()),
                    user_id: Set(request.user_id),
                    rating: Set(request.rating),
                    comment: Set(request.comment),
                    verified: Set(verified),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?
            }
        };

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit review");
            ServiceError::DatabaseError(e)
        })?;

        info!(review_id = %saved.id, verified, "Review saved");
        Ok(saved)
    }

    #[instrument(skip(self))]
    pub async fn list_reviews(&self, product_id: &str) -> Result<Vec<ReviewModel>, ServiceError> {
        Ok(ReviewEntity::find()
            .filter(review::Column::ProductId.eq(product_id))
            .order_by_desc(review::Column::UpdatedAt)
            .all(&*self.db)
            .await?)
    }
}
