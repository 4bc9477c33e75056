use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    entities::review::Model as ReviewModel, errors::ServiceError,
    services::reviews::SubmitReviewRequest, AppState,
};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReviewResponse {
    pub success: bool,
    #[schema(value_type = Object)]
    pub review: ReviewModel,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReviewListResponse {
    pub success: bool,
    #[schema(value_type = Vec<Object>)]
    pub reviews: Vec<ReviewModel>,
}

#[utoipa::path(
    post,
    path = "/api/v1/products/{product_id}/reviews",
    params(("product_id" = String, Path, description = "Reviewed product")),
    request_body = SubmitReviewRequest,
    responses(
        (status = 200, description = "Review created or updated", body = ReviewResponse),
        (status = 400, description = "Invalid rating or comment", body = crate::errors::ErrorResponse)
    ),
    tag = "reviews"
)]
pub async fn submit_review(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    Json(request): Json<SubmitReviewRequest>,
) -> Result<Json<ReviewResponse>, ServiceError> {
    let review = state
        .services
        .reviews
        .submit_review(&product_id, request)
        .await?;
    Ok(Json(ReviewResponse {
        success: true,
        review,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/products/{product_id}/reviews",
    params(("product_id" = String, Path, description = "Reviewed product")),
    responses((status = 200, description = "Reviews, newest first", body = ReviewListResponse)),
    tag = "reviews"
)]
pub async fn list_reviews(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Result<Json<ReviewListResponse>, ServiceError> {
    let reviews = state.services.reviews.list_reviews(&product_id).await?;
    Ok(Json(ReviewListResponse {
        success: true,
        reviews,
    }))
}
