use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{entities::cart::CartLine, errors::ServiceError, AppState};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartResponse {
    pub success: bool,
    pub items: Vec<CartLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SaveCartRequest {
    #[serde(default)]
    pub items: Vec<CartLine>,
}

#[utoipa::path(
    get,
    path = "/api/v1/carts/{user_id}",
    params(("user_id" = String, Path, description = "Cart owner")),
    responses((status = 200, description = "Saved cart, empty when none", body = CartResponse)),
    tag = "carts"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<CartResponse>, ServiceError> {
    let items = state.services.carts.get_cart(&user_id).await?;
    Ok(Json(CartResponse {
        success: true,
        items,
    }))
}

#[utoipa::path(
    put,
    path = "/api/v1/carts/{user_id}",
    params(("user_id" = String, Path, description = "Cart owner")),
    request_body = SaveCartRequest,
    responses(
        (status = 200, description = "Cart replaced", body = CartResponse),
        (status = 400, description = "Invalid cart line", body = crate::errors::ErrorResponse)
    ),
    tag = "carts"
)]
pub async fn save_cart(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<SaveCartRequest>,
) -> Result<Json<CartResponse>, ServiceError> {
    let items = state
        .services
        .carts
        .save_cart(&user_id, request.items)
        .await?;
    Ok(Json(CartResponse {
        success: true,
        items,
    }))
}
