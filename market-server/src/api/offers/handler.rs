//! Offer API Handlers

use axum::{
    Json,
    extract::{Path, State},
};

use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::db::repository::{offer as offer_repo, product as product_repo};
use crate::utils::{AppError, AppResult};
use shared::models::{Offer, OfferCreate, OfferHold, ReserveRequest};
use shared::util::now_millis;

/// POST /api/offers - 发布限时特价 (员工)
pub async fn create(
    State(state): State<ServerState>,
    user: CurrentUser,
    Json(payload): Json<OfferCreate>,
) -> AppResult<Json<Offer>> {
    if payload.total_qty <= 0 {
        return Err(AppError::validation("Offer quantity must be positive"));
    }
    if payload.expires_at <= payload.starts_at || payload.expires_at <= now_millis() {
        return Err(AppError::validation("Offer window must end in the future"));
    }

    let product = product_repo::get(&state.db, payload.product_id).await?;
    state
        .orders
        .authorize_shop_staff(product.shop_id, &user)
        .await?;

    let offer = offer_repo::create(&state.db, product.shop_id, payload).await?;
    Ok(Json(offer))
}

/// POST /api/offers/:id/holds - 锁定数量 (购物车)
pub async fn reserve(
    State(state): State<ServerState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<ReserveRequest>,
) -> AppResult<Json<OfferHold>> {
    let hold = state.holds.reserve(id, payload.quantity).await?;
    Ok(Json(hold))
}

/// DELETE /api/offers/holds/:hold_id - 释放锁定
pub async fn release(
    State(state): State<ServerState>,
    _user: CurrentUser,
    Path(hold_id): Path<i64>,
) -> AppResult<Json<shared::error::ApiResponse<()>>> {
    state.holds.release(hold_id).await?;
    Ok(Json(shared::error::ApiResponse::ok()))
}
