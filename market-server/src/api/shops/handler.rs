//! Shop API Handlers

use axum::{
    Json,
    extract::{Path, State},
};

use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::db::repository::shop as shop_repo;
use crate::sequence;
use crate::utils::AppResult;
use shared::models::{BusyModeUpdate, CustomerNumber, Shop};

/// GET /api/shops/:id - 店铺信息
pub async fn get_by_id(
    State(state): State<ServerState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Shop>> {
    let shop = shop_repo::get(&state.db, id).await?;
    Ok(Json(shop))
}

/// POST /api/shops/:id/busy-mode - 高峰模式开关 (员工)
pub async fn set_busy_mode(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<BusyModeUpdate>,
) -> AppResult<Json<Shop>> {
    state.orders.authorize_shop_staff(id, &user).await?;
    let shop =
        shop_repo::set_busy_mode(&state.db, id, payload.enabled, payload.extra_minutes).await?;
    Ok(Json(shop))
}

/// POST /api/shops/:id/reopen - 恢复营业 (员工；解除自动暂停)
pub async fn reopen(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Shop>> {
    state.orders.authorize_shop_staff(id, &user).await?;
    let shop = shop_repo::reopen(&state.db, id).await?;
    tracing::info!(shop_id = id, "Shop reopened by staff");
    Ok(Json(shop))
}

/// POST /api/shops/:id/customer-number - 领取永久客户号 (幂等)
pub async fn customer_number(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<CustomerNumber>> {
    // Shop must exist before a counter row is created for it
    shop_repo::get(&state.db, id).await?;
    let assignment = sequence::next_customer_number(&state.db, id, user.user_id).await?;
    Ok(Json(assignment))
}
