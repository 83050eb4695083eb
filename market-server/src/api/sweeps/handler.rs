//! Sweep API Handlers

use axum::{Json, extract::State};

use crate::auth::ServiceAuth;
use crate::core::ServerState;
use crate::sweeper::SweepOutcome;
use crate::utils::AppResult;

/// POST /api/sweeps/expired-orders - 自动取消过期订单
pub async fn expired_orders(
    State(state): State<ServerState>,
    _auth: ServiceAuth,
) -> AppResult<Json<SweepOutcome>> {
    let outcome = state.sweeper.auto_cancel_expired_orders().await?;
    Ok(Json(outcome))
}

/// POST /api/sweeps/product-snoozes - 释放到期下架
pub async fn product_snoozes(
    State(state): State<ServerState>,
    _auth: ServiceAuth,
) -> AppResult<Json<SweepOutcome>> {
    let outcome = state.sweeper.unsnooze_expired_products().await?;
    Ok(Json(outcome))
}

/// POST /api/sweeps/stale-promotions - 清理过期促销
pub async fn stale_promotions(
    State(state): State<ServerState>,
    _auth: ServiceAuth,
) -> AppResult<Json<SweepOutcome>> {
    let outcome = state.sweeper.expire_stale_promotions().await?;
    Ok(Json(outcome))
}

/// POST /api/sweeps/expired-holds - 释放过期锁定
pub async fn expired_holds(
    State(state): State<ServerState>,
    _auth: ServiceAuth,
) -> AppResult<Json<SweepOutcome>> {
    let outcome = state.sweeper.release_expired_holds().await?;
    Ok(Json(outcome))
}
