//! Product API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use validator::Validate;

use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::db::repository::product as product_repo;
use crate::utils::{AppError, AppResult};
use shared::models::{Product, SnoozeKind, SnoozeRequest};
use shared::util::now_millis;

/// Preset snooze durations in minutes
const PRESET_SNOOZES: [i64; 4] = [30, 60, 120, 480];

#[derive(Debug, Deserialize, Validate)]
pub struct PromotionRequest {
    #[validate(range(min = 1))]
    pub price_cents: i64,
    pub ends_at: i64,
}

/// GET /api/products/:id - 获取单个商品
pub async fn get_by_id(
    State(state): State<ServerState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Product>> {
    let product = product_repo::get(&state.db, id).await?;
    Ok(Json(product))
}

/// POST /api/products/:id/snooze - 临时下架
pub async fn snooze(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<SnoozeRequest>,
) -> AppResult<Json<Product>> {
    let product = product_repo::get(&state.db, id).await?;
    state
        .orders
        .authorize_shop_staff(product.shop_id, &user)
        .await?;

    let now = now_millis();
    let until = match payload.kind {
        SnoozeKind::None => {
            return Err(AppError::validation("Use DELETE to lift a snooze"));
        }
        SnoozeKind::Preset => {
            let minutes = payload
                .minutes
                .ok_or_else(|| AppError::validation("Preset snooze requires minutes"))?;
            if !PRESET_SNOOZES.contains(&minutes) {
                return Err(AppError::validation(format!(
                    "Preset duration must be one of {:?} minutes",
                    PRESET_SNOOZES
                )));
            }
            Some(now + minutes * 60_000)
        }
        SnoozeKind::Custom => {
            let until = payload
                .until
                .ok_or_else(|| AppError::validation("Custom snooze requires an end time"))?;
            if until <= now {
                return Err(AppError::validation("Snooze end time must be in the future"));
            }
            Some(until)
        }
        SnoozeKind::Indefinite => None,
    };

    let product = product_repo::set_snooze(
        &state.db,
        id,
        payload.kind,
        until,
        payload.reason.as_deref(),
    )
    .await?;
    Ok(Json(product))
}

/// DELETE /api/products/:id/snooze - 恢复上架
pub async fn unsnooze(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Product>> {
    let product = product_repo::get(&state.db, id).await?;
    state
        .orders
        .authorize_shop_staff(product.shop_id, &user)
        .await?;

    let product = product_repo::clear_snooze(&state.db, id).await?;
    Ok(Json(product))
}

/// POST /api/products/:id/promotion - 设置促销价
pub async fn set_promotion(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<PromotionRequest>,
) -> AppResult<Json<Product>> {
    payload
        .validate()
        .map_err(|e| AppError::validation(e.to_string()))?;
    if payload.ends_at <= now_millis() {
        return Err(AppError::validation("Promotion must end in the future"));
    }

    let product = product_repo::get(&state.db, id).await?;
    state
        .orders
        .authorize_shop_staff(product.shop_id, &user)
        .await?;

    let product =
        product_repo::set_promotion(&state.db, id, payload.price_cents, payload.ends_at).await?;
    Ok(Json(product))
}

/// DELETE /api/products/:id/promotion - 提前结束促销
pub async fn clear_promotion(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Product>> {
    let product = product_repo::get(&state.db, id).await?;
    state
        .orders
        .authorize_shop_staff(product.shop_id, &user)
        .await?;

    let product = product_repo::clear_promotion(&state.db, id).await?;
    Ok(Json(product))
}
