//! Order API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::{CurrentUser, ServiceAuth};
use crate::core::ServerState;
use crate::utils::{AppError, AppResult};
use shared::models::{Order, OrderCreate, OrderDetail, OrderSummary};
use shared::order::{
    DenialResponse, OrderStatus, WeightEntry, WeightReviewResponse,
};

// =============================================================================
// Payloads
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct AcceptRequest {
    /// Staff override; estimator-derived when omitted
    pub estimated_minutes: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DenyRequest {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct StockIssueRequest {
    pub unavailable_product_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub action: DenialResponse,
}

#[derive(Debug, Deserialize)]
pub struct PrepareRequest {
    /// Extends the current ETA, not from now, so repeated delays accumulate
    pub add_minutes: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PickupRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct PickupVerification {
    pub valid: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RateRequest {
    #[validate(range(min = 1, max = 5))]
    pub score: i64,
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WeightsRequest {
    pub entries: Vec<WeightEntry>,
}

#[derive(Debug, Deserialize)]
pub struct WeightReviewRequest {
    pub action: WeightReviewResponse,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<OrderStatus>,
}

// =============================================================================
// Creation and queries
// =============================================================================

/// POST /api/orders - 下单
pub async fn create(
    State(state): State<ServerState>,
    user: CurrentUser,
    Json(payload): Json<OrderCreate>,
) -> AppResult<Json<OrderDetail>> {
    let detail = state.orders.create(&user, payload).await?;
    Ok(Json(detail))
}

/// GET /api/orders/:id - 订单详情 (按调用者身份过滤)
pub async fn get_by_id(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<OrderDetail>> {
    let detail = state.orders.detail(id, &user).await?;
    Ok(Json(detail))
}

/// GET /api/orders/shop/:shop_id - 店铺订单列表 (员工)
pub async fn list_for_shop(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(shop_id): Path<i64>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<OrderSummary>>> {
    let orders = state
        .orders
        .list_for_shop(shop_id, &user, query.status)
        .await?;
    Ok(Json(orders))
}

// =============================================================================
// Shop-side transitions
// =============================================================================

/// POST /api/orders/:id/accept - 接单
pub async fn accept(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<AcceptRequest>,
) -> AppResult<Json<Order>> {
    let order = state
        .orders
        .accept(id, &user, payload.estimated_minutes)
        .await?;
    Ok(Json(order))
}

/// POST /api/orders/:id/deny - 拒单
pub async fn deny(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<DenyRequest>,
) -> AppResult<Json<Order>> {
    payload
        .validate()
        .map_err(|e| AppError::validation(e.to_string()))?;
    let order = state.orders.deny(id, &user, &payload.reason).await?;
    Ok(Json(order))
}

/// POST /api/orders/:id/stock-issue - 报告缺货
pub async fn report_stock_issue(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<StockIssueRequest>,
) -> AppResult<Json<Order>> {
    let order = state
        .orders
        .report_stock_issue(id, &user, &payload.unavailable_product_ids)
        .await?;
    Ok(Json(order))
}

/// POST /api/orders/:id/stock-issue/flag - 备餐中缺货挂起
pub async fn flag_stock_issue(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Order>> {
    let order = state.orders.flag_stock_issue(id, &user).await?;
    Ok(Json(order))
}

/// POST /api/orders/:id/stock-issue/resolve - 缺货解决，继续备餐
pub async fn resolve_stock_issue(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Order>> {
    let order = state.orders.resolve_stock_issue(id, &user).await?;
    Ok(Json(order))
}

/// POST /api/orders/:id/prepare - 开始备餐 / 延长时间
pub async fn start_preparing(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<PrepareRequest>,
) -> AppResult<Json<Order>> {
    let order = state
        .orders
        .start_preparing(id, &user, payload.add_minutes)
        .await?;
    Ok(Json(order))
}

/// POST /api/orders/:id/ready - 备餐完成
pub async fn mark_ready(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Order>> {
    let order = state.orders.mark_ready(id, &user).await?;
    Ok(Json(order))
}

/// POST /api/orders/:id/weights - 记录称重
pub async fn record_weights(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<WeightsRequest>,
) -> AppResult<Json<Order>> {
    let order = state
        .orders
        .record_weights(id, &user, &payload.entries)
        .await?;
    Ok(Json(order))
}

/// POST /api/orders/:id/pickup - 核销取货
pub async fn confirm_pickup(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<PickupRequest>,
) -> AppResult<Json<Order>> {
    let order = state
        .orders
        .confirm_pickup(id, &user, &payload.token)
        .await?;
    Ok(Json(order))
}

/// POST /api/orders/:id/verify-pickup - 校验取货码 (无副作用)
pub async fn verify_pickup(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<PickupRequest>,
) -> AppResult<Json<PickupVerification>> {
    let valid = state.orders.verify_pickup(id, &user, &payload.token).await?;
    Ok(Json(PickupVerification { valid }))
}

// =============================================================================
// Shopper-side transitions
// =============================================================================

/// POST /api/orders/:id/respond - 回应部分拒单
pub async fn respond_to_partial_denial(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<RespondRequest>,
) -> AppResult<Json<Order>> {
    let order = state
        .orders
        .respond_to_partial_denial(id, &user, payload.action)
        .await?;
    Ok(Json(order))
}

/// POST /api/orders/:id/weight-review - 回应称重调整
pub async fn respond_to_weight_review(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<WeightReviewRequest>,
) -> AppResult<Json<Order>> {
    let order = state
        .orders
        .respond_to_weight_review(id, &user, payload.action)
        .await?;
    Ok(Json(order))
}

/// POST /api/orders/:id/cancel - 自助取消
pub async fn cancel(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Order>> {
    let order = state.orders.cancel(id, &user).await?;
    Ok(Json(order))
}

/// POST /api/orders/:id/rate - 评分
pub async fn rate(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<RateRequest>,
) -> AppResult<Json<Order>> {
    payload
        .validate()
        .map_err(|e| AppError::validation(e.to_string()))?;
    let order = state
        .orders
        .rate(id, &user, payload.score, payload.comment.as_deref())
        .await?;
    Ok(Json(order))
}

// =============================================================================
// Machine callbacks
// =============================================================================

/// POST /api/orders/:id/payment-confirmed - 支付完成回调 (幂等)
pub async fn payment_confirmed(
    State(state): State<ServerState>,
    _auth: ServiceAuth,
    Path(id): Path<i64>,
) -> AppResult<Json<Order>> {
    let order = state.orders.confirm_payment(id).await?;
    Ok(Json(order))
}
