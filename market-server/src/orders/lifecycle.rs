//! Order lifecycle manager
//!
//! Every mutation here follows the same shape: load, check ownership, then a
//! conditional UPDATE guarded on the current status (`WHERE id = ? AND
//! status = ?`). Zero affected rows means the caller raced a concurrent
//! transition or asked for an illegal edge; the rejection names the current
//! status and its allowed targets. Multi-step mutations (line flags, total
//! recomputation, status) share one transaction so readers never observe a
//! half-applied order.

use crate::auth::CurrentUser;
use crate::db::repository::{
    offer as offer_repo, order as order_repo, product as product_repo, shop as shop_repo,
};
use crate::inventory::HoldManager;
use crate::notify::{NotifierHandle, StatusNotification};
use crate::orders::money;
use crate::orders::prep_time::{self, PrepTimeInput};
use crate::sequence;
use crate::utils::TtlCache;
use rand::Rng;
use shared::error::{AppError, AppResult, ErrorCode};
use shared::models::{Order, OrderCreate, OrderDetail, OrderSummary, Product};
use shared::order::{
    DenialResponse, OrderStatus, PricingKind, WeightEntry, WeightReviewResponse,
};
use shared::util::{now_millis, snowflake_id};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;

/// Tunables for the lifecycle rules
#[derive(Debug, Clone)]
pub struct LifecyclePolicy {
    /// Pending orders expire after this many minutes (sweeper input)
    pub order_expiry_minutes: i64,
    /// Shopper may self-cancel an accepted order this long after creation
    pub self_cancel_grace_minutes: i64,
    /// Weight adjustments above this percentage need shopper approval
    pub weight_review_threshold_pct: i64,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            order_expiry_minutes: 10,
            self_cancel_grace_minutes: 5,
            weight_review_threshold_pct: 10,
        }
    }
}

/// The order state machine service
#[derive(Clone)]
pub struct OrderLifecycle {
    pool: SqlitePool,
    policy: LifecyclePolicy,
    notifier: NotifierHandle,
    /// Shop owner lookups on the hot transition path
    owner_cache: Arc<TtlCache<i64, i64>>,
}

impl OrderLifecycle {
    pub fn new(
        pool: SqlitePool,
        policy: LifecyclePolicy,
        notifier: NotifierHandle,
        owner_cache: Arc<TtlCache<i64, i64>>,
    ) -> Self {
        Self {
            pool,
            policy,
            notifier,
            owner_cache,
        }
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Create a PENDING order.
    ///
    /// Validates every line against the catalog, prices it (hold-backed
    /// lines take their offer price), pulls the daily display number, and
    /// persists order + lines + consumed holds in one transaction. Stock is
    /// validated, not reserved: the shop commits quantity only when it
    /// accepts; only offer holds pin quantity, and only until they expire.
    pub async fn create(
        &self,
        shopper: &CurrentUser,
        payload: OrderCreate,
    ) -> AppResult<OrderDetail> {
        if payload.lines.is_empty() {
            return Err(AppError::with_message(
                ErrorCode::OrderEmpty,
                "Order must contain at least one line",
            ));
        }

        let shop = shop_repo::get(&self.pool, payload.shop_id).await?;
        if !shop.is_open {
            return Err(AppError::new(ErrorCode::ShopClosed).with_detail("shop_id", shop.id));
        }

        let now = now_millis();
        let product_ids: Vec<i64> = payload.lines.iter().map(|l| l.product_id).collect();
        let products: HashMap<i64, Product> =
            product_repo::find_by_ids(&self.pool, &product_ids)
                .await?
                .into_iter()
                .map(|p| (p.id, p))
                .collect();

        // Price all lines up front; nothing is written until they all pass
        let mut priced = Vec::with_capacity(payload.lines.len());
        let mut total_cents: i64 = 0;
        for line in &payload.lines {
            let product = products.get(&line.product_id).ok_or_else(|| {
                AppError::new(ErrorCode::ProductNotFound)
                    .with_detail("product_id", line.product_id)
            })?;
            if product.shop_id != shop.id {
                return Err(AppError::new(ErrorCode::ProductNotInShop)
                    .with_detail("product_id", product.id));
            }
            if !product.in_stock {
                return Err(AppError::new(ErrorCode::ProductOutOfStock)
                    .with_detail("product_id", product.id)
                    .with_detail("product_name", product.name.clone()));
            }
            // A line backed by a cart hold takes the offer price; the hold
            // itself is consumed inside the transaction below.
            let unit_price = match line.hold_id {
                Some(hold_id) => {
                    let hold = offer_repo::find_hold(&self.pool, hold_id)
                        .await?
                        .ok_or_else(|| {
                            AppError::new(ErrorCode::HoldNotFound).with_detail("hold_id", hold_id)
                        })?;
                    let offer = offer_repo::get(&self.pool, hold.offer_id).await?;
                    if offer.product_id != line.product_id {
                        return Err(AppError::validation(format!(
                            "Hold {hold_id} is for a different product"
                        )));
                    }
                    if hold.quantity != line.quantity {
                        return Err(AppError::validation(format!(
                            "Hold {hold_id} covers {} unit(s), line asks for {}",
                            hold.quantity, line.quantity
                        )));
                    }
                    offer.price_cents
                }
                None => product.effective_price_cents(now),
            };
            let line_total = money::line_total_cents(
                product.pricing_kind,
                unit_price,
                line.quantity,
                line.weight_grams,
            )?;
            total_cents += line_total;
            priced.push((line, product, unit_price, line_total));
        }

        let commission_cents = money::commission_cents(total_cents, shop.commission_rate_bps);
        let order_id = snowflake_id();
        let expires_at = now + self.policy.order_expiry_minutes * 60_000;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(e.to_string()))?;

        let number = sequence::next_daily_number(&mut tx, shop.id).await?;

        sqlx::query(
            "INSERT INTO orders (id, shop_id, shopper_id, display_seq, display_number, status, total_cents, commission_cents, expires_at, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, 'PENDING', ?6, ?7, ?8, ?9, ?9)",
        )
        .bind(order_id)
        .bind(shop.id)
        .bind(shopper.user_id)
        .bind(number.value)
        .bind(&number.display)
        .bind(total_cents)
        .bind(commission_cents)
        .bind(expires_at)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::database(e.to_string()))?;

        for (line, product, unit_price, line_total) in &priced {
            sqlx::query(
                "INSERT INTO order_line (id, order_id, product_id, name, pricing_kind, quantity, weight_grams, unit_price_cents, line_total_cents, available) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1)",
            )
            .bind(snowflake_id())
            .bind(order_id)
            .bind(product.id)
            .bind(&product.name)
            .bind(product.pricing_kind)
            .bind(line.quantity)
            .bind(line.weight_grams)
            .bind(unit_price)
            .bind(line_total)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::database(e.to_string()))?;
        }

        // Offer holds presented at checkout are consumed here: quantity
        // permanently leaves the offer in the same transaction.
        for line in &payload.lines {
            if let Some(hold_id) = line.hold_id {
                HoldManager::consume(&mut tx, hold_id, now).await?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| AppError::database(e.to_string()))?;

        let order = order_repo::get(&self.pool, order_id).await?;
        tracing::info!(
            order_id,
            shop_id = shop.id,
            display = %number.display,
            total_cents,
            "Order created"
        );
        self.notifier
            .dispatch(StatusNotification::new(
                &order,
                format!("Order {} placed at {}", number.display, shop.name),
            ))
            .await;

        self.detail_unfiltered(order_id).await
    }

    // =========================================================================
    // Shop-side transitions
    // =========================================================================

    /// PENDING → ACCEPTED. Generates the pickup token and stamps the ETA
    /// (staff estimate, or the prep-time estimator when omitted).
    pub async fn accept(
        &self,
        order_id: i64,
        staff: &CurrentUser,
        estimated_minutes: Option<i64>,
    ) -> AppResult<Order> {
        let order = order_repo::get(&self.pool, order_id).await?;
        self.ensure_shop_owner(&order, staff).await?;

        let minutes = match estimated_minutes {
            Some(m) if m > 0 => m,
            Some(_) => return Err(AppError::validation("Estimated minutes must be positive")),
            None => self.estimate_for(&order).await?,
        };

        let now = now_millis();
        let token = generate_pickup_token();
        let rows = sqlx::query(
            "UPDATE orders SET status = 'ACCEPTED', pickup_token = ?1, estimated_ready_at = ?2, accepted_at = ?3, updated_at = ?3 WHERE id = ?4 AND status = 'PENDING'",
        )
        .bind(&token)
        .bind(now + minutes * 60_000)
        .bind(now)
        .bind(order_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(e.to_string()))?;

        if rows.rows_affected() == 0 {
            return Err(self.reject_transition(order_id, OrderStatus::Accepted).await);
        }

        let order = order_repo::get(&self.pool, order_id).await?;
        self.notifier
            .dispatch(StatusNotification::new(
                &order,
                format!(
                    "Order {} accepted, ready in about {} minutes",
                    order.display_number, minutes
                ),
            ))
            .await;
        Ok(order)
    }

    /// Idempotent payment-confirmation entry point: advances a PENDING order
    /// exactly like `accept` (estimator ETA); anything else is a logged no-op
    /// so duplicate webhook deliveries are harmless.
    pub async fn confirm_payment(&self, order_id: i64) -> AppResult<Order> {
        let order = order_repo::get(&self.pool, order_id).await?;
        if order.status != OrderStatus::Pending {
            tracing::info!(
                order_id,
                status = %order.status,
                "Payment confirmation for already-advanced order; no-op"
            );
            return Ok(order);
        }

        let minutes = self.estimate_for(&order).await?;
        let now = now_millis();
        let token = generate_pickup_token();
        let rows = sqlx::query(
            "UPDATE orders SET status = 'ACCEPTED', pickup_token = ?1, estimated_ready_at = ?2, accepted_at = ?3, updated_at = ?3 WHERE id = ?4 AND status = 'PENDING'",
        )
        .bind(&token)
        .bind(now + minutes * 60_000)
        .bind(now)
        .bind(order_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(e.to_string()))?;

        if rows.rows_affected() == 0 {
            // Raced another advancement; duplicate delivery stays a no-op
            return order_repo::get(&self.pool, order_id).await.map_err(Into::into);
        }

        let order = order_repo::get(&self.pool, order_id).await?;
        self.notifier
            .dispatch(StatusNotification::new(
                &order,
                format!("Order {} confirmed after payment", order.display_number),
            ))
            .await;
        Ok(order)
    }

    /// PENDING → DENIED with a reason
    pub async fn deny(
        &self,
        order_id: i64,
        staff: &CurrentUser,
        reason: &str,
    ) -> AppResult<Order> {
        let order = order_repo::get(&self.pool, order_id).await?;
        self.ensure_shop_owner(&order, staff).await?;

        let now = now_millis();
        let rows = sqlx::query(
            "UPDATE orders SET status = 'DENIED', denial_reason = ?1, updated_at = ?2 WHERE id = ?3 AND status = 'PENDING'",
        )
        .bind(reason)
        .bind(now)
        .bind(order_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(e.to_string()))?;

        if rows.rows_affected() == 0 {
            return Err(self.reject_transition(order_id, OrderStatus::Denied).await);
        }

        let order = order_repo::get(&self.pool, order_id).await?;
        self.notifier
            .dispatch(StatusNotification::new(
                &order,
                format!("Order {} was denied: {}", order.display_number, reason),
            ))
            .await;
        Ok(order)
    }

    /// Report products unavailable mid-flight (PENDING or PREPARING).
    ///
    /// Marks the matching lines unavailable, recomputes the total from what
    /// is left, flips the products out of stock, and lands on DENIED when
    /// nothing survives, PARTIALLY_DENIED otherwise. One transaction.
    pub async fn report_stock_issue(
        &self,
        order_id: i64,
        staff: &CurrentUser,
        unavailable_product_ids: &[i64],
    ) -> AppResult<Order> {
        if unavailable_product_ids.is_empty() {
            return Err(AppError::validation("No products reported unavailable"));
        }
        let order = order_repo::get(&self.pool, order_id).await?;
        self.ensure_shop_owner(&order, staff).await?;

        let shop = shop_repo::get(&self.pool, order.shop_id).await?;
        let now = now_millis();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(e.to_string()))?;

        let marked =
            order_repo::mark_lines_unavailable(&mut tx, order_id, unavailable_product_ids).await?;
        if marked == 0 {
            tx.rollback()
                .await
                .map_err(|e| AppError::database(e.to_string()))?;
            return Err(AppError::new(ErrorCode::NoMatchingLines)
                .with_detail("order_id", order_id));
        }

        let new_total = order_repo::recompute_total(&mut tx, order_id).await?;
        let remaining = order_repo::lines_tx(&mut tx, order_id)
            .await?
            .into_iter()
            .filter(|l| l.available)
            .count();
        let target = if remaining == 0 {
            OrderStatus::Denied
        } else {
            OrderStatus::PartiallyDenied
        };
        let commission = money::commission_cents(new_total, shop.commission_rate_bps);
        let reason = format!("{} product(s) unavailable", unavailable_product_ids.len());

        let rows = sqlx::query(
            "UPDATE orders SET status = ?1, denial_reason = ?2, commission_cents = ?3, updated_at = ?4 WHERE id = ?5 AND status IN ('PENDING', 'PREPARING')",
        )
        .bind(target.as_str())
        .bind(&reason)
        .bind(commission)
        .bind(now)
        .bind(order_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::database(e.to_string()))?;

        if rows.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| AppError::database(e.to_string()))?;
            return Err(self.reject_transition(order_id, target).await);
        }

        // Side effect outside the order aggregate, same transaction:
        // the shelves reflect the shortage immediately.
        product_repo::mark_out_of_stock(&mut tx, unavailable_product_ids).await?;

        tx.commit()
            .await
            .map_err(|e| AppError::database(e.to_string()))?;

        let order = order_repo::get(&self.pool, order_id).await?;
        let message = match order.status {
            OrderStatus::Denied => format!(
                "Order {} could not be fulfilled: {}",
                order.display_number, reason
            ),
            _ => format!(
                "Some items in order {} are unavailable; please confirm how to continue",
                order.display_number
            ),
        };
        self.notifier
            .dispatch(StatusNotification::new(&order, message))
            .await;
        Ok(order)
    }

    /// ACCEPTED|PREPARING → PREPARING; `add_minutes` pushes the ETA out from
    /// its current value so repeated delays accumulate.
    pub async fn start_preparing(
        &self,
        order_id: i64,
        staff: &CurrentUser,
        add_minutes: Option<i64>,
    ) -> AppResult<Order> {
        let order = order_repo::get(&self.pool, order_id).await?;
        self.ensure_shop_owner(&order, staff).await?;

        let now = now_millis();
        let extend_ms = add_minutes.unwrap_or(0).max(0) * 60_000;
        let rows = sqlx::query(
            "UPDATE orders SET status = 'PREPARING', estimated_ready_at = COALESCE(estimated_ready_at, ?1) + ?2, updated_at = ?1 WHERE id = ?3 AND status IN ('ACCEPTED', 'PREPARING')",
        )
        .bind(now)
        .bind(extend_ms)
        .bind(order_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(e.to_string()))?;

        if rows.rows_affected() == 0 {
            return Err(self.reject_transition(order_id, OrderStatus::Preparing).await);
        }

        let order = order_repo::get(&self.pool, order_id).await?;
        if extend_ms > 0 {
            self.notifier
                .dispatch(StatusNotification::new(
                    &order,
                    format!(
                        "Order {} delayed by {} minutes",
                        order.display_number,
                        extend_ms / 60_000
                    ),
                ))
                .await;
        }
        Ok(order)
    }

    /// ACCEPTED|PREPARING → READY
    pub async fn mark_ready(&self, order_id: i64, staff: &CurrentUser) -> AppResult<Order> {
        let order = order_repo::get(&self.pool, order_id).await?;
        self.ensure_shop_owner(&order, staff).await?;

        let now = now_millis();
        let rows = sqlx::query(
            "UPDATE orders SET status = 'READY', ready_at = ?1, updated_at = ?1 WHERE id = ?2 AND status IN ('ACCEPTED', 'PREPARING')",
        )
        .bind(now)
        .bind(order_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(e.to_string()))?;

        if rows.rows_affected() == 0 {
            return Err(self.reject_transition(order_id, OrderStatus::Ready).await);
        }

        let order = order_repo::get(&self.pool, order_id).await?;
        self.notifier
            .dispatch(StatusNotification::new(
                &order,
                format!("Order {} is ready for pickup", order.display_number),
            ))
            .await;
        Ok(order)
    }

    /// READY → PICKED_UP, gated on the pickup token.
    ///
    /// A wrong token is a validation error and leaves the order READY; the
    /// token is also part of the UPDATE guard so a concurrent token rotation
    /// could never slip through (tokens are immutable, but the guard is free).
    pub async fn confirm_pickup(
        &self,
        order_id: i64,
        staff: &CurrentUser,
        presented_token: &str,
    ) -> AppResult<Order> {
        let order = order_repo::get(&self.pool, order_id).await?;
        self.ensure_shop_owner(&order, staff).await?;

        if order.status != OrderStatus::Ready {
            return Err(self.reject_transition(order_id, OrderStatus::PickedUp).await);
        }
        if order.pickup_token.as_deref() != Some(presented_token) {
            tracing::warn!(order_id, "Pickup token mismatch");
            return Err(AppError::new(ErrorCode::PickupTokenMismatch)
                .with_detail("order_id", order_id));
        }

        let now = now_millis();
        let rows = sqlx::query(
            "UPDATE orders SET status = 'PICKED_UP', picked_up_at = ?1, updated_at = ?1 WHERE id = ?2 AND status = 'READY' AND pickup_token = ?3",
        )
        .bind(now)
        .bind(order_id)
        .bind(presented_token)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(e.to_string()))?;

        if rows.rows_affected() == 0 {
            return Err(self.reject_transition(order_id, OrderStatus::PickedUp).await);
        }

        let order = order_repo::get(&self.pool, order_id).await?;
        self.notifier
            .dispatch(StatusNotification::new(
                &order,
                format!("Order {} picked up, enjoy!", order.display_number),
            ))
            .await;
        Ok(order)
    }

    /// Side-effect-free token check for the counter display
    pub async fn verify_pickup(
        &self,
        order_id: i64,
        staff: &CurrentUser,
        presented_token: &str,
    ) -> AppResult<bool> {
        let order = order_repo::get(&self.pool, order_id).await?;
        self.ensure_shop_owner(&order, staff).await?;
        Ok(order.status == OrderStatus::Ready
            && order.pickup_token.as_deref() == Some(presented_token))
    }

    /// PREPARING → STOCK_ISSUE: the shop pauses prep to resolve a shortage
    pub async fn flag_stock_issue(&self, order_id: i64, staff: &CurrentUser) -> AppResult<Order> {
        self.staff_transition(
            order_id,
            staff,
            &[OrderStatus::Preparing],
            OrderStatus::StockIssue,
        )
        .await
    }

    /// STOCK_ISSUE → PREPARING: shortage resolved, prep continues
    pub async fn resolve_stock_issue(
        &self,
        order_id: i64,
        staff: &CurrentUser,
    ) -> AppResult<Order> {
        self.staff_transition(
            order_id,
            staff,
            &[OrderStatus::StockIssue],
            OrderStatus::Preparing,
        )
        .await
    }

    /// Record actual weights for weight-priced lines during PREPARING.
    ///
    /// Line totals are rewritten from the actual weights; any adjustment
    /// beyond the threshold parks the order in WEIGHT_REVIEW for shopper
    /// approval.
    pub async fn record_weights(
        &self,
        order_id: i64,
        staff: &CurrentUser,
        entries: &[WeightEntry],
    ) -> AppResult<Order> {
        if entries.is_empty() {
            return Err(AppError::validation("No weights provided"));
        }
        let order = order_repo::get(&self.pool, order_id).await?;
        self.ensure_shop_owner(&order, staff).await?;
        if order.status != OrderStatus::Preparing {
            return Err(self.reject_transition(order_id, OrderStatus::WeightReview).await);
        }

        let lines: HashMap<i64, _> = order_repo::lines(&self.pool, order_id)
            .await?
            .into_iter()
            .map(|l| (l.id, l))
            .collect();

        let shop = shop_repo::get(&self.pool, order.shop_id).await?;
        let now = now_millis();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(e.to_string()))?;

        let mut needs_review = false;
        for entry in entries {
            let line = lines.get(&entry.line_id).ok_or_else(|| {
                AppError::new(ErrorCode::OrderLineNotFound).with_detail("line_id", entry.line_id)
            })?;
            if line.pricing_kind != PricingKind::Weight {
                return Err(AppError::validation(format!(
                    "Line {} is not weight-priced",
                    entry.line_id
                )));
            }
            if !line.available {
                return Err(AppError::validation(format!(
                    "Line {} is unavailable",
                    entry.line_id
                )));
            }
            if entry.weight_grams <= 0 {
                return Err(AppError::validation("Weight must be positive"));
            }

            let ordered = line.weight_grams.unwrap_or(0);
            if money::weight_deviation_exceeds(
                ordered,
                entry.weight_grams,
                self.policy.weight_review_threshold_pct,
            ) {
                needs_review = true;
            }

            let pack = money::per_pack_weight_cents(entry.weight_grams, line.unit_price_cents);
            order_repo::update_line_weight(
                &mut tx,
                entry.line_id,
                entry.weight_grams,
                pack * line.quantity,
            )
            .await?;
        }

        let new_total = order_repo::recompute_total(&mut tx, order_id).await?;
        let commission = money::commission_cents(new_total, shop.commission_rate_bps);
        let target = if needs_review {
            OrderStatus::WeightReview
        } else {
            OrderStatus::Preparing
        };

        let rows = sqlx::query(
            "UPDATE orders SET status = ?1, commission_cents = ?2, updated_at = ?3 WHERE id = ?4 AND status = 'PREPARING'",
        )
        .bind(target.as_str())
        .bind(commission)
        .bind(now)
        .bind(order_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::database(e.to_string()))?;

        if rows.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| AppError::database(e.to_string()))?;
            return Err(self.reject_transition(order_id, target).await);
        }

        tx.commit()
            .await
            .map_err(|e| AppError::database(e.to_string()))?;

        let order = order_repo::get(&self.pool, order_id).await?;
        if needs_review {
            self.notifier
                .dispatch(StatusNotification::new(
                    &order,
                    format!(
                        "Order {}: weighed amounts changed the price, please approve",
                        order.display_number
                    ),
                ))
                .await;
        }
        Ok(order)
    }

    // =========================================================================
    // Shopper-side transitions
    // =========================================================================

    /// Shopper answers a partial denial: keep what is left, or cancel.
    pub async fn respond_to_partial_denial(
        &self,
        order_id: i64,
        shopper: &CurrentUser,
        action: DenialResponse,
    ) -> AppResult<Order> {
        let order = order_repo::get(&self.pool, order_id).await?;
        ensure_order_shopper(&order, shopper)?;

        let now = now_millis();
        match action {
            DenialResponse::CancelOrder => {
                let rows = sqlx::query(
                    "UPDATE orders SET status = 'CANCELLED', cancelled_at = ?1, updated_at = ?1 WHERE id = ?2 AND status = 'PARTIALLY_DENIED'",
                )
                .bind(now)
                .bind(order_id)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::database(e.to_string()))?;
                if rows.rows_affected() == 0 {
                    return Err(self.reject_transition(order_id, OrderStatus::Cancelled).await);
                }
            }
            DenialResponse::Continue => {
                let shop = shop_repo::get(&self.pool, order.shop_id).await?;
                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| AppError::database(e.to_string()))?;

                order_repo::delete_unavailable_lines(&mut tx, order_id).await?;
                let new_total = order_repo::recompute_total(&mut tx, order_id).await?;
                if new_total <= 0 {
                    tx.rollback()
                        .await
                        .map_err(|e| AppError::database(e.to_string()))?;
                    return Err(AppError::with_message(
                        ErrorCode::OrderEmpty,
                        "No available lines remain; cancel the order instead",
                    ));
                }

                let commission = money::commission_cents(new_total, shop.commission_rate_bps);
                let expires_at = now + self.policy.order_expiry_minutes * 60_000;
                let rows = sqlx::query(
                    "UPDATE orders SET status = 'PENDING', denial_reason = NULL, commission_cents = ?1, expires_at = ?2, updated_at = ?3 WHERE id = ?4 AND status = 'PARTIALLY_DENIED'",
                )
                .bind(commission)
                .bind(expires_at)
                .bind(now)
                .bind(order_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::database(e.to_string()))?;

                if rows.rows_affected() == 0 {
                    tx.rollback()
                        .await
                        .map_err(|e| AppError::database(e.to_string()))?;
                    return Err(self.reject_transition(order_id, OrderStatus::Pending).await);
                }
                tx.commit()
                    .await
                    .map_err(|e| AppError::database(e.to_string()))?;
            }
        }

        let order = order_repo::get(&self.pool, order_id).await?;
        self.notifier
            .dispatch(StatusNotification::new(
                &order,
                format!("Order {} is now {}", order.display_number, order.status),
            ))
            .await;
        Ok(order)
    }

    /// Shopper answers a weight review: approve the adjusted totals or cancel
    pub async fn respond_to_weight_review(
        &self,
        order_id: i64,
        shopper: &CurrentUser,
        action: WeightReviewResponse,
    ) -> AppResult<Order> {
        let order = order_repo::get(&self.pool, order_id).await?;
        ensure_order_shopper(&order, shopper)?;

        let now = now_millis();
        let (sql, target) = match action {
            WeightReviewResponse::Approve => (
                "UPDATE orders SET status = 'PREPARING', updated_at = ?1 WHERE id = ?2 AND status = 'WEIGHT_REVIEW'",
                OrderStatus::Preparing,
            ),
            WeightReviewResponse::CancelOrder => (
                "UPDATE orders SET status = 'CANCELLED', cancelled_at = ?1, updated_at = ?1 WHERE id = ?2 AND status = 'WEIGHT_REVIEW'",
                OrderStatus::Cancelled,
            ),
        };
        let rows = sqlx::query(sql)
            .bind(now)
            .bind(order_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(e.to_string()))?;
        if rows.rows_affected() == 0 {
            return Err(self.reject_transition(order_id, target).await);
        }

        order_repo::get(&self.pool, order_id).await.map_err(Into::into)
    }

    /// Shopper self-cancel: PENDING always; ACCEPTED only within the grace
    /// window measured from creation time.
    pub async fn cancel(&self, order_id: i64, shopper: &CurrentUser) -> AppResult<Order> {
        let order = order_repo::get(&self.pool, order_id).await?;
        ensure_order_shopper(&order, shopper)?;

        let now = now_millis();
        match order.status {
            OrderStatus::Pending => {}
            OrderStatus::Accepted => {
                let grace_ms = self.policy.self_cancel_grace_minutes * 60_000;
                if now - order.created_at > grace_ms {
                    return Err(AppError::with_message(
                        ErrorCode::CancelWindowElapsed,
                        format!(
                            "Accepted orders can only be cancelled within {} minutes of creation",
                            self.policy.self_cancel_grace_minutes
                        ),
                    )
                    .with_detail("grace_minutes", self.policy.self_cancel_grace_minutes));
                }
            }
            _ => {
                return Err(self.reject_transition(order_id, OrderStatus::Cancelled).await);
            }
        }

        let rows = sqlx::query(
            "UPDATE orders SET status = 'CANCELLED', cancelled_at = ?1, updated_at = ?1 WHERE id = ?2 AND status = ?3",
        )
        .bind(now)
        .bind(order_id)
        .bind(order.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(e.to_string()))?;

        if rows.rows_affected() == 0 {
            return Err(self.reject_transition(order_id, OrderStatus::Cancelled).await);
        }

        let order = order_repo::get(&self.pool, order_id).await?;
        self.notifier
            .dispatch(StatusNotification::new(
                &order,
                format!("Order {} cancelled", order.display_number),
            ))
            .await;
        Ok(order)
    }

    /// Rate a picked-up order (once) and fold the score into the shop's
    /// running average; the order completes with the rating.
    pub async fn rate(
        &self,
        order_id: i64,
        shopper: &CurrentUser,
        score: i64,
        comment: Option<&str>,
    ) -> AppResult<Order> {
        if !(1..=5).contains(&score) {
            return Err(AppError::with_message(
                ErrorCode::ValueOutOfRange,
                "Rating must be between 1 and 5",
            ));
        }
        let order = order_repo::get(&self.pool, order_id).await?;
        ensure_order_shopper(&order, shopper)?;

        if order.rating_score.is_some() {
            return Err(AppError::new(ErrorCode::RatingAlreadySubmitted)
                .with_detail("order_id", order_id));
        }
        if !matches!(order.status, OrderStatus::PickedUp | OrderStatus::Completed) {
            return Err(self.reject_transition(order_id, OrderStatus::Completed).await);
        }

        let now = now_millis();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(e.to_string()))?;

        let rows = sqlx::query(
            "UPDATE orders SET rating_score = ?1, rating_comment = ?2, status = 'COMPLETED', updated_at = ?3 WHERE id = ?4 AND status IN ('PICKED_UP', 'COMPLETED') AND rating_score IS NULL",
        )
        .bind(score)
        .bind(comment)
        .bind(now)
        .bind(order_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::database(e.to_string()))?;

        if rows.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| AppError::database(e.to_string()))?;
            // Either a concurrent rating won, or the status is wrong
            let current = order_repo::get(&self.pool, order_id).await?;
            if current.rating_score.is_some() {
                return Err(AppError::new(ErrorCode::RatingAlreadySubmitted)
                    .with_detail("order_id", order_id));
            }
            return Err(self.reject_transition(order_id, OrderStatus::Completed).await);
        }

        // Incremental mean, rounded to 2 decimals, in one atomic statement
        sqlx::query(
            "UPDATE shop SET rating_avg = ROUND((rating_avg * rating_count + ?1) * 1.0 / (rating_count + 1), 2), rating_count = rating_count + 1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(score)
        .bind(now)
        .bind(order.shop_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| AppError::database(e.to_string()))?;

        order_repo::get(&self.pool, order_id).await.map_err(Into::into)
    }

    // =========================================================================
    // Sweeper entry point
    // =========================================================================

    /// PENDING → AUTO_CANCELLED once the stored expiry has passed. The expiry
    /// re-check rides in the UPDATE guard so the sweep uses the same primitive
    /// as every live transition; re-running it is a no-op.
    pub async fn auto_cancel(&self, order_id: i64) -> AppResult<bool> {
        let now = now_millis();
        let rows = sqlx::query(
            "UPDATE orders SET status = 'AUTO_CANCELLED', cancelled_at = ?1, updated_at = ?1 WHERE id = ?2 AND status = 'PENDING' AND expires_at < ?1",
        )
        .bind(now)
        .bind(order_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(e.to_string()))?;

        if rows.rows_affected() == 0 {
            return Ok(false);
        }

        let order = order_repo::get(&self.pool, order_id).await?;
        self.notifier
            .dispatch(StatusNotification::new(
                &order,
                format!(
                    "Order {} was cancelled automatically: the shop did not respond in time",
                    order.display_number
                ),
            ))
            .await;
        Ok(true)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Ownership-filtered order detail: the shopper (and platform admins)
    /// see the pickup token, shop staff do not.
    pub async fn detail(&self, order_id: i64, caller: &CurrentUser) -> AppResult<OrderDetail> {
        let order = order_repo::get(&self.pool, order_id).await?;

        if caller.is_admin() || order.shopper_id == caller.user_id {
            return self.detail_unfiltered(order_id).await;
        }
        // Shop staff may see their own shop's orders, minus the token
        self.ensure_shop_owner(&order, caller).await?;
        Ok(self.detail_unfiltered(order_id).await?.without_token())
    }

    /// Staff list of a shop's orders
    pub async fn list_for_shop(
        &self,
        shop_id: i64,
        staff: &CurrentUser,
        status: Option<OrderStatus>,
    ) -> AppResult<Vec<OrderSummary>> {
        self.authorize_shop_staff(shop_id, staff).await?;
        order_repo::list_for_shop(&self.pool, shop_id, status)
            .await
            .map_err(Into::into)
    }

    async fn detail_unfiltered(&self, order_id: i64) -> AppResult<OrderDetail> {
        let order = order_repo::get(&self.pool, order_id).await?;
        let lines = order_repo::lines(&self.pool, order_id).await?;
        Ok(OrderDetail { order, lines })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Simple guarded edge shared by the flag/resolve stock-issue pair
    async fn staff_transition(
        &self,
        order_id: i64,
        staff: &CurrentUser,
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> AppResult<Order> {
        let order = order_repo::get(&self.pool, order_id).await?;
        self.ensure_shop_owner(&order, staff).await?;

        let now = now_millis();
        let placeholders = vec!["?"; from.len()].join(", ");
        let sql = format!(
            "UPDATE orders SET status = ?, updated_at = ? WHERE id = ? AND status IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql).bind(to.as_str()).bind(now).bind(order_id);
        for status in from {
            query = query.bind(status.as_str());
        }
        let rows = query
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(e.to_string()))?;

        if rows.rows_affected() == 0 {
            return Err(self.reject_transition(order_id, to).await);
        }
        order_repo::get(&self.pool, order_id).await.map_err(Into::into)
    }

    /// Build the rejection for a failed conditional update
    async fn reject_transition(&self, order_id: i64, requested: OrderStatus) -> AppError {
        match order_repo::find_by_id(&self.pool, order_id).await {
            Ok(Some(order)) => AppError::invalid_transition(
                order.status,
                requested,
                order.status.allowed_transitions(),
            ),
            Ok(None) => AppError::new(ErrorCode::OrderNotFound).with_detail("order_id", order_id),
            Err(e) => e.into(),
        }
    }

    /// Estimator-derived minutes for an order about to be accepted
    async fn estimate_for(&self, order: &Order) -> AppResult<i64> {
        let shop = shop_repo::get(&self.pool, order.shop_id).await?;
        let active = order_repo::active_count(&self.pool, order.shop_id).await?;
        let item_count: i64 = order_repo::lines(&self.pool, order.id)
            .await?
            .iter()
            .filter(|l| l.available)
            .map(|l| l.quantity)
            .sum();
        Ok(prep_time::estimate_minutes(&PrepTimeInput {
            base_minutes: shop.base_prep_minutes,
            busy_mode: shop.busy_mode,
            busy_extra_minutes: shop.busy_extra_minutes,
            active_order_count: active,
            item_count,
        }))
    }

    /// Staff ownership check through the injected TTL cache
    async fn ensure_shop_owner(&self, order: &Order, staff: &CurrentUser) -> AppResult<()> {
        self.authorize_shop_staff(order.shop_id, staff).await
    }

    /// Caller must own the shop (or be a platform admin). Shared with the
    /// offer/product/shop handlers, which guard the same resource boundary.
    pub async fn authorize_shop_staff(&self, shop_id: i64, staff: &CurrentUser) -> AppResult<()> {
        if staff.is_admin() {
            return Ok(());
        }
        let owner = match self.owner_cache.get(&shop_id) {
            Some(owner) => owner,
            None => {
                let owner = shop_repo::owner_id(&self.pool, shop_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::new(ErrorCode::ShopNotFound).with_detail("shop_id", shop_id)
                    })?;
                self.owner_cache.insert(shop_id, owner);
                owner
            }
        };
        if owner != staff.user_id {
            return Err(AppError::new(ErrorCode::NotShopOwner).with_detail("shop_id", shop_id));
        }
        Ok(())
    }
}

/// Shopper ownership check
fn ensure_order_shopper(order: &Order, user: &CurrentUser) -> AppResult<()> {
    if user.is_admin() || order.shopper_id == user.user_id {
        Ok(())
    } else {
        Err(AppError::new(ErrorCode::NotOrderOwner).with_detail("order_id", order.id))
    }
}

/// Pickup token: short, unambiguous, generated once at acceptance
fn generate_pickup_token() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    (0..6)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}
