//! 对账清扫
//!
//! Idempotent, time-triggered reconciliation procedures. There is no internal
//! scheduler: an external periodic caller hits the sweep endpoints, each of
//! which reports how many records it touched. Every procedure reuses the
//! conditional-update primitives of the live paths, so running a sweep
//! concurrently with user traffic (or with itself) cannot double-apply
//! anything; per-record failures are logged and skipped.

use crate::db::repository::{offer as offer_repo, order as order_repo, shop as shop_repo};
use crate::inventory;
use crate::orders::OrderLifecycle;
use serde::Serialize;
use shared::error::{AppError, AppResult};
use shared::util::now_millis;
use sqlx::SqlitePool;

/// Batch ceiling per invocation; the next periodic run picks up the rest
const SWEEP_BATCH_LIMIT: i64 = 500;

/// Outcome of one sweep invocation
#[derive(Debug, Clone, Copy, Serialize, Default)]
pub struct SweepOutcome {
    /// Candidate records examined
    pub scanned: u64,
    /// Records actually changed
    pub affected: u64,
}

/// Auto-pause policy knobs
#[derive(Debug, Clone)]
pub struct SweepPolicy {
    /// Auto-cancellations within the window that close a shop
    pub auto_pause_threshold: i64,
    pub auto_pause_window_minutes: i64,
}

impl Default for SweepPolicy {
    fn default() -> Self {
        Self {
            auto_pause_threshold: 3,
            auto_pause_window_minutes: 60,
        }
    }
}

/// The reconciliation sweeper
#[derive(Clone)]
pub struct Sweeper {
    pool: SqlitePool,
    policy: SweepPolicy,
    lifecycle: OrderLifecycle,
}

impl Sweeper {
    pub fn new(pool: SqlitePool, policy: SweepPolicy, lifecycle: OrderLifecycle) -> Self {
        Self {
            pool,
            policy,
            lifecycle,
        }
    }

    /// PENDING orders past their stored expiry become AUTO_CANCELLED.
    ///
    /// Each cancellation goes through the lifecycle manager's guarded
    /// transition, then the order's shop gets an auto-pause check: shops
    /// accumulating auto-cancellations are taken offline until staff return.
    pub async fn auto_cancel_expired_orders(&self) -> AppResult<SweepOutcome> {
        let now = now_millis();
        let candidates = order_repo::expired_pending(&self.pool, now, SWEEP_BATCH_LIMIT).await?;

        let mut outcome = SweepOutcome {
            scanned: candidates.len() as u64,
            affected: 0,
        };
        for order in candidates {
            match self.lifecycle.auto_cancel(order.id).await {
                Ok(true) => {
                    outcome.affected += 1;
                    if let Err(e) = self.check_auto_pause(order.shop_id).await {
                        tracing::warn!(
                            shop_id = order.shop_id,
                            error = %e,
                            "Auto-pause check failed"
                        );
                    }
                }
                // Someone advanced it between the scan and the update
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(order_id = order.id, error = %e, "Auto-cancel failed, skipping");
                }
            }
        }

        if outcome.affected > 0 {
            tracing::info!(
                affected = outcome.affected,
                scanned = outcome.scanned,
                "Auto-cancelled expired orders"
            );
        }
        Ok(outcome)
    }

    /// Put products back on the shelf once a timed snooze has run out.
    /// Indefinite snoozes and unexpired windows are never touched.
    pub async fn unsnooze_expired_products(&self) -> AppResult<SweepOutcome> {
        let now = now_millis();
        let rows = sqlx::query(
            "UPDATE product SET snooze_kind = 'NONE', snooze_started_at = NULL, snooze_until = NULL, snooze_reason = NULL, in_stock = 1, updated_at = ?1 WHERE snooze_kind IN ('PRESET', 'CUSTOM') AND snooze_until IS NOT NULL AND snooze_until < ?1",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(e.to_string()))?;

        let affected = rows.rows_affected();
        if affected > 0 {
            tracing::info!(affected, "Released expired product snoozes");
        }
        Ok(SweepOutcome {
            scanned: affected,
            affected,
        })
    }

    /// Clear promotional pricing whose end time has passed
    pub async fn expire_stale_promotions(&self) -> AppResult<SweepOutcome> {
        let now = now_millis();
        let rows = sqlx::query(
            "UPDATE product SET promo_price_cents = NULL, promo_ends_at = NULL, updated_at = ?1 WHERE promo_ends_at IS NOT NULL AND promo_ends_at < ?1",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(e.to_string()))?;

        let affected = rows.rows_affected();
        if affected > 0 {
            tracing::info!(affected, "Expired stale promotions");
        }
        Ok(SweepOutcome {
            scanned: affected,
            affected,
        })
    }

    /// Hand reserved quantity back for holds past their expiry window.
    ///
    /// Runs the same delete-and-decrement transaction as an explicit release,
    /// one hold at a time so a single poisoned record cannot wedge the batch.
    pub async fn release_expired_holds(&self) -> AppResult<SweepOutcome> {
        let now = now_millis();
        let expired = offer_repo::expired_holds(&self.pool, now, SWEEP_BATCH_LIMIT).await?;

        let mut outcome = SweepOutcome {
            scanned: expired.len() as u64,
            affected: 0,
        };
        for hold in expired {
            let released = async {
                let mut tx = self.pool.begin().await?;
                let released = inventory::release_in_tx(&mut tx, hold.id).await?;
                tx.commit().await?;
                Ok::<bool, sqlx::Error>(released)
            }
            .await;

            match released {
                Ok(true) => outcome.affected += 1,
                // Raced an explicit release or a consume; already resolved
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(hold_id = hold.id, error = %e, "Hold release failed, skipping");
                }
            }
        }

        if outcome.affected > 0 {
            tracing::info!(
                affected = outcome.affected,
                scanned = outcome.scanned,
                "Released expired offer holds"
            );
        }
        Ok(outcome)
    }

    /// Close a shop that keeps letting orders expire. The thresholds are
    /// platform policy; this is only the trigger point.
    async fn check_auto_pause(&self, shop_id: i64) -> AppResult<()> {
        let since = now_millis() - self.policy.auto_pause_window_minutes * 60_000;
        let recent = shop_repo::recent_auto_cancellations(&self.pool, shop_id, since).await?;
        if recent < self.policy.auto_pause_threshold {
            return Ok(());
        }

        let paused = shop_repo::pause(
            &self.pool,
            shop_id,
            "Automatically paused: too many unanswered orders",
        )
        .await?;
        if paused {
            tracing::warn!(
                shop_id,
                recent_auto_cancellations = recent,
                "Shop auto-paused"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CurrentUser, Role};
    use crate::db::DbService;
    use crate::db::repository::product as product_repo;
    use crate::inventory::HoldManager;
    use crate::notify::test_support::RecordingNotifier;
    use crate::orders::LifecyclePolicy;
    use crate::utils::TtlCache;
    use shared::models::{OfferCreate, OrderCreate, SnoozeKind};
    use shared::order::{OrderLineInput, OrderStatus};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    const SHOP_ID: i64 = 1;

    struct Rig {
        _dir: TempDir,
        pool: SqlitePool,
        lifecycle: OrderLifecycle,
        sweeper: Sweeper,
    }

    fn shopper() -> CurrentUser {
        CurrentUser {
            user_id: 20,
            name: "Ana".into(),
            role: Role::Shopper,
        }
    }

    async fn rig() -> Rig {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let db = DbService::new(path.to_str().unwrap()).await.unwrap();
        let pool = db.pool;

        let now = now_millis();
        sqlx::query(
            "INSERT INTO shop (id, name, owner_id, created_at, updated_at) VALUES (?1, 'Horno Real', 10, ?2, ?2)",
        )
        .bind(SHOP_ID)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO product (id, shop_id, name, price_cents, created_at, updated_at) VALUES (101, ?1, 'Pan', 450, ?2, ?2)",
        )
        .bind(SHOP_ID)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();

        let lifecycle = OrderLifecycle::new(
            pool.clone(),
            LifecyclePolicy::default(),
            Arc::new(RecordingNotifier::default()),
            Arc::new(TtlCache::new(64, Duration::from_secs(60))),
        );
        let sweeper = Sweeper::new(
            pool.clone(),
            SweepPolicy {
                auto_pause_threshold: 2,
                auto_pause_window_minutes: 60,
            },
            lifecycle.clone(),
        );

        Rig {
            _dir: dir,
            pool,
            lifecycle,
            sweeper,
        }
    }

    async fn pending_order(rig: &Rig) -> i64 {
        let detail = rig
            .lifecycle
            .create(
                &shopper(),
                OrderCreate {
                    shop_id: SHOP_ID,
                    lines: vec![OrderLineInput {
                        product_id: 101,
                        quantity: 1,
                        weight_grams: None,
                        hold_id: None,
                    }],
                },
            )
            .await
            .unwrap();
        detail.order.id
    }

    async fn expire_order(pool: &SqlitePool, order_id: i64) {
        sqlx::query("UPDATE orders SET expires_at = ?1 WHERE id = ?2")
            .bind(now_millis() - 1)
            .bind(order_id)
            .execute(pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_auto_cancel_sweep_is_idempotent() {
        let rig = rig().await;
        let expired = pending_order(&rig).await;
        let fresh = pending_order(&rig).await;
        expire_order(&rig.pool, expired).await;

        let outcome = rig.sweeper.auto_cancel_expired_orders().await.unwrap();
        assert_eq!(outcome.affected, 1);

        let status = order_repo::get(&rig.pool, expired).await.unwrap().status;
        assert_eq!(status, OrderStatus::AutoCancelled);
        let status = order_repo::get(&rig.pool, fresh).await.unwrap().status;
        assert_eq!(status, OrderStatus::Pending, "unexpired order untouched");

        // Second run with nothing to do affects zero records
        let outcome = rig.sweeper.auto_cancel_expired_orders().await.unwrap();
        assert_eq!(outcome.affected, 0);
    }

    #[tokio::test]
    async fn test_auto_cancel_triggers_shop_auto_pause() {
        let rig = rig().await;
        let first = pending_order(&rig).await;
        let second = pending_order(&rig).await;
        expire_order(&rig.pool, first).await;
        expire_order(&rig.pool, second).await;

        let outcome = rig.sweeper.auto_cancel_expired_orders().await.unwrap();
        assert_eq!(outcome.affected, 2);

        let shop = shop_repo::get(&rig.pool, SHOP_ID).await.unwrap();
        assert!(!shop.is_open, "threshold reached: shop auto-paused");
        assert!(shop.pause_reason.is_some());
        assert!(shop.paused_at.is_some());
    }

    #[tokio::test]
    async fn test_unsnooze_sweep_respects_indefinite() {
        let rig = rig().await;
        let now = now_millis();
        // Expired timed snooze
        sqlx::query(
            "UPDATE product SET snooze_kind = 'PRESET', snooze_started_at = ?1, snooze_until = ?2, in_stock = 0 WHERE id = 101",
        )
        .bind(now - 7_200_000)
        .bind(now - 3_600_000)
        .execute(&rig.pool)
        .await
        .unwrap();
        // Indefinite snooze on a second product
        sqlx::query(
            "INSERT INTO product (id, shop_id, name, price_cents, in_stock, snooze_kind, snooze_started_at, created_at, updated_at) VALUES (102, ?1, 'Tarta', 2700, 0, 'INDEFINITE', ?2, ?2, ?2)",
        )
        .bind(SHOP_ID)
        .bind(now)
        .execute(&rig.pool)
        .await
        .unwrap();
        // Unexpired timed snooze on a third
        sqlx::query(
            "INSERT INTO product (id, shop_id, name, price_cents, in_stock, snooze_kind, snooze_started_at, snooze_until, created_at, updated_at) VALUES (103, ?1, 'Queso', 1280, 0, 'CUSTOM', ?2, ?3, ?2, ?2)",
        )
        .bind(SHOP_ID)
        .bind(now)
        .bind(now + 3_600_000)
        .execute(&rig.pool)
        .await
        .unwrap();

        let outcome = rig.sweeper.unsnooze_expired_products().await.unwrap();
        assert_eq!(outcome.affected, 1);

        let released = product_repo::get(&rig.pool, 101).await.unwrap();
        assert!(released.in_stock);
        assert_eq!(released.snooze_kind, SnoozeKind::None);

        let indefinite = product_repo::get(&rig.pool, 102).await.unwrap();
        assert!(!indefinite.in_stock, "indefinite snooze never auto-released");
        let unexpired = product_repo::get(&rig.pool, 103).await.unwrap();
        assert!(!unexpired.in_stock, "future snooze never auto-released");

        // Idempotent
        let outcome = rig.sweeper.unsnooze_expired_products().await.unwrap();
        assert_eq!(outcome.affected, 0);
    }

    #[tokio::test]
    async fn test_promotion_sweep() {
        let rig = rig().await;
        let now = now_millis();
        product_repo::set_promotion(&rig.pool, 101, 300, now + 3_600_000)
            .await
            .unwrap();
        // Force it stale
        sqlx::query("UPDATE product SET promo_ends_at = ?1 WHERE id = 101")
            .bind(now - 1)
            .execute(&rig.pool)
            .await
            .unwrap();

        let outcome = rig.sweeper.expire_stale_promotions().await.unwrap();
        assert_eq!(outcome.affected, 1);

        let product = product_repo::get(&rig.pool, 101).await.unwrap();
        assert_eq!(product.promo_price_cents, None);
        assert_eq!(product.promo_ends_at, None);

        let outcome = rig.sweeper.expire_stale_promotions().await.unwrap();
        assert_eq!(outcome.affected, 0);
    }

    #[tokio::test]
    async fn test_expired_hold_sweep_returns_quantity() {
        let rig = rig().await;
        let now = now_millis();
        let offer = offer_repo::create(
            &rig.pool,
            SHOP_ID,
            OfferCreate {
                product_id: 101,
                price_cents: 300,
                total_qty: 5,
                starts_at: now - 1_000,
                expires_at: now + 3_600_000,
            },
        )
        .await
        .unwrap();

        let holds = HoldManager::new(rig.pool.clone(), 10);
        let hold = holds.reserve(offer.id, 3).await.unwrap();

        // Nothing expired yet
        let outcome = rig.sweeper.release_expired_holds().await.unwrap();
        assert_eq!(outcome.affected, 0);

        sqlx::query("UPDATE offer_hold SET expires_at = ?1 WHERE id = ?2")
            .bind(now - 1)
            .bind(hold.id)
            .execute(&rig.pool)
            .await
            .unwrap();

        let outcome = rig.sweeper.release_expired_holds().await.unwrap();
        assert_eq!(outcome.affected, 1);

        let offer = offer_repo::get(&rig.pool, offer.id).await.unwrap();
        assert_eq!(offer.reserved_in_cart, 0, "quantity handed back");
        assert_eq!(offer.remaining_qty, 5, "expiry never burns quantity");

        let outcome = rig.sweeper.release_expired_holds().await.unwrap();
        assert_eq!(outcome.affected, 0, "idempotent");
    }
}
