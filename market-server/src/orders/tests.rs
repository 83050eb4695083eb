//! Lifecycle scenario tests
//!
//! Each test drives the real service against a temp SQLite database, the way
//! requests would: nothing reaches around the public operations.

use super::{LifecyclePolicy, OrderLifecycle};
use crate::auth::{CurrentUser, Role};
use crate::db::DbService;
use crate::db::repository::{order as order_repo, product as product_repo, shop as shop_repo};
use crate::notify::test_support::RecordingNotifier;
use crate::utils::TtlCache;
use shared::error::ErrorCode;
use shared::models::{Order, OrderCreate, OrderDetail};
use shared::order::{
    DenialResponse, OrderLineInput, OrderStatus, WeightEntry, WeightReviewResponse,
};
use shared::util::now_millis;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const SHOP_ID: i64 = 1;
const OWNER_ID: i64 = 10;
const SHOPPER_ID: i64 = 20;
const BREAD: i64 = 101; // UNIT, 1500
const CAKE: i64 = 102; // UNIT, 2700
const CHEESE: i64 = 103; // WEIGHT, 1280 / kg

struct Rig {
    _dir: TempDir,
    pool: SqlitePool,
    lifecycle: OrderLifecycle,
    notifier: Arc<RecordingNotifier>,
}

fn shopper() -> CurrentUser {
    CurrentUser {
        user_id: SHOPPER_ID,
        name: "Ana".into(),
        role: Role::Shopper,
    }
}

fn staff() -> CurrentUser {
    CurrentUser {
        user_id: OWNER_ID,
        name: "Pepe".into(),
        role: Role::ShopStaff,
    }
}

fn stranger() -> CurrentUser {
    CurrentUser {
        user_id: 999,
        name: "Eve".into(),
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
        "INSERT INTO shop (id, name, owner_id, commission_rate_bps, base_prep_minutes, created_at, updated_at) VALUES (?1, 'Horno Real', ?2, 1000, 10, ?3, ?3)",
    )
    .bind(SHOP_ID)
    .bind(OWNER_ID)
    .bind(now)
    .execute(&pool)
    .await
    .unwrap();
    for (id, name, kind, price) in [
        (BREAD, "Pan de pueblo", "UNIT", 1500_i64),
        (CAKE, "Tarta de queso", "UNIT", 2700),
        (CHEESE, "Queso curado", "WEIGHT", 1280),
    ] {
        sqlx::query(
            "INSERT INTO product (id, shop_id, name, pricing_kind, price_cents, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        )
        .bind(id)
        .bind(SHOP_ID)
        .bind(name)
        .bind(kind)
        .bind(price)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();
    }

    let notifier = Arc::new(RecordingNotifier::default());
    let lifecycle = OrderLifecycle::new(
        pool.clone(),
        LifecyclePolicy::default(),
        notifier.clone(),
        Arc::new(TtlCache::new(64, Duration::from_secs(60))),
    );

    Rig {
        _dir: dir,
        pool,
        lifecycle,
        notifier,
    }
}

fn unit_line(product_id: i64, quantity: i64) -> OrderLineInput {
    OrderLineInput {
        product_id,
        quantity,
        weight_grams: None,
        hold_id: None,
    }
}

async fn place_two_line_order(rig: &Rig) -> OrderDetail {
    rig.lifecycle
        .create(
            &shopper(),
            OrderCreate {
                shop_id: SHOP_ID,
                lines: vec![unit_line(BREAD, 1), unit_line(CAKE, 1)],
            },
        )
        .await
        .unwrap()
}

async fn total_matches_available_lines(pool: &SqlitePool, order: &Order) {
    let lines = order_repo::lines(pool, order.id).await.unwrap();
    let expected: i64 = lines
        .iter()
        .filter(|l| l.available)
        .map(|l| l.line_total_cents)
        .sum();
    assert_eq!(
        order.total_cents, expected,
        "total must equal the sum of available line totals"
    );
}

// =============================================================================
// Creation
// =============================================================================

#[tokio::test]
async fn test_create_computes_totals_and_display_number() {
    let rig = rig().await;
    let detail = place_two_line_order(&rig).await;

    assert_eq!(detail.order.status, OrderStatus::Pending);
    assert_eq!(detail.order.total_cents, 4200);
    assert_eq!(detail.order.commission_cents, 420);
    assert_eq!(detail.order.display_number, "#001");
    assert_eq!(detail.lines.len(), 2);
    assert!(detail.order.pickup_token.is_none(), "token comes at acceptance");
    assert!(detail.order.expires_at > detail.order.created_at);
    total_matches_available_lines(&rig.pool, &detail.order).await;

    let second = place_two_line_order(&rig).await;
    assert_eq!(second.order.display_number, "#002");
}

#[tokio::test]
async fn test_create_rejects_out_of_stock_product() {
    let rig = rig().await;
    product_repo::set_snooze(
        &rig.pool,
        BREAD,
        shared::models::SnoozeKind::Indefinite,
        None,
        Some("oven broke"),
    )
    .await
    .unwrap();

    let err = rig
        .lifecycle
        .create(
            &shopper(),
            OrderCreate {
                shop_id: SHOP_ID,
                lines: vec![unit_line(BREAD, 1)],
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ProductOutOfStock);
}

#[tokio::test]
async fn test_create_rejects_foreign_product() {
    let rig = rig().await;
    let now = now_millis();
    sqlx::query(
        "INSERT INTO shop (id, name, owner_id, created_at, updated_at) VALUES (2, 'Otra', 11, ?1, ?1)",
    )
    .bind(now)
    .execute(&rig.pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO product (id, shop_id, name, price_cents, created_at, updated_at) VALUES (201, 2, 'Ajeno', 100, ?1, ?1)",
    )
    .bind(now)
    .execute(&rig.pool)
    .await
    .unwrap();

    let err = rig
        .lifecycle
        .create(
            &shopper(),
            OrderCreate {
                shop_id: SHOP_ID,
                lines: vec![unit_line(201, 1)],
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ProductNotInShop);
}

#[tokio::test]
async fn test_create_weight_priced_line() {
    let rig = rig().await;
    let detail = rig
        .lifecycle
        .create(
            &shopper(),
            OrderCreate {
                shop_id: SHOP_ID,
                lines: vec![OrderLineInput {
                    product_id: CHEESE,
                    quantity: 1,
                    weight_grams: Some(250),
                    hold_id: None,
                }],
            },
        )
        .await
        .unwrap();
    // 250 g at 12.80/kg
    assert_eq!(detail.order.total_cents, 320);
}

// =============================================================================
// Accept / deny / pickup chain
// =============================================================================

#[tokio::test]
async fn test_accept_generates_token_and_eta() {
    let rig = rig().await;
    let order = place_two_line_order(&rig).await.order;

    let accepted = rig.lifecycle.accept(order.id, &staff(), Some(20)).await.unwrap();
    assert_eq!(accepted.status, OrderStatus::Accepted);
    let token = accepted.pickup_token.clone().expect("token generated");
    assert_eq!(token.len(), 6);
    let eta = accepted.estimated_ready_at.unwrap();
    assert!(eta > accepted.accepted_at.unwrap());

    // Estimator path: second order, no explicit estimate
    let other = place_two_line_order(&rig).await.order;
    let accepted2 = rig.lifecycle.accept(other.id, &staff(), None).await.unwrap();
    assert!(accepted2.estimated_ready_at.is_some());
}

#[tokio::test]
async fn test_accept_rejected_for_non_owner() {
    let rig = rig().await;
    let order = place_two_line_order(&rig).await.order;

    let err = rig
        .lifecycle
        .accept(order.id, &stranger(), None)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotShopOwner);
}

#[tokio::test]
async fn test_double_accept_rejected_with_allowed_set() {
    let rig = rig().await;
    let order = place_two_line_order(&rig).await.order;
    rig.lifecycle.accept(order.id, &staff(), None).await.unwrap();

    let err = rig
        .lifecycle
        .accept(order.id, &staff(), None)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidTransition);
    assert!(err.message.contains("ACCEPTED"));
    assert!(err.message.contains("PREPARING"), "names the allowed set");
}

#[tokio::test]
async fn test_full_happy_path_to_completed() {
    let rig = rig().await;
    let order = place_two_line_order(&rig).await.order;

    let order = rig.lifecycle.accept(order.id, &staff(), Some(15)).await.unwrap();
    let order = rig
        .lifecycle
        .start_preparing(order.id, &staff(), None)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Preparing);

    let order = rig.lifecycle.mark_ready(order.id, &staff()).await.unwrap();
    assert_eq!(order.status, OrderStatus::Ready);
    assert!(order.ready_at.is_some());

    let token = order.pickup_token.clone().unwrap();
    let order = rig
        .lifecycle
        .confirm_pickup(order.id, &staff(), &token)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::PickedUp);

    let order = rig
        .lifecycle
        .rate(order.id, &shopper(), 5, Some("perfecto"))
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.rating_score, Some(5));

    let shop = shop_repo::get(&rig.pool, SHOP_ID).await.unwrap();
    assert_eq!(shop.rating_count, 1);
    assert!((shop.rating_avg - 5.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_wrong_pickup_token_leaves_order_ready() {
    let rig = rig().await;
    let order = place_two_line_order(&rig).await.order;
    rig.lifecycle.accept(order.id, &staff(), None).await.unwrap();
    rig.lifecycle.mark_ready(order.id, &staff()).await.unwrap();

    let err = rig
        .lifecycle
        .confirm_pickup(order.id, &staff(), "WRONG1")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::PickupTokenMismatch);

    let current = order_repo::get(&rig.pool, order.id).await.unwrap();
    assert_eq!(current.status, OrderStatus::Ready, "status unchanged");

    assert!(
        !rig.lifecycle
            .verify_pickup(order.id, &staff(), "WRONG1")
            .await
            .unwrap()
    );
    let token = current.pickup_token.unwrap();
    assert!(
        rig.lifecycle
            .verify_pickup(order.id, &staff(), &token)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_estimated_ready_extends_from_current_value() {
    let rig = rig().await;
    let order = place_two_line_order(&rig).await.order;
    let order = rig.lifecycle.accept(order.id, &staff(), Some(10)).await.unwrap();
    let initial_eta = order.estimated_ready_at.unwrap();

    let order = rig
        .lifecycle
        .start_preparing(order.id, &staff(), Some(5))
        .await
        .unwrap();
    assert_eq!(order.estimated_ready_at.unwrap(), initial_eta + 5 * 60_000);

    // Repeated delays accumulate
    let order = rig
        .lifecycle
        .start_preparing(order.id, &staff(), Some(5))
        .await
        .unwrap();
    assert_eq!(order.estimated_ready_at.unwrap(), initial_eta + 10 * 60_000);
}

// =============================================================================
// Denial and recovery
// =============================================================================

#[tokio::test]
async fn test_deny_records_reason() {
    let rig = rig().await;
    let order = place_two_line_order(&rig).await.order;
    let order = rig
        .lifecycle
        .deny(order.id, &staff(), "Closing early today")
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Denied);
    assert_eq!(order.denial_reason.as_deref(), Some("Closing early today"));
}

/// The §8 scenario: 4200 → stock issue on the 1500 line → 2700 partially
/// denied → continue → one line, 2700, PENDING again.
#[tokio::test]
async fn test_partial_denial_continue_flow() {
    let rig = rig().await;
    let order = place_two_line_order(&rig).await.order;
    assert_eq!(order.total_cents, 4200);

    let order = rig
        .lifecycle
        .report_stock_issue(order.id, &staff(), &[BREAD])
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::PartiallyDenied);
    assert_eq!(order.total_cents, 2700);
    assert!(order.denial_reason.is_some());
    total_matches_available_lines(&rig.pool, &order).await;

    // The reported product left the shelf in the same transaction
    let bread = product_repo::get(&rig.pool, BREAD).await.unwrap();
    assert!(!bread.in_stock);

    let order = rig
        .lifecycle
        .respond_to_partial_denial(order.id, &shopper(), DenialResponse::Continue)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total_cents, 2700);
    assert!(order.denial_reason.is_none());

    let lines = order_repo::lines(&rig.pool, order.id).await.unwrap();
    assert_eq!(lines.len(), 1, "unavailable lines are deleted for good");
    assert_eq!(lines[0].product_id, CAKE);
}

#[tokio::test]
async fn test_partial_denial_cancel_flow() {
    let rig = rig().await;
    let order = place_two_line_order(&rig).await.order;
    rig.lifecycle
        .report_stock_issue(order.id, &staff(), &[BREAD])
        .await
        .unwrap();

    let order = rig
        .lifecycle
        .respond_to_partial_denial(order.id, &shopper(), DenialResponse::CancelOrder)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert!(order.cancelled_at.is_some());
}

#[tokio::test]
async fn test_stock_issue_on_all_lines_denies() {
    let rig = rig().await;
    let order = place_two_line_order(&rig).await.order;
    let order = rig
        .lifecycle
        .report_stock_issue(order.id, &staff(), &[BREAD, CAKE])
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Denied);
    assert_eq!(order.total_cents, 0);
}

#[tokio::test]
async fn test_stock_issue_requires_matching_lines() {
    let rig = rig().await;
    let order = place_two_line_order(&rig).await.order;
    let err = rig
        .lifecycle
        .report_stock_issue(order.id, &staff(), &[CHEESE])
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NoMatchingLines);

    let current = order_repo::get(&rig.pool, order.id).await.unwrap();
    assert_eq!(current.status, OrderStatus::Pending);
    assert_eq!(current.total_cents, 4200, "rollback left totals intact");
}

#[tokio::test]
async fn test_respond_twice_rejected() {
    let rig = rig().await;
    let order = place_two_line_order(&rig).await.order;
    rig.lifecycle
        .report_stock_issue(order.id, &staff(), &[BREAD])
        .await
        .unwrap();
    rig.lifecycle
        .respond_to_partial_denial(order.id, &shopper(), DenialResponse::Continue)
        .await
        .unwrap();

    let err = rig
        .lifecycle
        .respond_to_partial_denial(order.id, &shopper(), DenialResponse::Continue)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidTransition);
}

#[tokio::test]
async fn test_mid_prep_stock_issue_pause_and_resume() {
    let rig = rig().await;
    let order = place_two_line_order(&rig).await.order;
    rig.lifecycle.accept(order.id, &staff(), None).await.unwrap();
    rig.lifecycle
        .start_preparing(order.id, &staff(), None)
        .await
        .unwrap();

    let order = rig.lifecycle.flag_stock_issue(order.id, &staff()).await.unwrap();
    assert_eq!(order.status, OrderStatus::StockIssue);

    let order = rig
        .lifecycle
        .resolve_stock_issue(order.id, &staff())
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Preparing);
}

// =============================================================================
// Self-cancel window
// =============================================================================

#[tokio::test]
async fn test_cancel_pending_always_allowed() {
    let rig = rig().await;
    let order = place_two_line_order(&rig).await.order;
    let order = rig.lifecycle.cancel(order.id, &shopper()).await.unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_cancel_accepted_within_grace() {
    let rig = rig().await;
    let order = place_two_line_order(&rig).await.order;
    rig.lifecycle.accept(order.id, &staff(), None).await.unwrap();

    let order = rig.lifecycle.cancel(order.id, &shopper()).await.unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_cancel_accepted_after_grace_rejected() {
    let rig = rig().await;
    let order = place_two_line_order(&rig).await.order;
    rig.lifecycle.accept(order.id, &staff(), None).await.unwrap();

    // Backdate creation by six minutes
    sqlx::query("UPDATE orders SET created_at = created_at - 360000 WHERE id = ?")
        .bind(order.id)
        .execute(&rig.pool)
        .await
        .unwrap();

    let err = rig.lifecycle.cancel(order.id, &shopper()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::CancelWindowElapsed);
    assert!(err.message.contains("5 minutes"), "names the grace window");

    let current = order_repo::get(&rig.pool, order.id).await.unwrap();
    assert_eq!(current.status, OrderStatus::Accepted);
}

#[tokio::test]
async fn test_cancel_by_other_shopper_forbidden() {
    let rig = rig().await;
    let order = place_two_line_order(&rig).await.order;
    let err = rig.lifecycle.cancel(order.id, &stranger()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::NotOrderOwner);
}

// =============================================================================
// Rating
// =============================================================================

#[tokio::test]
async fn test_double_rating_conflicts() {
    let rig = rig().await;
    let order = place_two_line_order(&rig).await.order;
    rig.lifecycle.accept(order.id, &staff(), None).await.unwrap();
    rig.lifecycle.mark_ready(order.id, &staff()).await.unwrap();
    let token = order_repo::get(&rig.pool, order.id)
        .await
        .unwrap()
        .pickup_token
        .unwrap();
    rig.lifecycle
        .confirm_pickup(order.id, &staff(), &token)
        .await
        .unwrap();

    rig.lifecycle.rate(order.id, &shopper(), 4, None).await.unwrap();
    let err = rig
        .lifecycle
        .rate(order.id, &shopper(), 5, None)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::RatingAlreadySubmitted);

    let shop = shop_repo::get(&rig.pool, SHOP_ID).await.unwrap();
    assert_eq!(shop.rating_count, 1, "second rating never lands");
}

#[tokio::test]
async fn test_rating_updates_running_average() {
    let rig = rig().await;

    for score in [4_i64, 5, 2] {
        let order = place_two_line_order(&rig).await.order;
        rig.lifecycle.accept(order.id, &staff(), None).await.unwrap();
        rig.lifecycle.mark_ready(order.id, &staff()).await.unwrap();
        let token = order_repo::get(&rig.pool, order.id)
            .await
            .unwrap()
            .pickup_token
            .unwrap();
        rig.lifecycle
            .confirm_pickup(order.id, &staff(), &token)
            .await
            .unwrap();
        rig.lifecycle.rate(order.id, &shopper(), score, None).await.unwrap();
    }

    let shop = shop_repo::get(&rig.pool, SHOP_ID).await.unwrap();
    assert_eq!(shop.rating_count, 3);
    // (4 + 5 + 2) / 3 = 3.666... -> 3.67
    assert!((shop.rating_avg - 3.67).abs() < 1e-3);
}

#[tokio::test]
async fn test_rating_requires_pickup() {
    let rig = rig().await;
    let order = place_two_line_order(&rig).await.order;
    let err = rig
        .lifecycle
        .rate(order.id, &shopper(), 5, None)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidTransition);
}

#[tokio::test]
async fn test_rating_score_bounds() {
    let rig = rig().await;
    let order = place_two_line_order(&rig).await.order;
    for bad in [0_i64, 6, -1] {
        let err = rig
            .lifecycle
            .rate(order.id, &shopper(), bad, None)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValueOutOfRange);
    }
}

// =============================================================================
// Payment confirmation
// =============================================================================

#[tokio::test]
async fn test_payment_confirmation_advances_once() {
    let rig = rig().await;
    let order = place_two_line_order(&rig).await.order;

    let advanced = rig.lifecycle.confirm_payment(order.id).await.unwrap();
    assert_eq!(advanced.status, OrderStatus::Accepted);
    let token = advanced.pickup_token.clone().unwrap();

    // Duplicate delivery is a no-op: same status, same token
    let again = rig.lifecycle.confirm_payment(order.id).await.unwrap();
    assert_eq!(again.status, OrderStatus::Accepted);
    assert_eq!(again.pickup_token.as_deref(), Some(token.as_str()));
    assert_eq!(again.accepted_at, advanced.accepted_at);
}

// =============================================================================
// Weighing sub-path
// =============================================================================

async fn weighed_order(rig: &Rig) -> Order {
    let detail = rig
        .lifecycle
        .create(
            &shopper(),
            OrderCreate {
                shop_id: SHOP_ID,
                lines: vec![OrderLineInput {
                    product_id: CHEESE,
                    quantity: 1,
                    weight_grams: Some(200),
                    hold_id: None,
                }],
            },
        )
        .await
        .unwrap();
    rig.lifecycle
        .accept(detail.order.id, &staff(), None)
        .await
        .unwrap();
    rig.lifecycle
        .start_preparing(detail.order.id, &staff(), None)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_small_weight_adjustment_applies_directly() {
    let rig = rig().await;
    let order = weighed_order(&rig).await;
    let line = order_repo::lines(&rig.pool, order.id).await.unwrap()[0].clone();

    // 210 g on a 200 g order: within 10%
    let order = rig
        .lifecycle
        .record_weights(
            order.id,
            &staff(),
            &[WeightEntry {
                line_id: line.id,
                weight_grams: 210,
            }],
        )
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Preparing);
    // round(210/1000 * 1280) = 269
    assert_eq!(order.total_cents, 269);
    total_matches_available_lines(&rig.pool, &order).await;
}

#[tokio::test]
async fn test_large_weight_adjustment_needs_approval() {
    let rig = rig().await;
    let order = weighed_order(&rig).await;
    let line = order_repo::lines(&rig.pool, order.id).await.unwrap()[0].clone();

    // 260 g on a 200 g order: 30% over
    let order = rig
        .lifecycle
        .record_weights(
            order.id,
            &staff(),
            &[WeightEntry {
                line_id: line.id,
                weight_grams: 260,
            }],
        )
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::WeightReview);

    let order = rig
        .lifecycle
        .respond_to_weight_review(order.id, &shopper(), WeightReviewResponse::Approve)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Preparing);
    assert_eq!(order.total_cents, 333); // round(260/1000 * 1280)
}

#[tokio::test]
async fn test_weight_review_cancel() {
    let rig = rig().await;
    let order = weighed_order(&rig).await;
    let line = order_repo::lines(&rig.pool, order.id).await.unwrap()[0].clone();

    rig.lifecycle
        .record_weights(
            order.id,
            &staff(),
            &[WeightEntry {
                line_id: line.id,
                weight_grams: 300,
            }],
        )
        .await
        .unwrap();
    let order = rig
        .lifecycle
        .respond_to_weight_review(order.id, &shopper(), WeightReviewResponse::CancelOrder)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_weights_rejected_for_unit_lines() {
    let rig = rig().await;
    let order = place_two_line_order(&rig).await.order;
    rig.lifecycle.accept(order.id, &staff(), None).await.unwrap();
    rig.lifecycle
        .start_preparing(order.id, &staff(), None)
        .await
        .unwrap();
    let line = order_repo::lines(&rig.pool, order.id).await.unwrap()[0].clone();

    let err = rig
        .lifecycle
        .record_weights(
            order.id,
            &staff(),
            &[WeightEntry {
                line_id: line.id,
                weight_grams: 500,
            }],
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ValidationFailed);
}

// =============================================================================
// Auto-cancel (sweeper primitive)
// =============================================================================

#[tokio::test]
async fn test_auto_cancel_only_after_expiry() {
    let rig = rig().await;
    let order = place_two_line_order(&rig).await.order;

    // Not yet expired: no-op
    assert!(!rig.lifecycle.auto_cancel(order.id).await.unwrap());

    sqlx::query("UPDATE orders SET expires_at = ?1 WHERE id = ?2")
        .bind(now_millis() - 1)
        .bind(order.id)
        .execute(&rig.pool)
        .await
        .unwrap();

    assert!(rig.lifecycle.auto_cancel(order.id).await.unwrap());
    let current = order_repo::get(&rig.pool, order.id).await.unwrap();
    assert_eq!(current.status, OrderStatus::AutoCancelled);

    // Idempotent: a second pass changes nothing
    assert!(!rig.lifecycle.auto_cancel(order.id).await.unwrap());
}

// =============================================================================
// Queries and notifications
// =============================================================================

#[tokio::test]
async fn test_detail_filters_token_by_role() {
    let rig = rig().await;
    let order = place_two_line_order(&rig).await.order;
    rig.lifecycle.accept(order.id, &staff(), None).await.unwrap();

    let shopper_view = rig.lifecycle.detail(order.id, &shopper()).await.unwrap();
    assert!(shopper_view.order.pickup_token.is_some());

    let staff_view = rig.lifecycle.detail(order.id, &staff()).await.unwrap();
    assert!(staff_view.order.pickup_token.is_none());

    let err = rig.lifecycle.detail(order.id, &stranger()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::NotShopOwner);
}

#[tokio::test]
async fn test_transitions_dispatch_notifications() {
    let rig = rig().await;
    let order = place_two_line_order(&rig).await.order;
    rig.lifecycle.accept(order.id, &staff(), None).await.unwrap();
    rig.lifecycle.mark_ready(order.id, &staff()).await.unwrap();

    let seen = rig.notifier.seen.lock().unwrap();
    let statuses: Vec<OrderStatus> = seen.iter().map(|n| n.status).collect();
    assert!(statuses.contains(&OrderStatus::Pending));
    assert!(statuses.contains(&OrderStatus::Accepted));
    assert!(statuses.contains(&OrderStatus::Ready));
}
