//! Order Repository
//!
//! Reads plus the line-level mutations shared by the lifecycle transitions.
//! Status transitions themselves are written by the lifecycle module through
//! conditional updates; nothing here changes `status`.

use super::{RepoError, RepoResult};
use shared::models::{Order, OrderLine, OrderSummary};
use shared::order::OrderStatus;
use shared::util::now_millis;
use sqlx::{SqliteConnection, SqlitePool};

pub(crate) const ORDER_SELECT: &str = "SELECT id, shop_id, shopper_id, display_seq, display_number, status, total_cents, commission_cents, denial_reason, pickup_token, rating_score, rating_comment, estimated_ready_at, expires_at, created_at, accepted_at, ready_at, picked_up_at, cancelled_at, updated_at FROM orders";

const LINE_SELECT: &str = "SELECT id, order_id, product_id, name, pricing_kind, quantity, weight_grams, unit_price_cents, line_total_cents, available FROM order_line";

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Order>> {
    let sql = format!("{ORDER_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, Order>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn get(pool: &SqlitePool, id: i64) -> RepoResult<Order> {
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Order {id}")))
}

pub async fn lines(pool: &SqlitePool, order_id: i64) -> RepoResult<Vec<OrderLine>> {
    let sql = format!("{LINE_SELECT} WHERE order_id = ? ORDER BY id");
    let rows = sqlx::query_as::<_, OrderLine>(&sql)
        .bind(order_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn lines_tx(conn: &mut SqliteConnection, order_id: i64) -> RepoResult<Vec<OrderLine>> {
    let sql = format!("{LINE_SELECT} WHERE order_id = ? ORDER BY id");
    let rows = sqlx::query_as::<_, OrderLine>(&sql)
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(rows)
}

/// Staff list view, newest first
pub async fn list_for_shop(
    pool: &SqlitePool,
    shop_id: i64,
    status: Option<OrderStatus>,
) -> RepoResult<Vec<OrderSummary>> {
    let rows = match status {
        Some(status) => {
            sqlx::query_as::<_, OrderSummary>(
                "SELECT id, display_number, status, total_cents, estimated_ready_at, created_at FROM orders WHERE shop_id = ?1 AND status = ?2 ORDER BY created_at DESC",
            )
            .bind(shop_id)
            .bind(status.as_str())
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, OrderSummary>(
                "SELECT id, display_number, status, total_cents, estimated_ready_at, created_at FROM orders WHERE shop_id = ?1 ORDER BY created_at DESC",
            )
            .bind(shop_id)
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows)
}

/// Number of orders currently occupying the shop's kitchen
/// (ACCEPTED or PREPARING), the estimator's queue-depth input.
pub async fn active_count(pool: &SqlitePool, shop_id: i64) -> RepoResult<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM orders WHERE shop_id = ?1 AND status IN ('ACCEPTED', 'PREPARING')",
    )
    .bind(shop_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// PENDING orders whose expiry deadline has passed (sweep input)
pub async fn expired_pending(
    pool: &SqlitePool,
    now: i64,
    limit: i64,
) -> RepoResult<Vec<Order>> {
    let sql = format!(
        "{ORDER_SELECT} WHERE status = 'PENDING' AND expires_at < ?1 ORDER BY expires_at LIMIT ?2"
    );
    let rows = sqlx::query_as::<_, Order>(&sql)
        .bind(now)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Mark the lines of the given products unavailable; returns affected count
pub async fn mark_lines_unavailable(
    conn: &mut SqliteConnection,
    order_id: i64,
    product_ids: &[i64],
) -> RepoResult<u64> {
    if product_ids.is_empty() {
        return Ok(0);
    }
    let placeholders = vec!["?"; product_ids.len()].join(", ");
    let sql = format!(
        "UPDATE order_line SET available = 0 WHERE order_id = ? AND available = 1 AND product_id IN ({placeholders})"
    );
    let mut query = sqlx::query(&sql).bind(order_id);
    for id in product_ids {
        query = query.bind(id);
    }
    let rows = query.execute(conn).await?;
    Ok(rows.rows_affected())
}

/// Drop unavailable lines for good (shopper chose to continue)
pub async fn delete_unavailable_lines(
    conn: &mut SqliteConnection,
    order_id: i64,
) -> RepoResult<u64> {
    let rows = sqlx::query("DELETE FROM order_line WHERE order_id = ? AND available = 0")
        .bind(order_id)
        .execute(conn)
        .await?;
    Ok(rows.rows_affected())
}

/// Recompute the order total from its available lines, in the same
/// transaction as whatever changed the lines. Returns the new total.
pub async fn recompute_total(conn: &mut SqliteConnection, order_id: i64) -> RepoResult<i64> {
    let now = now_millis();
    sqlx::query(
        "UPDATE orders SET total_cents = (SELECT COALESCE(SUM(line_total_cents), 0) FROM order_line WHERE order_id = ?1 AND available = 1), updated_at = ?2 WHERE id = ?1",
    )
    .bind(order_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let total = sqlx::query_scalar::<_, i64>("SELECT total_cents FROM orders WHERE id = ?")
        .bind(order_id)
        .fetch_one(conn)
        .await?;
    Ok(total)
}

/// Rewrite one line's weight and total after weighing
pub async fn update_line_weight(
    conn: &mut SqliteConnection,
    line_id: i64,
    weight_grams: i64,
    line_total_cents: i64,
) -> RepoResult<()> {
    let rows = sqlx::query(
        "UPDATE order_line SET weight_grams = ?1, line_total_cents = ?2 WHERE id = ?3",
    )
    .bind(weight_grams)
    .bind(line_total_cents)
    .bind(line_id)
    .execute(conn)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Order line {line_id}")));
    }
    Ok(())
}
