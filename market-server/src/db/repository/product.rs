//! Product Repository

use super::{RepoError, RepoResult};
use shared::models::{Product, SnoozeKind};
use shared::util::now_millis;
use sqlx::{SqliteConnection, SqlitePool};

const PRODUCT_SELECT: &str = "SELECT id, shop_id, name, pricing_kind, price_cents, in_stock, snooze_kind, snooze_started_at, snooze_until, snooze_reason, promo_price_cents, promo_ends_at, created_at, updated_at FROM product";

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Product>> {
    let sql = format!("{PRODUCT_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, Product>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn get(pool: &SqlitePool, id: i64) -> RepoResult<Product> {
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Product {id}")))
}

/// Load several products at once (order creation validates all lines)
pub async fn find_by_ids(pool: &SqlitePool, ids: &[i64]) -> RepoResult<Vec<Product>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!("{PRODUCT_SELECT} WHERE id IN ({placeholders})");
    let mut query = sqlx::query_as::<_, Product>(&sql);
    for id in ids {
        query = query.bind(id);
    }
    Ok(query.fetch_all(pool).await?)
}

/// Apply a snooze window; `until` is NULL for indefinite snoozes.
/// Snoozing always takes the product out of stock in the same statement.
pub async fn set_snooze(
    pool: &SqlitePool,
    id: i64,
    kind: SnoozeKind,
    until: Option<i64>,
    reason: Option<&str>,
) -> RepoResult<Product> {
    let now = now_millis();
    let rows = sqlx::query(
        "UPDATE product SET snooze_kind = ?1, snooze_started_at = ?2, snooze_until = ?3, snooze_reason = ?4, in_stock = 0, updated_at = ?2 WHERE id = ?5",
    )
    .bind(kind)
    .bind(now)
    .bind(until)
    .bind(reason)
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Product {id}")));
    }
    get(pool, id).await
}

/// Lift a snooze and put the product back on the shelf
pub async fn clear_snooze(pool: &SqlitePool, id: i64) -> RepoResult<Product> {
    let now = now_millis();
    let rows = sqlx::query(
        "UPDATE product SET snooze_kind = 'NONE', snooze_started_at = NULL, snooze_until = NULL, snooze_reason = NULL, in_stock = 1, updated_at = ?1 WHERE id = ?2",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Product {id}")));
    }
    get(pool, id).await
}

/// Start a promotion; the sweep clears it once `ends_at` passes
pub async fn set_promotion(
    pool: &SqlitePool,
    id: i64,
    price_cents: i64,
    ends_at: i64,
) -> RepoResult<Product> {
    let now = now_millis();
    let rows = sqlx::query(
        "UPDATE product SET promo_price_cents = ?1, promo_ends_at = ?2, updated_at = ?3 WHERE id = ?4",
    )
    .bind(price_cents)
    .bind(ends_at)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Product {id}")));
    }
    get(pool, id).await
}

/// End a promotion early
pub async fn clear_promotion(pool: &SqlitePool, id: i64) -> RepoResult<Product> {
    let now = now_millis();
    let rows = sqlx::query(
        "UPDATE product SET promo_price_cents = NULL, promo_ends_at = NULL, updated_at = ?1 WHERE id = ?2",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Product {id}")));
    }
    get(pool, id).await
}

/// Flip products out of stock inside a stock-issue transaction
pub async fn mark_out_of_stock(
    conn: &mut SqliteConnection,
    product_ids: &[i64],
) -> RepoResult<u64> {
    if product_ids.is_empty() {
        return Ok(0);
    }
    let now = now_millis();
    let placeholders = vec!["?"; product_ids.len()].join(", ");
    let sql = format!("UPDATE product SET in_stock = 0, updated_at = ? WHERE id IN ({placeholders})");
    let mut query = sqlx::query(&sql).bind(now);
    for id in product_ids {
        query = query.bind(id);
    }
    let rows = query.execute(conn).await?;
    Ok(rows.rows_affected())
}
