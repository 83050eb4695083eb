//! Shop Repository

use super::{RepoError, RepoResult};
use shared::models::Shop;
use shared::util::now_millis;
use sqlx::SqlitePool;

const SHOP_SELECT: &str = "SELECT id, name, owner_id, is_open, pause_reason, paused_at, busy_mode, busy_extra_minutes, base_prep_minutes, commission_rate_bps, rating_avg, rating_count, created_at, updated_at FROM shop";

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Shop>> {
    let sql = format!("{SHOP_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, Shop>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn get(pool: &SqlitePool, id: i64) -> RepoResult<Shop> {
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Shop {id}")))
}

/// Owner lookup for permission checks (cached by the caller)
pub async fn owner_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<i64>> {
    let owner = sqlx::query_scalar::<_, i64>("SELECT owner_id FROM shop WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(owner)
}

pub async fn set_busy_mode(
    pool: &SqlitePool,
    id: i64,
    enabled: bool,
    extra_minutes: Option<i64>,
) -> RepoResult<Shop> {
    let now = now_millis();
    let rows = sqlx::query(
        "UPDATE shop SET busy_mode = ?1, busy_extra_minutes = COALESCE(?2, busy_extra_minutes), updated_at = ?3 WHERE id = ?4",
    )
    .bind(enabled)
    .bind(extra_minutes)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Shop {id}")));
    }
    get(pool, id).await
}

/// Close the shop with a reason (auto-pause path); no-op if already closed
pub async fn pause(pool: &SqlitePool, id: i64, reason: &str) -> RepoResult<bool> {
    let now = now_millis();
    let rows = sqlx::query(
        "UPDATE shop SET is_open = 0, pause_reason = ?1, paused_at = ?2, updated_at = ?2 WHERE id = ?3 AND is_open = 1",
    )
    .bind(reason)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(rows.rows_affected() > 0)
}

/// Reopen a paused shop
pub async fn reopen(pool: &SqlitePool, id: i64) -> RepoResult<Shop> {
    let now = now_millis();
    let rows = sqlx::query(
        "UPDATE shop SET is_open = 1, pause_reason = NULL, paused_at = NULL, updated_at = ?1 WHERE id = ?2",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Shop {id}")));
    }
    get(pool, id).await
}

/// Count a shop's recent auto-cancellations (auto-pause policy input)
pub async fn recent_auto_cancellations(
    pool: &SqlitePool,
    id: i64,
    since_millis: i64,
) -> RepoResult<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM orders WHERE shop_id = ?1 AND status = 'AUTO_CANCELLED' AND cancelled_at >= ?2",
    )
    .bind(id)
    .bind(since_millis)
    .fetch_one(pool)
    .await?;
    Ok(count)
}
