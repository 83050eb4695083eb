//! Offer Repository
//!
//! Plain reads and creation; the reserve/release/consume mutations live in
//! the inventory module because they pair the offer counters with hold rows.

use super::{RepoError, RepoResult};
use shared::models::{Offer, OfferCreate, OfferHold};
use shared::util::{now_millis, snowflake_id};
use sqlx::SqlitePool;

const OFFER_SELECT: &str = "SELECT id, shop_id, product_id, price_cents, total_qty, remaining_qty, reserved_in_cart, starts_at, expires_at, created_at FROM offer";

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Offer>> {
    let sql = format!("{OFFER_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, Offer>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn get(pool: &SqlitePool, id: i64) -> RepoResult<Offer> {
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Offer {id}")))
}

pub async fn create(pool: &SqlitePool, shop_id: i64, data: OfferCreate) -> RepoResult<Offer> {
    let now = now_millis();
    let id = snowflake_id();
    sqlx::query(
        "INSERT INTO offer (id, shop_id, product_id, price_cents, total_qty, remaining_qty, reserved_in_cart, starts_at, expires_at, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?5, 0, ?6, ?7, ?8)",
    )
    .bind(id)
    .bind(shop_id)
    .bind(data.product_id)
    .bind(data.price_cents)
    .bind(data.total_qty)
    .bind(data.starts_at)
    .bind(data.expires_at)
    .bind(now)
    .execute(pool)
    .await?;
    get(pool, id).await
}

pub async fn find_hold(pool: &SqlitePool, hold_id: i64) -> RepoResult<Option<OfferHold>> {
    let row = sqlx::query_as::<_, OfferHold>(
        "SELECT id, offer_id, quantity, created_at, expires_at FROM offer_hold WHERE id = ?",
    )
    .bind(hold_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Holds past their expiry, oldest first (sweep input)
pub async fn expired_holds(pool: &SqlitePool, now: i64, limit: i64) -> RepoResult<Vec<OfferHold>> {
    let rows = sqlx::query_as::<_, OfferHold>(
        "SELECT id, offer_id, quantity, created_at, expires_at FROM offer_hold WHERE expires_at < ?1 ORDER BY expires_at LIMIT ?2",
    )
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
