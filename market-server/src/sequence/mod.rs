//! 序号生成
//!
//! Gap-free, per-scope monotonic numbers backed by counter rows. Both paths
//! go through a single upsert-and-increment statement — the one place in the
//! system where a read-then-write would hand two callers the same value.

use crate::db::repository::RepoError;
use shared::error::{AppError, AppResult};
use shared::models::CustomerNumber;
use shared::util::{format_display_number, now_millis, today_utc};
use sqlx::{SqliteConnection, SqlitePool};

/// One issued daily order number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyNumber {
    /// Raw counter value (1-based)
    pub value: i64,
    /// Display form (`#007`)
    pub display: String,
}

/// Next daily order number for the (shop, UTC day) scope.
///
/// The counter row is created lazily on first issuance and rolls over each
/// day because the scope key includes the date. The upsert, increment and
/// read-back are one statement, so concurrent callers are serialized by the
/// database and never observe the same value.
///
/// Takes a connection so order creation can issue the number inside its own
/// transaction.
pub async fn next_daily_number(
    conn: &mut SqliteConnection,
    shop_id: i64,
) -> AppResult<DailyNumber> {
    let day = today_utc();
    let value = sqlx::query_scalar::<_, i64>(
        "INSERT INTO daily_counter (shop_id, day, last_value) VALUES (?1, ?2, 1) ON CONFLICT (shop_id, day) DO UPDATE SET last_value = last_value + 1 RETURNING last_value",
    )
    .bind(shop_id)
    .bind(&day)
    .fetch_one(conn)
    .await
    .map_err(|e| AppError::database(format!("Daily counter increment failed: {e}")))?;

    Ok(DailyNumber {
        value,
        display: format_display_number(value),
    })
}

/// Permanent customer number for a (shop, user) pair; idempotent.
///
/// An existing assignment is returned unchanged. Otherwise the per-shop
/// counter is incremented and the assignment inserted in one transaction;
/// when a concurrent caller wins the insert race the unique constraint fires,
/// the increment rolls back with the transaction (no gap) and the winner's
/// assignment is read back.
pub async fn next_customer_number(
    pool: &SqlitePool,
    shop_id: i64,
    user_id: i64,
) -> AppResult<CustomerNumber> {
    if let Some(existing) = find_assignment(pool, shop_id, user_id).await? {
        return Ok(existing);
    }

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::database(e.to_string()))?;

    let number = sqlx::query_scalar::<_, i64>(
        "INSERT INTO shop_counter (shop_id, last_value) VALUES (?1, 1) ON CONFLICT (shop_id) DO UPDATE SET last_value = last_value + 1 RETURNING last_value",
    )
    .bind(shop_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| AppError::database(format!("Customer counter increment failed: {e}")))?;

    let now = now_millis();
    let inserted = sqlx::query(
        "INSERT INTO customer_number (shop_id, user_id, number, assigned_at) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(shop_id)
    .bind(user_id)
    .bind(number)
    .bind(now)
    .execute(&mut *tx)
    .await;

    match inserted {
        Ok(_) => {
            tx.commit()
                .await
                .map_err(|e| AppError::database(e.to_string()))?;
            Ok(CustomerNumber {
                shop_id,
                user_id,
                number,
                assigned_at: now,
            })
        }
        Err(e) => {
            // Lost the race: roll the increment back and return the winner
            let repo_err = RepoError::from(e);
            tx.rollback()
                .await
                .map_err(|e| AppError::database(e.to_string()))?;
            if matches!(repo_err, RepoError::Duplicate(_)) {
                find_assignment(pool, shop_id, user_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::database("Customer number vanished after duplicate insert")
                    })
            } else {
                Err(repo_err.into())
            }
        }
    }
}

async fn find_assignment(
    pool: &SqlitePool,
    shop_id: i64,
    user_id: i64,
) -> AppResult<Option<CustomerNumber>> {
    sqlx::query_as::<_, CustomerNumber>(
        "SELECT shop_id, user_id, number, assigned_at FROM customer_number WHERE shop_id = ?1 AND user_id = ?2",
    )
    .bind(shop_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| AppError::database(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbService;
    use tempfile::TempDir;

    async fn test_pool() -> (TempDir, SqlitePool) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let db = DbService::new(path.to_str().unwrap()).await.unwrap();
        (dir, db.pool)
    }

    #[tokio::test]
    async fn test_daily_numbers_are_sequential() {
        let (_dir, pool) = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let first = next_daily_number(&mut conn, 1).await.unwrap();
        let second = next_daily_number(&mut conn, 1).await.unwrap();
        let third = next_daily_number(&mut conn, 1).await.unwrap();

        assert_eq!(first.value, 1);
        assert_eq!(second.value, 2);
        assert_eq!(third.value, 3);
        assert_eq!(first.display, "#001");
        assert_eq!(third.display, "#003");
    }

    #[tokio::test]
    async fn test_daily_numbers_scoped_per_shop() {
        let (_dir, pool) = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let a = next_daily_number(&mut conn, 1).await.unwrap();
        let b = next_daily_number(&mut conn, 2).await.unwrap();

        assert_eq!(a.value, 1);
        assert_eq!(b.value, 1, "each shop starts its own sequence");
    }

    #[tokio::test]
    async fn test_customer_number_idempotent() {
        let (_dir, pool) = test_pool().await;

        let first = next_customer_number(&pool, 1, 42).await.unwrap();
        let again = next_customer_number(&pool, 1, 42).await.unwrap();
        let other = next_customer_number(&pool, 1, 43).await.unwrap();

        assert_eq!(first.number, 1);
        assert_eq!(again.number, 1, "repeat request returns the assignment");
        assert_eq!(again.assigned_at, first.assigned_at);
        assert_eq!(other.number, 2);
    }

    #[tokio::test]
    async fn test_customer_numbers_scoped_per_shop() {
        let (_dir, pool) = test_pool().await;

        let a = next_customer_number(&pool, 1, 42).await.unwrap();
        let b = next_customer_number(&pool, 2, 42).await.unwrap();

        assert_eq!(a.number, 1);
        assert_eq!(b.number, 1);
    }
}
