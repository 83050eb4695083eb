//! 库存锁定
//!
//! Short-lived cart holds against limited-quantity offers. The availability
//! check and the counter increment are one conditional UPDATE so two
//! concurrent reservations can never oversell; everything else (hold row,
//! release, consumption) rides in the same transaction as that update.

use crate::db::repository::offer as offer_repo;
use shared::error::{AppError, AppResult, ErrorCode};
use shared::models::OfferHold;
use shared::util::{now_millis, snowflake_id};
use sqlx::{SqliteConnection, SqlitePool};

/// Inventory hold manager
#[derive(Clone)]
pub struct HoldManager {
    pool: SqlitePool,
    hold_minutes: i64,
}

impl HoldManager {
    pub fn new(pool: SqlitePool, hold_minutes: i64) -> Self {
        Self { pool, hold_minutes }
    }

    /// Reserve `quantity` against an offer.
    ///
    /// Fails with OfferExpired past the offer window and StockInsufficient
    /// (carrying the available quantity) when the ask exceeds
    /// `remaining_qty - reserved_in_cart`. The guard and the increment are
    /// evaluated as one atomic statement against the persisted counters.
    pub async fn reserve(&self, offer_id: i64, quantity: i64) -> AppResult<OfferHold> {
        if quantity <= 0 {
            return Err(AppError::validation("Quantity must be positive"));
        }

        let now = now_millis();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(e.to_string()))?;

        let granted = sqlx::query(
            "UPDATE offer SET reserved_in_cart = reserved_in_cart + ?1 WHERE id = ?2 AND starts_at <= ?3 AND expires_at > ?3 AND remaining_qty - reserved_in_cart >= ?1",
        )
        .bind(quantity)
        .bind(offer_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::database(e.to_string()))?;

        if granted.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| AppError::database(e.to_string()))?;
            return Err(self.diagnose_rejection(offer_id, quantity, now).await);
        }

        let hold = OfferHold {
            id: snowflake_id(),
            offer_id,
            quantity,
            created_at: now,
            expires_at: now + self.hold_minutes * 60_000,
        };
        sqlx::query(
            "INSERT INTO offer_hold (id, offer_id, quantity, created_at, expires_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(hold.id)
        .bind(hold.offer_id)
        .bind(hold.quantity)
        .bind(hold.created_at)
        .bind(hold.expires_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| AppError::database(e.to_string()))?;

        tracing::debug!(
            offer_id,
            hold_id = hold.id,
            quantity,
            "Granted offer hold"
        );
        Ok(hold)
    }

    /// Work out which guard failed, for an actionable error
    async fn diagnose_rejection(&self, offer_id: i64, quantity: i64, now: i64) -> AppError {
        match offer_repo::find_by_id(&self.pool, offer_id).await {
            Ok(Some(offer)) if offer.expires_at <= now || offer.starts_at > now => {
                AppError::offer_expired(offer_id)
            }
            Ok(Some(offer)) => AppError::stock_insufficient(quantity, offer.available_qty()),
            Ok(None) => AppError::new(ErrorCode::OfferNotFound).with_detail("offer_id", offer_id),
            Err(e) => e.into(),
        }
    }

    /// Explicitly release a hold (cart abandoned)
    pub async fn release(&self, hold_id: i64) -> AppResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(e.to_string()))?;

        let released = release_in_tx(&mut tx, hold_id)
            .await
            .map_err(|e| AppError::database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| AppError::database(e.to_string()))?;

        if released {
            Ok(())
        } else {
            Err(AppError::new(ErrorCode::HoldNotFound).with_detail("hold_id", hold_id))
        }
    }

    /// Consume a hold into an order: quantity leaves the offer for good.
    /// Runs inside the order-creation transaction.
    pub async fn consume(conn: &mut SqliteConnection, hold_id: i64, now: i64) -> AppResult<()> {
        let hold = sqlx::query_as::<_, OfferHold>(
            "DELETE FROM offer_hold WHERE id = ?1 RETURNING id, offer_id, quantity, created_at, expires_at",
        )
        .bind(hold_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::database(e.to_string()))?
        .ok_or_else(|| AppError::new(ErrorCode::HoldNotFound).with_detail("hold_id", hold_id))?;

        if hold.expires_at < now {
            // The sweep may not have caught it yet; treat as released
            sqlx::query(
                "UPDATE offer SET reserved_in_cart = MAX(reserved_in_cart - ?1, 0) WHERE id = ?2",
            )
            .bind(hold.quantity)
            .bind(hold.offer_id)
            .execute(conn)
            .await
            .map_err(|e| AppError::database(e.to_string()))?;
            return Err(AppError::new(ErrorCode::HoldExpired).with_detail("hold_id", hold_id));
        }

        sqlx::query(
            "UPDATE offer SET remaining_qty = remaining_qty - ?1, reserved_in_cart = MAX(reserved_in_cart - ?1, 0) WHERE id = ?2 AND remaining_qty >= ?1",
        )
        .bind(hold.quantity)
        .bind(hold.offer_id)
        .execute(conn)
        .await
        .map_err(|e| AppError::database(e.to_string()))?;
        Ok(())
    }
}

/// Delete a hold and hand its quantity back to the offer. Shared by explicit
/// release and the expiry sweep so both run the same primitive.
pub(crate) async fn release_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    hold_id: i64,
) -> Result<bool, sqlx::Error> {
    let hold = sqlx::query_as::<_, OfferHold>(
        "DELETE FROM offer_hold WHERE id = ?1 RETURNING id, offer_id, quantity, created_at, expires_at",
    )
    .bind(hold_id)
    .fetch_optional(&mut **tx)
    .await?;

    let Some(hold) = hold else {
        return Ok(false);
    };

    sqlx::query("UPDATE offer SET reserved_in_cart = MAX(reserved_in_cart - ?1, 0) WHERE id = ?2")
        .bind(hold.quantity)
        .bind(hold.offer_id)
        .execute(&mut **tx)
        .await?;
    Ok(true)
}
