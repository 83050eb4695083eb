//! Concurrency properties of the hot shared counters
//!
//! The sequence generator and the hold manager are the two places where a
//! read-then-write race would corrupt state. These tests hammer both from
//! concurrent tasks against a real WAL database and assert the invariants
//! the conditional-update primitives must uphold.

use market_server::db::DbService;
use market_server::db::repository::offer as offer_repo;
use market_server::sequence;
use market_server::HoldManager;
use shared::error::ErrorCode;
use shared::models::OfferCreate;
use shared::util::now_millis;
use sqlx::SqlitePool;
use std::collections::HashSet;
use tempfile::TempDir;

const TASKS: usize = 24;

async fn test_pool() -> (TempDir, SqlitePool) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test.db");
    let db = DbService::new(path.to_str().unwrap()).await.unwrap();
    (dir, db.pool)
}

async fn seed_shop_and_product(pool: &SqlitePool) {
    let now = now_millis();
    sqlx::query(
        "INSERT INTO shop (id, name, owner_id, created_at, updated_at) VALUES (1, 'Frutas Pepe', 10, ?1, ?1)",
    )
    .bind(now)
    .execute(pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO product (id, shop_id, name, price_cents, created_at, updated_at) VALUES (5, 1, 'Fresas 500g', 350, ?1, ?1)",
    )
    .bind(now)
    .execute(pool)
    .await
    .unwrap();
}

/// N concurrent daily-number requests on one scope: all distinct, contiguous
/// from 1, no duplicates.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_daily_numbers_are_unique_and_contiguous() {
    let (_dir, pool) = test_pool().await;

    let mut handles = Vec::new();
    for _ in 0..TASKS {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let mut conn = pool.acquire().await.unwrap();
            sequence::next_daily_number(&mut conn, 1).await.unwrap().value
        }));
    }

    let mut values = Vec::new();
    for handle in handles {
        values.push(handle.await.unwrap());
    }

    let unique: HashSet<i64> = values.iter().copied().collect();
    assert_eq!(unique.len(), TASKS, "every caller got a distinct number");

    let max = *values.iter().max().unwrap();
    let min = *values.iter().min().unwrap();
    assert_eq!(min, 1, "sequence starts at 1");
    assert_eq!(max, TASKS as i64, "sequence is contiguous, no gaps");
}

/// Concurrent customer-number requests for the same user are idempotent, and
/// different users never share a number.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_customer_numbers_are_stable_per_user() {
    let (_dir, pool) = test_pool().await;

    let mut handles = Vec::new();
    for i in 0..TASKS {
        let pool = pool.clone();
        // Half the tasks race on user 42, half take distinct users
        let user_id = if i % 2 == 0 { 42 } else { 100 + i as i64 };
        handles.push(tokio::spawn(async move {
            let assigned = sequence::next_customer_number(&pool, 1, user_id)
                .await
                .unwrap();
            (user_id, assigned.number)
        }));
    }

    let mut per_user: std::collections::HashMap<i64, HashSet<i64>> = Default::default();
    for handle in handles {
        let (user_id, number) = handle.await.unwrap();
        per_user.entry(user_id).or_default().insert(number);
    }

    // Racing requests for the same user all saw one number
    assert_eq!(per_user.get(&42).unwrap().len(), 1);

    // No two users share a number
    let mut all: Vec<i64> = per_user
        .values()
        .flat_map(|set| set.iter().copied())
        .collect();
    all.sort_unstable();
    let distinct: HashSet<i64> = all.iter().copied().collect();
    assert_eq!(distinct.len(), per_user.len());
}

/// For an offer with R remaining, concurrent reservations never oversell:
/// the sum of granted quantities stays within R.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_reservations_never_oversell() {
    let (_dir, pool) = test_pool().await;
    seed_shop_and_product(&pool).await;

    const REMAINING: i64 = 10;
    let now = now_millis();
    let offer = offer_repo::create(
        &pool,
        1,
        OfferCreate {
            product_id: 5,
            price_cents: 200,
            total_qty: REMAINING,
            starts_at: now - 1_000,
            expires_at: now + 3_600_000,
        },
    )
    .await
    .unwrap();

    let mut handles = Vec::new();
    for i in 0..TASKS {
        let holds = HoldManager::new(pool.clone(), 10);
        let offer_id = offer.id;
        let quantity = 1 + (i as i64 % 2); // mix of 1s and 2s
        handles.push(tokio::spawn(async move {
            match holds.reserve(offer_id, quantity).await {
                Ok(hold) => Ok(hold.quantity),
                Err(e) => Err(e.code),
            }
        }));
    }

    let mut granted: i64 = 0;
    let mut rejections = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(quantity) => granted += quantity,
            Err(code) => {
                assert_eq!(code, ErrorCode::StockInsufficient);
                rejections += 1;
            }
        }
    }

    assert!(
        granted <= REMAINING,
        "granted {granted} exceeds remaining {REMAINING}"
    );
    assert!(rejections > 0, "demand exceeded supply, someone must lose");

    let offer = offer_repo::get(&pool, offer.id).await.unwrap();
    assert_eq!(offer.reserved_in_cart, granted);
    assert!(offer.reserved_in_cart <= offer.remaining_qty);
}
