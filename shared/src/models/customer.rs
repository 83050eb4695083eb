//! Customer Number Model

use serde::{Deserialize, Serialize};

/// Permanent per-shop customer number assignment
///
/// Issued once per (shop, user) pair; repeated requests return the stored
/// assignment unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct CustomerNumber {
    pub shop_id: i64,
    pub user_id: i64,
    pub number: i64,
    pub assigned_at: i64,
}
