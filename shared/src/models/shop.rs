//! Shop Model

use serde::{Deserialize, Serialize};

/// Shop entity
///
/// `rating_avg` carries two decimal places; it is only ever rewritten through
/// the atomic incremental-mean update on the rating path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Shop {
    pub id: i64,
    pub name: String,
    /// Staff account that owns this shop
    pub owner_id: i64,
    pub is_open: bool,
    pub pause_reason: Option<String>,
    pub paused_at: Option<i64>,
    /// Manually flagged rush period; adds `busy_extra_minutes` to estimates
    pub busy_mode: bool,
    pub busy_extra_minutes: i64,
    pub base_prep_minutes: i64,
    /// Platform commission in basis points (1/100 of a percent)
    pub commission_rate_bps: i64,
    pub rating_avg: f64,
    pub rating_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Busy-mode toggle payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusyModeUpdate {
    pub enabled: bool,
    /// Replaces the stored extra minutes when present
    pub extra_minutes: Option<i64>,
}
