//! 订单状态机
//!
//! Single source of truth for the click-and-collect order lifecycle. Every
//! persisted transition is guarded against this edge set; a request whose
//! source status does not match fails with a rejection naming the current
//! status and its allowed targets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order lifecycle status
///
/// ```text
/// PENDING ──► ACCEPTED ──► PREPARING ──► READY ──► PICKED_UP ──► COMPLETED
///    │            │         │  ▲  │
///    │            │         │  │  ├──► STOCK_ISSUE ──► PREPARING
///    │            │         │  │  └──► WEIGHT_REVIEW ─► PREPARING
///    │            │         └──┼─────► PARTIALLY_DENIED ─► PENDING
///    ├──► DENIED  └── (grace) CANCELLED
///    └──► AUTO_CANCELLED
/// ```
///
/// Terminal: CANCELLED, AUTO_CANCELLED, DENIED, COMPLETED.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Awaiting shop decision; auto-cancelled once the expiry passes
    Pending,
    /// Shop committed; pickup token exists from here on
    Accepted,
    /// Being prepared
    Preparing,
    /// Mid-prep shortage the shop resolves itself
    StockIssue,
    /// Some lines denied; shopper must continue or cancel
    PartiallyDenied,
    /// Weight adjustment above threshold; shopper must approve or cancel
    WeightReview,
    /// Ready for pickup
    Ready,
    /// Handed over after token verification
    PickedUp,
    /// Rated or administratively closed
    Completed,
    /// Cancelled by shopper (or shop through denial recovery)
    Cancelled,
    /// Cancelled by the reconciliation sweep after expiry
    AutoCancelled,
    /// Denied by the shop
    Denied,
}

impl OrderStatus {
    /// All statuses, in rough lifecycle order
    pub const ALL: [OrderStatus; 12] = [
        OrderStatus::Pending,
        OrderStatus::Accepted,
        OrderStatus::Preparing,
        OrderStatus::StockIssue,
        OrderStatus::PartiallyDenied,
        OrderStatus::WeightReview,
        OrderStatus::Ready,
        OrderStatus::PickedUp,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::AutoCancelled,
        OrderStatus::Denied,
    ];

    /// Database / wire representation (SCREAMING_SNAKE_CASE)
    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Accepted => "ACCEPTED",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::StockIssue => "STOCK_ISSUE",
            OrderStatus::PartiallyDenied => "PARTIALLY_DENIED",
            OrderStatus::WeightReview => "WEIGHT_REVIEW",
            OrderStatus::Ready => "READY",
            OrderStatus::PickedUp => "PICKED_UP",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::AutoCancelled => "AUTO_CANCELLED",
            OrderStatus::Denied => "DENIED",
        }
    }

    /// Statuses this one may transition to
    pub const fn allowed_transitions(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[
                OrderStatus::Accepted,
                OrderStatus::Cancelled,
                OrderStatus::AutoCancelled,
                OrderStatus::Denied,
                OrderStatus::PartiallyDenied,
            ],
            OrderStatus::Accepted => &[
                OrderStatus::Preparing,
                OrderStatus::Ready,
                OrderStatus::Cancelled,
            ],
            OrderStatus::Preparing => &[
                OrderStatus::Ready,
                OrderStatus::PartiallyDenied,
                OrderStatus::Denied,
                OrderStatus::StockIssue,
                OrderStatus::WeightReview,
                OrderStatus::Cancelled,
            ],
            OrderStatus::StockIssue => &[OrderStatus::Preparing, OrderStatus::Cancelled],
            OrderStatus::PartiallyDenied => &[OrderStatus::Pending, OrderStatus::Cancelled],
            OrderStatus::WeightReview => &[OrderStatus::Preparing, OrderStatus::Cancelled],
            OrderStatus::Ready => &[OrderStatus::PickedUp],
            OrderStatus::PickedUp => &[OrderStatus::Completed],
            OrderStatus::Completed
            | OrderStatus::Cancelled
            | OrderStatus::AutoCancelled
            | OrderStatus::Denied => &[],
        }
    }

    /// Whether `self -> to` is a declared edge
    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }

    /// Terminal statuses admit no further transitions
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed
                | OrderStatus::Cancelled
                | OrderStatus::AutoCancelled
                | OrderStatus::Denied
        )
    }

    /// Statuses counted towards a shop's active load (prep-time estimation)
    pub const fn is_active_load(&self) -> bool {
        matches!(self, OrderStatus::Accepted | OrderStatus::Preparing)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for unknown status strings coming from storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown order status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}
