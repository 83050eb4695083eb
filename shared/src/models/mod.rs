//! Database models and API payloads
//!
//! Plain data structs mapped 1:1 onto the SQLite schema. Row types derive
//! `sqlx::FromRow` behind the `db` feature so clients can depend on this
//! crate without pulling in the database stack.

mod customer;
mod offer;
mod order;
mod product;
mod shop;

pub use customer::CustomerNumber;
pub use offer::{Offer, OfferCreate, OfferHold, ReserveRequest};
pub use order::{Order, OrderCreate, OrderDetail, OrderLine, OrderSummary};
pub use product::{Product, SnoozeKind, SnoozeRequest};
pub use shop::{BusyModeUpdate, Shop};
