//! Order domain types
//!
//! - [`OrderStatus`]: the canonical status state machine
//! - Request/response types shared between server and clients

mod status;
mod types;

pub use status::{OrderStatus, UnknownStatus};
pub use types::{
    DenialResponse, OrderLineInput, PricingKind, WeightEntry, WeightReviewResponse,
};
