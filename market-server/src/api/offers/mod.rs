//! Offer API Module
//!
//! Time-boxed discounted offers and their cart holds.

mod handler;

use axum::{
    Router,
    routing::{delete, post},
};

use crate::core::ServerState;

/// Offer router
pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/offers", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", post(handler::create))
        .route("/{id}/holds", post(handler::reserve))
        .route("/holds/{hold_id}", delete(handler::release))
}
