//! Product API Module
//!
//! Snooze (temporary unavailability) and promotion management. Catalog
//! browsing itself is served elsewhere.

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

/// Product router
pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/products", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/{id}", get(handler::get_by_id))
        .route("/{id}/snooze", post(handler::snooze).delete(handler::unsnooze))
        .route(
            "/{id}/promotion",
            post(handler::set_promotion).delete(handler::clear_promotion),
        )
}
