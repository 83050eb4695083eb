//! Shop API Module

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

/// Shop router
pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/shops", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/{id}", get(handler::get_by_id))
        .route("/{id}/busy-mode", post(handler::set_busy_mode))
        .route("/{id}/reopen", post(handler::reopen))
        .route("/{id}/customer-number", post(handler::customer_number))
}
