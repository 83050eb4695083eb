//! Sweep API Module
//!
//! Idempotent reconciliation triggers for the external scheduler. All routes
//! require the shared service credential.

mod handler;

use axum::{Router, routing::post};

use crate::core::ServerState;

/// Sweep router
pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/sweeps", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/expired-orders", post(handler::expired_orders))
        .route("/product-snoozes", post(handler::product_snoozes))
        .route("/stale-promotions", post(handler::stale_promotions))
        .route("/expired-holds", post(handler::expired_holds))
}
