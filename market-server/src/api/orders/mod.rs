//! Order API Module
//!
//! Every mutation is a lifecycle transition; handlers stay thin and the
//! state machine enforces ownership and edges.

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

/// Order router
pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/orders", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        // Creation and queries
        .route("/", post(handler::create))
        .route("/{id}", get(handler::get_by_id))
        .route("/shop/{shop_id}", get(handler::list_for_shop))
        // Shop-side transitions
        .route("/{id}/accept", post(handler::accept))
        .route("/{id}/deny", post(handler::deny))
        .route("/{id}/stock-issue", post(handler::report_stock_issue))
        .route("/{id}/stock-issue/flag", post(handler::flag_stock_issue))
        .route("/{id}/stock-issue/resolve", post(handler::resolve_stock_issue))
        .route("/{id}/prepare", post(handler::start_preparing))
        .route("/{id}/ready", post(handler::mark_ready))
        .route("/{id}/weights", post(handler::record_weights))
        .route("/{id}/pickup", post(handler::confirm_pickup))
        .route("/{id}/verify-pickup", post(handler::verify_pickup))
        // Shopper-side transitions
        .route("/{id}/respond", post(handler::respond_to_partial_denial))
        .route("/{id}/weight-review", post(handler::respond_to_weight_review))
        .route("/{id}/cancel", post(handler::cancel))
        .route("/{id}/rate", post(handler::rate))
        // Machine callbacks
        .route("/{id}/payment-confirmed", post(handler::payment_confirmed))
}
