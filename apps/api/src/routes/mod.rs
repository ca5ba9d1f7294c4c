pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::conversation::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/messages", post(handlers::handle_message))
        .route("/api/v1/threads/:id", get(handlers::handle_get_thread))
        .with_state(state)
}
