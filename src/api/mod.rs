pub mod middleware;
pub mod playlists;
pub mod transfer;

use crate::services::{AuthService, TransferService};
use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;

pub use playlists::playlist_routes;
pub use transfer::transfer_routes;

pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub transfer_service: Arc<TransferService>,
}

/// All `/api` routes, without the outer middleware stack.
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new().nest(
        "/api",
        Router::new()
            .route("/health", get(health))
            .merge(playlist_routes())
            .merge(transfer_routes())
            .with_state(state),
    )
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
