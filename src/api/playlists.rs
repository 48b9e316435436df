use crate::api::middleware::RequireAuth;
use crate::api::AppState;
use crate::error::Result;
use crate::models::{PlaylistSummary, Provider};
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use std::sync::Arc;

pub fn playlist_routes() -> Router<Arc<AppState>> {
    Router::new().route("/:provider/playlists", get(list_playlists))
}

async fn list_playlists(
    State(state): State<Arc<AppState>>,
    RequireAuth(claims): RequireAuth,
    Path(provider): Path<Provider>,
) -> Result<Json<Vec<PlaylistSummary>>> {
    let playlists = state
        .transfer_service
        .list_playlists(claims.sub, provider)
        .await?;
    Ok(Json(playlists))
}
