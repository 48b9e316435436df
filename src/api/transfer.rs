use crate::api::middleware::RequireAuth;
use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::models::{Provider, TransferRequest, TransferResult};
use axum::{
    body::Bytes,
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use std::sync::Arc;
use validator::Validate;

pub fn transfer_routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/transfer/:source/:destination/:playlist_id",
        post(transfer_playlist),
    )
}

async fn transfer_playlist(
    State(state): State<Arc<AppState>>,
    RequireAuth(claims): RequireAuth,
    Path((source, destination, playlist_id)): Path<(Provider, Provider, String)>,
    body: Bytes,
) -> Result<Json<TransferResult>> {
    let req = parse_request(&body)?;
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let result = state
        .transfer_service
        .transfer(
            claims.sub,
            source,
            destination,
            &playlist_id,
            req.title.as_deref(),
        )
        .await?;

    Ok(Json(result))
}

/// An empty body means "use the default title"; anything else must be valid JSON.
fn parse_request(body: &[u8]) -> Result<TransferRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(TransferRequest::default());
    }

    Json::<TransferRequest>::from_bytes(body)
        .map(|Json(req)| req)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_uses_default_title() {
        assert_eq!(parse_request(b"").unwrap().title, None);
        assert_eq!(parse_request(b" \n").unwrap().title, None);
    }

    #[test]
    fn test_body_must_be_a_transfer_request() {
        let req = parse_request(br#"{"title": "My Mix"}"#).unwrap();
        assert_eq!(req.title.as_deref(), Some("My Mix"));

        assert!(matches!(
            parse_request(br#"{"title": "My Mix""#),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            parse_request(br#"{"title": 42}"#),
            Err(AppError::Validation(_))
        ));
    }
}
