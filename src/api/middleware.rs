use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::services::auth::Claims;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use std::sync::Arc;

/// Name of the session cookie set by the login flow.
const SESSION_COOKIE: &str = "access_token";

pub struct RequireAuth(pub Claims);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireAuth {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self> {
        // Authorization header first, then the session cookie
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .or_else(|| {
                parts
                    .headers
                    .get_all(header::COOKIE)
                    .iter()
                    .filter_map(|v| v.to_str().ok())
                    .flat_map(|v| v.split(';'))
                    .filter_map(|pair| pair.trim().split_once('='))
                    .find(|(name, _)| *name == SESSION_COOKIE)
                    .map(|(_, value)| value)
            })
            .ok_or(AppError::Unauthorized)?;

        let claims = state.auth_service.verify_token(token)?;

        Ok(RequireAuth(claims))
    }
}
