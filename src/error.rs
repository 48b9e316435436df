use crate::models::Provider;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Source and destination accounts must both be connected")]
    AccountsNotLinked,

    #[error("{0} token expired. Reconnect account.")]
    ReauthRequired(Provider),

    #[error("Failed to refresh {0} token")]
    RefreshFailed(Provider),

    #[error("{provider} API error: {message}")]
    Provider { provider: Provider, message: String },

    #[error("Failed to add '{track}': {reason}")]
    TrackAddFailed { track: String, reason: String },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn provider(provider: Provider, message: impl Into<String>) -> Self {
        AppError::Provider {
            provider,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AccountsNotLinked => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::ReauthRequired(_) | AppError::RefreshFailed(_) | AppError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, self.to_string())
            }
            AppError::Provider { .. } | AppError::TrackAddFailed { .. } => {
                (StatusCode::BAD_GATEWAY, self.to_string())
            }
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
            AppError::Internal(ref e) => {
                tracing::error!("Internal error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::AccountsNotLinked.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::ReauthRequired(Provider::Spotify).into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::RefreshFailed(Provider::Youtube).into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::provider(Provider::Youtube, "quotaExceeded")
                .into_response()
                .status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_messages_name_the_provider() {
        let err = AppError::provider(Provider::Youtube, "Playlist not found");
        assert_eq!(err.to_string(), "YouTube API error: Playlist not found");
        assert_eq!(
            AppError::ReauthRequired(Provider::Spotify).to_string(),
            "Spotify token expired. Reconnect account."
        );
    }
}
