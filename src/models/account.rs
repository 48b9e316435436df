use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Spotify,
    Youtube,
}

impl Provider {
    /// Playlist name used when the caller does not supply one.
    pub fn default_playlist_title(&self) -> String {
        format!("Transferred from {}", self)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Spotify => write!(f, "Spotify"),
            Provider::Youtube => write!(f, "YouTube"),
        }
    }
}

/// A user's stored OAuth credential for one provider.
///
/// At most one row exists per `(user_id, provider)`; after creation only the
/// token manager mutates it.
#[derive(Clone, FromRow)]
pub struct LinkedAccount {
    pub user_id: Uuid,
    pub provider: Provider,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl LinkedAccount {
    /// True when the access token is valid for less than `margin` from `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at - now < margin
    }
}

// Tokens are secrets; keep them out of logs.
impl fmt::Debug for LinkedAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkedAccount")
            .field("user_id", &self.user_id)
            .field("provider", &self.provider)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(expires_in: i64) -> LinkedAccount {
        LinkedAccount {
            user_id: Uuid::new_v4(),
            provider: Provider::Spotify,
            access_token: "secret-access".to_string(),
            refresh_token: Some("secret-refresh".to_string()),
            expires_at: Utc::now() + Duration::seconds(expires_in),
        }
    }

    #[test]
    fn test_expires_within_margin() {
        let now = Utc::now();
        assert!(account(30).expires_within(now, Duration::seconds(60)));
        assert!(!account(120).expires_within(now, Duration::seconds(60)));
        assert!(account(-10).expires_within(now, Duration::seconds(60)));
    }

    #[test]
    fn test_debug_hides_tokens() {
        let rendered = format!("{:?}", account(100));
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
    }

    #[test]
    fn test_default_titles() {
        assert_eq!(
            Provider::Spotify.default_playlist_title(),
            "Transferred from Spotify"
        );
        assert_eq!(
            Provider::Youtube.default_playlist_title(),
            "Transferred from YouTube"
        );
    }

    #[test]
    fn test_provider_path_names() {
        let p: Provider = serde_json::from_str("\"youtube\"").unwrap();
        assert_eq!(p, Provider::Youtube);
        assert_eq!(serde_json::to_string(&Provider::Spotify).unwrap(), "\"spotify\"");
    }
}
