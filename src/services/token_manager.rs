use crate::config::ProviderSettings;
use crate::error::{AppError, Result};
use crate::models::{LinkedAccount, Provider};
use crate::services::account_store::AccountStore;
use chrono::{Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Minimum remaining lifetime of a token handed out by `ensure_valid`.
const EXPIRY_MARGIN_SECONDS: i64 = 60;

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECONDS: i64 = 3600;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
}

/// Keeps linked-account access tokens fresh.
///
/// Refreshes for the same `(user, provider)` are serialized so two concurrent
/// requests cannot both refresh and overwrite each other's newer token.
pub struct TokenManager {
    store: Arc<dyn AccountStore>,
    providers: ProviderSettings,
    client: Client,
    refresh_locks: Mutex<HashMap<(Uuid, Provider), Arc<tokio::sync::Mutex<()>>>>,
}

impl TokenManager {
    pub fn new(store: Arc<dyn AccountStore>, providers: ProviderSettings, client: Client) -> Self {
        Self {
            store,
            providers,
            client,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns an account whose access token stays valid for at least a minute.
    pub async fn ensure_valid(&self, account: LinkedAccount) -> Result<LinkedAccount> {
        let margin = Duration::seconds(EXPIRY_MARGIN_SECONDS);
        if !account.expires_within(Utc::now(), margin) {
            return Ok(account);
        }

        let key = (account.user_id, account.provider);
        let lock = self.refresh_lock(key);
        let result = self.refresh_serialized(&lock, account, margin).await;
        self.release_refresh_lock(key, lock);
        result
    }

    async fn refresh_serialized(
        &self,
        lock: &tokio::sync::Mutex<()>,
        account: LinkedAccount,
        margin: Duration,
    ) -> Result<LinkedAccount> {
        let _guard = lock.lock().await;

        // Another request may have refreshed, or unlinked, while we waited
        let current = self
            .store
            .get_account(account.user_id, account.provider)
            .await?
            .ok_or(AppError::AccountsNotLinked)?;

        if !current.expires_within(Utc::now(), margin) {
            debug!("{} token for user {} already refreshed", current.provider, current.user_id);
            return Ok(current);
        }

        self.refresh(current).await
    }

    /// Loads the linked account for `provider` and makes sure its token is usable.
    pub async fn valid_account(&self, user_id: Uuid, provider: Provider) -> Result<LinkedAccount> {
        let account = self
            .store
            .get_account(user_id, provider)
            .await?
            .ok_or(AppError::AccountsNotLinked)?;

        self.ensure_valid(account).await
    }

    fn refresh_lock(&self, key: (Uuid, Provider)) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .refresh_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(key).or_default().clone()
    }

    /// Drops the map entry once no other request holds or waits on it.
    fn release_refresh_lock(&self, key: (Uuid, Provider), lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .refresh_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // One reference in the map, one here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&key);
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.refresh_locks.lock().unwrap().len()
    }

    async fn refresh(&self, mut account: LinkedAccount) -> Result<LinkedAccount> {
        let provider = account.provider;
        let refresh_token = account
            .refresh_token
            .clone()
            .ok_or(AppError::ReauthRequired(provider))?;

        let config = self.providers.for_provider(provider);
        info!("Refreshing {} access token for user {}", provider, account.user_id);

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
        ];

        let response = self
            .client
            .post(&config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                warn!("{} token request failed: {}", provider, e);
                AppError::RefreshFailed(provider)
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("{} token endpoint returned {}", provider, status);
            return Err(AppError::RefreshFailed(provider));
        }

        let body: TokenResponse = response.json().await.map_err(|e| {
            warn!("{} token response unreadable: {}", provider, e);
            AppError::RefreshFailed(provider)
        })?;

        let access_token = body
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                warn!("{} token response had no access_token", provider);
                AppError::RefreshFailed(provider)
            })?;

        let expires_in = body.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECONDS);
        account.access_token = access_token;
        account.expires_at = Utc::now() + Duration::seconds(expires_in);
        // Spotify may rotate the refresh token; Google keeps the original
        if let Some(rotated) = body.refresh_token.filter(|token| !token.is_empty()) {
            account.refresh_token = Some(rotated);
        }

        self.store.save_account(&account).await?;
        info!(
            "{} token refreshed for user {}, valid until {}",
            provider, account.user_id, account.expires_at
        );

        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::services::account_store::memory::MemoryAccountStore;
    use mockito::{Matcher, Server};

    fn settings(base: &str) -> ProviderSettings {
        let provider = |name: &str| ProviderConfig {
            client_id: format!("{}-client", name),
            client_secret: format!("{}-secret", name),
            token_url: format!("{}/{}/token", base, name),
            api_base: base.to_string(),
        };
        ProviderSettings {
            spotify: provider("spotify"),
            youtube: provider("youtube"),
        }
    }

    fn account(provider: Provider, expires_in: i64, refresh_token: Option<&str>) -> LinkedAccount {
        LinkedAccount {
            user_id: Uuid::new_v4(),
            provider,
            access_token: "old-access".to_string(),
            refresh_token: refresh_token.map(str::to_string),
            expires_at: Utc::now() + Duration::seconds(expires_in),
        }
    }

    fn manager(base: &str, store: Arc<MemoryAccountStore>) -> TokenManager {
        TokenManager::new(store, settings(base), Client::new())
    }

    #[tokio::test]
    async fn test_refreshes_token_close_to_expiry() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/spotify/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "refresh-1".into()),
                Matcher::UrlEncoded("client_id".into(), "spotify-client".into()),
                Matcher::UrlEncoded("client_secret".into(), "spotify-secret".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"new-access","expires_in":1800,"refresh_token":"refresh-2"}"#)
            .create_async()
            .await;

        let original = account(Provider::Spotify, 30, Some("refresh-1"));
        let store = Arc::new(MemoryAccountStore::with_accounts([original.clone()]));
        let tokens = manager(&server.url(), store.clone());

        let refreshed = tokens.ensure_valid(original.clone()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(refreshed.access_token, "new-access");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("refresh-2"));
        let remaining = refreshed.expires_at - Utc::now();
        assert!(remaining > Duration::seconds(1700) && remaining <= Duration::seconds(1800));

        let stored = store
            .get_account(original.user_id, Provider::Spotify)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.access_token, "new-access");
        assert_eq!(store.save_count(), 1);
        assert_eq!(tokens.tracked_locks(), 0);
    }

    #[tokio::test]
    async fn test_leaves_fresh_token_alone() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/spotify/token")
            .expect(0)
            .create_async()
            .await;

        let original = account(Provider::Spotify, 120, Some("refresh-1"));
        let store = Arc::new(MemoryAccountStore::with_accounts([original.clone()]));
        let tokens = manager(&server.url(), store.clone());

        let result = tokens.ensure_valid(original).await.unwrap();

        mock.assert_async().await;
        assert_eq!(result.access_token, "old-access");
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_expires_in_and_refresh_token_keep_defaults() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/youtube/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"yt-access","token_type":"Bearer"}"#)
            .create_async()
            .await;

        let original = account(Provider::Youtube, -5, Some("yt-refresh"));
        let store = Arc::new(MemoryAccountStore::with_accounts([original.clone()]));
        let tokens = manager(&server.url(), store);

        let refreshed = tokens.ensure_valid(original).await.unwrap();

        assert_eq!(refreshed.access_token, "yt-access");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("yt-refresh"));
        let remaining = refreshed.expires_at - Utc::now();
        assert!(remaining > Duration::seconds(3500) && remaining <= Duration::seconds(3600));
    }

    #[tokio::test]
    async fn test_missing_refresh_token_requires_reauth() {
        let server = Server::new_async().await;
        let original = account(Provider::Youtube, 10, None);
        let store = Arc::new(MemoryAccountStore::with_accounts([original.clone()]));
        let tokens = manager(&server.url(), store);

        let err = tokens.ensure_valid(original).await.unwrap_err();
        assert!(matches!(err, AppError::ReauthRequired(Provider::Youtube)));
    }

    #[tokio::test]
    async fn test_rejected_refresh_fails() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/spotify/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let original = account(Provider::Spotify, 0, Some("revoked"));
        let store = Arc::new(MemoryAccountStore::with_accounts([original.clone()]));
        let tokens = manager(&server.url(), store.clone());

        let err = tokens.ensure_valid(original).await.unwrap_err();
        assert!(matches!(err, AppError::RefreshFailed(Provider::Spotify)));
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_success_without_access_token_fails() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/spotify/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"expires_in":3600}"#)
            .create_async()
            .await;

        let original = account(Provider::Spotify, 0, Some("refresh-1"));
        let store = Arc::new(MemoryAccountStore::with_accounts([original.clone()]));
        let tokens = manager(&server.url(), store);

        let err = tokens.ensure_valid(original).await.unwrap_err();
        assert!(matches!(err, AppError::RefreshFailed(Provider::Spotify)));
    }

    #[tokio::test]
    async fn test_concurrent_requests_refresh_once() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/spotify/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"new-access","expires_in":3600}"#)
            .expect(1)
            .create_async()
            .await;

        let original = account(Provider::Spotify, 5, Some("refresh-1"));
        let store = Arc::new(MemoryAccountStore::with_accounts([original.clone()]));
        let tokens = Arc::new(manager(&server.url(), store.clone()));

        let first = tokio::spawn({
            let tokens = tokens.clone();
            let account = original.clone();
            async move { tokens.ensure_valid(account).await }
        });
        let second = tokio::spawn({
            let tokens = tokens.clone();
            let account = original.clone();
            async move { tokens.ensure_valid(account).await }
        });

        let a = first.await.unwrap().unwrap();
        let b = second.await.unwrap().unwrap();

        mock.assert_async().await;
        assert_eq!(a.access_token, "new-access");
        assert_eq!(b.access_token, "new-access");
        assert_eq!(store.save_count(), 1);
        assert_eq!(tokens.tracked_locks(), 0);
    }

    #[tokio::test]
    async fn test_unlinked_account_is_not_restored() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/youtube/token")
            .expect(0)
            .create_async()
            .await;

        // Caller still holds a copy, but the row was removed
        let stale = account(Provider::Youtube, 10, Some("yt-refresh"));
        let store = Arc::new(MemoryAccountStore::default());
        let tokens = manager(&server.url(), store.clone());

        let err = tokens.ensure_valid(stale.clone()).await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, AppError::AccountsNotLinked));
        assert_eq!(store.save_count(), 0);
        assert!(store
            .get_account(stale.user_id, Provider::Youtube)
            .await
            .unwrap()
            .is_none());
        assert_eq!(tokens.tracked_locks(), 0);
    }

    #[tokio::test]
    async fn test_valid_account_requires_link() {
        let server = Server::new_async().await;
        let store = Arc::new(MemoryAccountStore::default());
        let tokens = manager(&server.url(), store);

        let err = tokens
            .valid_account(Uuid::new_v4(), Provider::Spotify)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AccountsNotLinked));
    }
}
