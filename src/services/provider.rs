use crate::error::{AppError, Result};
use crate::models::{PlaylistSummary, Provider, SourceTrack, TrackReference};
use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Both sides of a transfer as seen by the orchestrator.
#[async_trait]
pub trait MusicProvider: Send + Sync {
    fn kind(&self) -> Provider;

    /// The user's own playlists.
    fn playlists(&self, access_token: &str) -> BoxStream<'static, Result<PlaylistSummary>>;

    /// Items of a playlist, in playlist order.
    fn playlist_tracks(
        &self,
        access_token: &str,
        playlist_id: &str,
    ) -> BoxStream<'static, Result<SourceTrack>>;

    /// Creates an empty private playlist and returns its id.
    async fn create_playlist(&self, access_token: &str, title: &str) -> Result<String>;

    /// Finds the destination item for `track`, if any.
    async fn resolve_track(&self, access_token: &str, track: &TrackReference)
        -> Result<Option<String>>;

    /// How many resolved items `add_tracks` accepts per call.
    fn insert_batch_size(&self) -> usize;

    /// Appends `item_ids` to the playlist, preserving their order.
    async fn add_tracks(&self, access_token: &str, playlist_id: &str, item_ids: &[String])
        -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ApiErrorBody>,
}

// Google sends `{"error": {"message": ...}}`; Spotify also does for Web API
// calls, but uses a bare string on some auth failures.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiErrorBody {
    Detailed { message: Option<String> },
    Code(String),
}

impl ApiErrorBody {
    fn message(self) -> String {
        match self {
            ApiErrorBody::Detailed { message } => {
                message.unwrap_or_else(|| "unknown error".to_string())
            }
            ApiErrorBody::Code(code) => code,
        }
    }
}

/// Returns the body of a successful provider response.
///
/// An `error` object in the body fails the call even when the status is 200.
async fn checked_body(provider: Provider, response: Response) -> Result<String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| AppError::provider(provider, format!("Failed to read response: {}", e)))?;

    if let Ok(ErrorEnvelope { error: Some(error) }) = serde_json::from_str::<ErrorEnvelope>(&body) {
        return Err(AppError::provider(provider, error.message()));
    }

    if !status.is_success() {
        tracing::error!("{} API error: {} - {}", provider, status, truncate(&body, 200));
        return Err(AppError::provider(
            provider,
            format!("API returned status: {}", status),
        ));
    }

    Ok(body)
}

/// Reads a provider response body into `T`.
pub async fn read_json<T: DeserializeOwned>(provider: Provider, response: Response) -> Result<T> {
    let body = checked_body(provider, response).await?;

    serde_json::from_str(&body).map_err(|e| {
        AppError::provider(
            provider,
            format!("Failed to parse response: {} - Response: {}", e, truncate(&body, 200)),
        )
    })
}

/// Like `read_json` for calls whose success body is not needed.
pub async fn expect_success(provider: Provider, response: Response) -> Result<()> {
    checked_body(provider, response).await.map(|_| ())
}

pub fn request_failed(provider: Provider, e: reqwest::Error) -> AppError {
    AppError::provider(provider, format!("Request failed: {}", e))
}

fn truncate(body: &str, max: usize) -> &str {
    match body.char_indices().nth(max) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
