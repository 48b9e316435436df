use crate::error::Result;
use crate::models::{PlaylistSummary, Provider, SourceTrack, TrackReference};
use crate::services::pagination::{paginate, Page, PageSource};
use crate::services::provider::{expect_success, read_json, request_failed, MusicProvider};
use crate::services::title_matcher::first_exact_match;
use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::marker::PhantomData;

const PLAYLISTS_PAGE_SIZE: u32 = 50;
const TRACKS_PAGE_SIZE: u32 = 100;
const SEARCH_LIMIT: u32 = 10;
/// Spotify accepts at most 100 URIs per add request.
const ADD_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct SpotifyClient {
    api_base: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct Paging<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CurrentUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SimplifiedPlaylist {
    id: String,
    name: String,
    tracks: Option<TrackCount>,
}

#[derive(Debug, Deserialize)]
struct TrackCount {
    total: u32,
}

#[derive(Debug, Deserialize)]
struct PlaylistTrackItem {
    track: Option<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    name: String,
    uri: String,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Paging<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct CreatedPlaylist {
    id: String,
}

/// Walks a Spotify paging object by following its `next` URL.
struct SpotifyPages<I, T> {
    client: SpotifyClient,
    access_token: String,
    first_url: String,
    convert: fn(I) -> Option<T>,
    _item: PhantomData<fn() -> I>,
}

#[async_trait]
impl<I, T> PageSource for SpotifyPages<I, T>
where
    I: DeserializeOwned + Send + 'static,
    T: Send + 'static,
{
    type Item = T;

    async fn fetch_page(&self, cursor: Option<String>) -> Result<Page<T>> {
        let url = cursor.unwrap_or_else(|| self.first_url.clone());
        let page: Paging<I> = self.client.get_json(&self.access_token, &url).await?;

        Ok(Page {
            items: page.items.into_iter().filter_map(self.convert).collect(),
            next_cursor: page.next,
        })
    }
}

impl SpotifyClient {
    pub fn new(api_base: String, client: Client) -> Self {
        Self { api_base, client }
    }

    async fn get_json<T: DeserializeOwned>(&self, access_token: &str, url: &str) -> Result<T> {
        tracing::debug!("Spotify GET {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| request_failed(Provider::Spotify, e))?;

        read_json(Provider::Spotify, response).await
    }

    pub async fn current_user_id(&self, access_token: &str) -> Result<String> {
        let url = format!("{}/me", self.api_base);
        let user: CurrentUser = self.get_json(access_token, &url).await?;
        Ok(user.id)
    }

    /// Up to ten track candidates as `(name, uri)` pairs.
    pub async fn search_tracks(&self, access_token: &str, query: &str) -> Result<Vec<(String, String)>> {
        let url = format!("{}/search", self.api_base);
        let limit = SEARCH_LIMIT.to_string();

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("q", query), ("type", "track"), ("limit", limit.as_str())])
            .send()
            .await
            .map_err(|e| request_failed(Provider::Spotify, e))?;

        let data: SearchResponse = read_json(Provider::Spotify, response).await?;
        Ok(data
            .tracks
            .items
            .into_iter()
            .map(|track| (track.name, track.uri))
            .collect())
    }
}

#[async_trait]
impl MusicProvider for SpotifyClient {
    fn kind(&self) -> Provider {
        Provider::Spotify
    }

    fn playlists(&self, access_token: &str) -> BoxStream<'static, Result<PlaylistSummary>> {
        paginate(SpotifyPages {
            client: self.clone(),
            access_token: access_token.to_string(),
            first_url: format!("{}/me/playlists?limit={}", self.api_base, PLAYLISTS_PAGE_SIZE),
            convert: |playlist: SimplifiedPlaylist| {
                Some(PlaylistSummary {
                    id: playlist.id,
                    name: playlist.name,
                    track_count: playlist.tracks.map(|t| t.total).unwrap_or(0),
                })
            },
            _item: PhantomData,
        })
    }

    fn playlist_tracks(
        &self,
        access_token: &str,
        playlist_id: &str,
    ) -> BoxStream<'static, Result<SourceTrack>> {
        paginate(SpotifyPages {
            client: self.clone(),
            access_token: access_token.to_string(),
            first_url: format!(
                "{}/playlists/{}/tracks?limit={}",
                self.api_base, playlist_id, TRACKS_PAGE_SIZE
            ),
            // Removed or unavailable tracks come back as null
            convert: |item: PlaylistTrackItem| {
                let track = item.track?;
                let artist = track
                    .artists
                    .into_iter()
                    .next()
                    .map(|a| a.name)
                    .unwrap_or_default();
                Some(SourceTrack::Structured(TrackReference::new(track.name, artist)))
            },
            _item: PhantomData,
        })
    }

    async fn create_playlist(&self, access_token: &str, title: &str) -> Result<String> {
        let user_id = self.current_user_id(access_token).await?;
        let url = format!("{}/users/{}/playlists", self.api_base, user_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(&json!({ "name": title, "public": false }))
            .send()
            .await
            .map_err(|e| request_failed(Provider::Spotify, e))?;

        let playlist: CreatedPlaylist = read_json(Provider::Spotify, response).await?;
        Ok(playlist.id)
    }

    async fn resolve_track(
        &self,
        access_token: &str,
        track: &TrackReference,
    ) -> Result<Option<String>> {
        let query = format!("{} {}", track.title, track.artist);
        let candidates = self.search_tracks(access_token, query.trim()).await?;

        Ok(first_exact_match(&track.title, &candidates, |(name, _)| name.as_str())
            .map(|(_, uri)| uri.clone()))
    }

    fn insert_batch_size(&self) -> usize {
        ADD_BATCH_SIZE
    }

    async fn add_tracks(
        &self,
        access_token: &str,
        playlist_id: &str,
        item_ids: &[String],
    ) -> Result<()> {
        let url = format!("{}/playlists/{}/tracks", self.api_base, playlist_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(&json!({ "uris": item_ids }))
            .send()
            .await
            .map_err(|e| request_failed(Provider::Spotify, e))?;

        expect_success(Provider::Spotify, response).await
    }
}
