use crate::error::Result;
use crate::models::{PlaylistSummary, Provider, SourceTrack, TrackReference};
use crate::services::pagination::{paginate, Page, PageSource};
use crate::services::provider::{expect_success, read_json, request_failed, MusicProvider};
use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::marker::PhantomData;

const PAGE_SIZE: &str = "50";

#[derive(Debug, Clone)]
pub struct YouTubeClient {
    api_base: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistResource {
    id: String,
    snippet: Snippet,
    content_details: Option<ContentDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentDetails {
    item_count: u32,
}

#[derive(Debug, Deserialize)]
struct PlaylistItemResource {
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: SearchResultId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResultId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedPlaylist {
    id: String,
}

/// Walks a YouTube Data API list endpoint by `pageToken`.
struct YouTubePages<I, T> {
    client: YouTubeClient,
    access_token: String,
    url: String,
    params: Vec<(&'static str, String)>,
    convert: fn(I) -> T,
    _item: PhantomData<fn() -> I>,
}

#[async_trait]
impl<I, T> PageSource for YouTubePages<I, T>
where
    I: DeserializeOwned + Send + 'static,
    T: Send + 'static,
{
    type Item = T;

    async fn fetch_page(&self, cursor: Option<String>) -> Result<Page<T>> {
        let mut params = self.params.clone();
        params.push(("maxResults", PAGE_SIZE.to_string()));
        if let Some(token) = cursor {
            params.push(("pageToken", token));
        }

        let page: ListResponse<I> = self
            .client
            .get_json(&self.access_token, &self.url, &params)
            .await?;

        Ok(Page {
            items: page.items.into_iter().map(self.convert).collect(),
            next_cursor: page.next_page_token,
        })
    }
}

/// Queries tried in order when looking for a video; duplicates are dropped.
pub fn search_queries(track: &TrackReference) -> Vec<String> {
    let join = |parts: &[&str]| {
        parts
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    };

    let mut queries = vec![
        join(&[track.title.as_str(), track.artist.as_str(), "official audio"]),
        join(&[track.title.as_str(), track.artist.as_str()]),
        join(&[track.title.as_str()]),
    ];
    queries.dedup();
    queries.retain(|q| !q.is_empty());
    queries
}

impl YouTubeClient {
    pub fn new(api_base: String, client: Client) -> Self {
        Self { api_base, client }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        access_token: &str,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        tracing::debug!("YouTube GET {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .query(params)
            .send()
            .await
            .map_err(|e| request_failed(Provider::Youtube, e))?;

        read_json(Provider::Youtube, response).await
    }

    /// Id of the top video result for `query`, if there is one.
    pub async fn search_video(&self, access_token: &str, query: &str) -> Result<Option<String>> {
        let url = format!("{}/search", self.api_base);
        let params = [
            ("part", "snippet".to_string()),
            ("q", query.to_string()),
            ("type", "video".to_string()),
            ("maxResults", "1".to_string()),
        ];

        let data: ListResponse<SearchResult> = self.get_json(access_token, &url, &params).await?;
        Ok(data.items.into_iter().next().and_then(|item| item.id.video_id))
    }
}

#[async_trait]
impl MusicProvider for YouTubeClient {
    fn kind(&self) -> Provider {
        Provider::Youtube
    }

    fn playlists(&self, access_token: &str) -> BoxStream<'static, Result<PlaylistSummary>> {
        paginate(YouTubePages {
            client: self.clone(),
            access_token: access_token.to_string(),
            url: format!("{}/playlists", self.api_base),
            params: vec![
                ("part", "snippet,contentDetails".to_string()),
                ("mine", "true".to_string()),
            ],
            convert: |playlist: PlaylistResource| PlaylistSummary {
                id: playlist.id,
                name: playlist.snippet.title,
                track_count: playlist.content_details.map(|c| c.item_count).unwrap_or(0),
            },
            _item: PhantomData,
        })
    }

    fn playlist_tracks(
        &self,
        access_token: &str,
        playlist_id: &str,
    ) -> BoxStream<'static, Result<SourceTrack>> {
        paginate(YouTubePages {
            client: self.clone(),
            access_token: access_token.to_string(),
            url: format!("{}/playlistItems", self.api_base),
            params: vec![
                ("part", "snippet".to_string()),
                ("playlistId", playlist_id.to_string()),
            ],
            convert: |item: PlaylistItemResource| SourceTrack::Title(item.snippet.title),
            _item: PhantomData,
        })
    }

    async fn create_playlist(&self, access_token: &str, title: &str) -> Result<String> {
        let url = format!("{}/playlists", self.api_base);

        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .query(&[("part", "snippet,status")])
            .json(&json!({
                "snippet": { "title": title },
                "status": { "privacyStatus": "private" },
            }))
            .send()
            .await
            .map_err(|e| request_failed(Provider::Youtube, e))?;

        let playlist: CreatedPlaylist = read_json(Provider::Youtube, response).await?;
        Ok(playlist.id)
    }

    async fn resolve_track(
        &self,
        access_token: &str,
        track: &TrackReference,
    ) -> Result<Option<String>> {
        for query in search_queries(track) {
            if let Some(video_id) = self.search_video(access_token, &query).await? {
                return Ok(Some(video_id));
            }
        }
        Ok(None)
    }

    fn insert_batch_size(&self) -> usize {
        1
    }

    async fn add_tracks(
        &self,
        access_token: &str,
        playlist_id: &str,
        item_ids: &[String],
    ) -> Result<()> {
        let url = format!("{}/playlistItems", self.api_base);

        for video_id in item_ids {
            let response = self
                .client
                .post(&url)
                .bearer_auth(access_token)
                .query(&[("part", "snippet")])
                .json(&json!({
                    "snippet": {
                        "playlistId": playlist_id,
                        "resourceId": { "kind": "youtube#video", "videoId": video_id },
                    }
                }))
                .send()
                .await
                .map_err(|e| request_failed(Provider::Youtube, e))?;

            expect_success(Provider::Youtube, response).await?;
        }
        Ok(())
    }
}
