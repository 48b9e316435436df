use crate::error::{AppError, Result};
use crate::models::{
    LinkedAccount, PlaylistSummary, Provider, SourceTrack, TrackReference, TransferResult,
    TransferTally,
};
use crate::services::account_store::AccountStore;
use crate::services::provider::MusicProvider;
use crate::services::title_matcher::parse_title;
use crate::services::token_manager::TokenManager;
use futures::TryStreamExt;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferStage {
    Validating,
    Fetching,
    Creating,
    Resolving,
    Populating,
    Done,
    Failed,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferStage::Validating => "validating",
            TransferStage::Fetching => "fetching",
            TransferStage::Creating => "creating",
            TransferStage::Resolving => "resolving",
            TransferStage::Populating => "populating",
            TransferStage::Done => "done",
            TransferStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One transfer request. Tracks are resolved one at a time, in source order.
struct TransferRun<'a> {
    id: Uuid,
    stage: TransferStage,
    source: &'a dyn MusicProvider,
    destination: &'a dyn MusicProvider,
}

impl TransferRun<'_> {
    fn enter(&mut self, stage: TransferStage) {
        debug!("Transfer {}: {} -> {}", self.id, self.stage, stage);
        self.stage = stage;
    }
}

/// Drives playlist migrations between linked provider accounts.
pub struct TransferService {
    store: Arc<dyn AccountStore>,
    tokens: Arc<TokenManager>,
    spotify: Arc<dyn MusicProvider>,
    youtube: Arc<dyn MusicProvider>,
}

impl TransferService {
    pub fn new(
        store: Arc<dyn AccountStore>,
        tokens: Arc<TokenManager>,
        spotify: Arc<dyn MusicProvider>,
        youtube: Arc<dyn MusicProvider>,
    ) -> Self {
        Self {
            store,
            tokens,
            spotify,
            youtube,
        }
    }

    fn provider(&self, provider: Provider) -> &dyn MusicProvider {
        match provider {
            Provider::Spotify => self.spotify.as_ref(),
            Provider::Youtube => self.youtube.as_ref(),
        }
    }

    /// Playlists owned by the user's linked account on `provider`.
    pub async fn list_playlists(&self, user_id: Uuid, provider: Provider) -> Result<Vec<PlaylistSummary>> {
        let account = self.tokens.valid_account(user_id, provider).await?;
        self.provider(provider)
            .playlists(&account.access_token)
            .try_collect()
            .await
    }

    /// Copies `source_playlist_id` into a new playlist on `destination`.
    ///
    /// Each call creates a new destination playlist. Unmatched tracks and
    /// per-track failures are counted as skipped; anything else aborts.
    pub async fn transfer(
        &self,
        user_id: Uuid,
        source: Provider,
        destination: Provider,
        source_playlist_id: &str,
        title: Option<&str>,
    ) -> Result<TransferResult> {
        let mut run = TransferRun {
            id: Uuid::new_v4(),
            stage: TransferStage::Validating,
            source: self.provider(source),
            destination: self.provider(destination),
        };

        info!(
            "Transfer {} started for user {}: {} playlist {} -> {}",
            run.id, user_id, source, source_playlist_id, destination
        );

        match self.execute(&mut run, user_id, source_playlist_id, title).await {
            Ok(result) => {
                run.enter(TransferStage::Done);
                info!(
                    "Transfer {} finished: {} of {} tracks matched, {} skipped",
                    run.id, result.matched, result.total, result.skipped
                );
                Ok(result)
            }
            Err(e) => {
                let failed_in = run.stage;
                run.enter(TransferStage::Failed);
                error!("Transfer {} failed while {}: {}", run.id, failed_in, e);
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        run: &mut TransferRun<'_>,
        user_id: Uuid,
        source_playlist_id: &str,
        title: Option<&str>,
    ) -> Result<TransferResult> {
        let source_provider = run.source;
        let destination_provider = run.destination;
        let source = source_provider.kind();
        let destination = destination_provider.kind();
        if source == destination {
            return Err(AppError::Validation(
                "Source and destination providers must differ".to_string(),
            ));
        }

        let source_account = self.store.get_account(user_id, source).await?;
        let destination_account = self.store.get_account(user_id, destination).await?;
        let (Some(source_account), Some(destination_account)) = (source_account, destination_account)
        else {
            return Err(AppError::AccountsNotLinked);
        };

        let source_account = self.tokens.ensure_valid(source_account).await?;
        let mut destination_account = self.tokens.ensure_valid(destination_account).await?;

        run.enter(TransferStage::Fetching);
        let tracks: Vec<SourceTrack> = source_provider
            .playlist_tracks(&source_account.access_token, source_playlist_id)
            .try_collect()
            .await?;
        info!("Transfer {}: fetched {} source tracks", run.id, tracks.len());

        run.enter(TransferStage::Creating);
        let playlist_title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| source.default_playlist_title());
        let playlist_id = destination_provider
            .create_playlist(&destination_account.access_token, &playlist_title)
            .await?;
        info!(
            "Transfer {}: created {} playlist {} ('{}')",
            run.id, destination, playlist_id, playlist_title
        );

        run.enter(TransferStage::Resolving);
        let total = tracks.len();
        let batch_size = destination_provider.insert_batch_size().max(1);
        let mut tally = TransferTally::default();
        let mut pending: Vec<(TrackReference, String)> = Vec::with_capacity(batch_size);

        for item in tracks {
            let Some(reference) = track_reference(item) else {
                debug!("Transfer {}: skipping unparseable title", run.id);
                tally.skipped += 1;
                continue;
            };

            // Long playlists can outlive the destination token
            destination_account = self.tokens.ensure_valid(destination_account).await?;

            let resolved = destination_provider
                .resolve_track(&destination_account.access_token, &reference)
                .await;
            match resolved {
                Ok(Some(item_id)) => {
                    pending.push((reference, item_id));
                    if pending.len() >= batch_size {
                        populate(run, &destination_account, &playlist_id, &mut pending, &mut tally)
                            .await;
                    }
                }
                Ok(None) => {
                    debug!("Transfer {}: no match for '{}'", run.id, reference);
                    tally.skipped += 1;
                }
                Err(e) => {
                    warn!("Transfer {}: search failed for '{}': {}", run.id, reference, e);
                    tally.skipped += 1;
                    tally.record_error(format!("{}: {}", reference, e));
                }
            }
        }

        if !pending.is_empty() {
            destination_account = self.tokens.ensure_valid(destination_account).await?;
            populate(run, &destination_account, &playlist_id, &mut pending, &mut tally).await;
        }

        Ok(tally.finish(total, destination, playlist_id))
    }
}

/// Turns a source item into a searchable reference; `None` when unparseable.
fn track_reference(item: SourceTrack) -> Option<TrackReference> {
    match item {
        SourceTrack::Structured(reference) if !reference.title.trim().is_empty() => Some(reference),
        SourceTrack::Structured(_) => None,
        SourceTrack::Title(raw) => {
            let parsed = parse_title(&raw);
            if parsed.track.is_empty() {
                None
            } else {
                Some(TrackReference::new(parsed.track, parsed.artist))
            }
        }
    }
}

/// Appends the pending items. A failed insert marks each of its tracks as skipped.
async fn populate(
    run: &mut TransferRun<'_>,
    account: &LinkedAccount,
    playlist_id: &str,
    pending: &mut Vec<(TrackReference, String)>,
    tally: &mut TransferTally,
) {
    run.enter(TransferStage::Populating);
    let destination = run.destination;
    let batch: Vec<(TrackReference, String)> = std::mem::take(pending);
    let item_ids: Vec<String> = batch.iter().map(|(_, id)| id.clone()).collect();

    let added = destination
        .add_tracks(&account.access_token, playlist_id, &item_ids)
        .await;
    match added {
        Ok(()) => tally.matched += batch.len(),
        Err(e) => {
            warn!("Transfer {}: adding {} item(s) failed: {}", run.id, batch.len(), e);
            let reason = e.to_string();
            for (reference, _) in batch {
                tally.skipped += 1;
                tally.record_error(
                    AppError::TrackAddFailed {
                        track: reference.to_string(),
                        reason: reason.clone(),
                    }
                    .to_string(),
                );
            }
        }
    }
    run.enter(TransferStage::Resolving);
}
