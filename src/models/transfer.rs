use super::Provider;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Maximum number of per-track error messages returned with a result.
pub const MAX_REPORTED_ERRORS: usize = 5;

/// A (title, artist) pair taken from a source playlist item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackReference {
    pub title: String,
    pub artist: String,
}

impl TrackReference {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
        }
    }
}

impl std::fmt::Display for TrackReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.artist.is_empty() {
            write!(f, "{}", self.title)
        } else {
            write!(f, "{} - {}", self.title, self.artist)
        }
    }
}

/// Raw display title split into its components. An empty `track` means the
/// title could not be parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTitle {
    pub artist: String,
    pub track: String,
}

/// One item from a source playlist, as the provider exposes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceTrack {
    /// Free-form display title (YouTube video titles)
    Title(String),
    /// Structured metadata (Spotify track name and first artist)
    Structured(TrackReference),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
    pub track_count: u32,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct TransferRequest {
    #[validate(length(max = 150))]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResult {
    pub total: usize,
    pub matched: usize,
    pub skipped: usize,
    pub destination: Provider,
    pub destination_playlist_id: String,
    pub errors: Vec<String>,
}

/// Accumulates per-track outcomes while a transfer runs.
#[derive(Debug, Default)]
pub struct TransferTally {
    pub matched: usize,
    pub skipped: usize,
    errors: Vec<String>,
}

impl TransferTally {
    /// Records a recoverable failure. Only the first few messages are kept.
    pub fn record_error(&mut self, message: String) {
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(message);
        }
    }

    pub fn finish(
        self,
        total: usize,
        destination: Provider,
        destination_playlist_id: String,
    ) -> TransferResult {
        TransferResult {
            total,
            matched: self.matched,
            skipped: self.skipped,
            destination,
            destination_playlist_id,
            errors: self.errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_list_is_capped() {
        let mut tally = TransferTally::default();
        for i in 0..8 {
            tally.skipped += 1;
            tally.record_error(format!("failure {}", i));
        }

        let result = tally.finish(8, Provider::Youtube, "PL1".to_string());
        assert_eq!(result.errors.len(), MAX_REPORTED_ERRORS);
        assert_eq!(result.errors[0], "failure 0");
        assert_eq!(result.skipped, 8);
    }

    #[test]
    fn test_title_length_validation() {
        let ok = TransferRequest {
            title: Some("Road trip".to_string()),
        };
        assert!(ok.validate().is_ok());

        let too_long = TransferRequest {
            title: Some("x".repeat(151)),
        };
        assert!(too_long.validate().is_err());
    }
}
