use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a listen's genres were determined.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GenreMetadata {
    /// "cache", "heuristic", "lastfm", "listenbrainz", "musicbrainz", ...
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub cached: bool,
    /// Set by importers; cleared once a classification lands.
    #[serde(default)]
    pub needs_fetch: bool,
    /// Epoch milliseconds of the provider fetch, if any.
    #[serde(default)]
    pub last_fetched: Option<i64>,
}

/// One normalized listening event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListeningEvent {
    pub id: String,
    /// Canonical Unix seconds.
    pub listened_at: i64,
    pub track_name: String,
    pub artist_name: String,
    pub album_name: String,
    pub genres: Vec<String>,
    #[serde(default)]
    pub genre_metadata: GenreMetadata,
    /// Export format tag ("spotify", "listenbrainz", "lastfm", "backup").
    pub source: String,
    /// Per-format side info the parsers preserve (uris, flags, msids,
    /// original_timestamp).
    #[serde(default)]
    pub side_info: HashMap<String, Value>,
}

impl ListeningEvent {
    /// Build a skeleton event with a stable id. Callers fill in the text
    /// fields afterwards.
    pub fn new(source: &str, batch: usize, seq: usize, listened_at: i64) -> Self {
        Self {
            id: format!("{source}-{batch}-{seq}-{listened_at}"),
            listened_at,
            track_name: String::new(),
            artist_name: String::new(),
            album_name: String::new(),
            genres: vec![crate::UNKNOWN_GENRE.to_string()],
            genre_metadata: GenreMetadata {
                needs_fetch: true,
                ..Default::default()
            },
            source: source.to_string(),
            side_info: HashMap::new(),
        }
    }

    /// True when the event carries at least one classified genre.
    pub fn has_known_genres(&self) -> bool {
        self.genres.iter().any(|g| g != crate::UNKNOWN_GENRE)
    }
}

/// A cached genre lookup for one artist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenreCacheEntry {
    pub artist: String,
    pub genres: Vec<String>,
    pub source: String,
    pub mbid: Option<String>,
    /// Epoch milliseconds.
    pub last_fetched: i64,
}

impl GenreCacheEntry {
    /// Is this entry still fresh under a TTL given in days?
    pub fn is_fresh(&self, now_ms: i64, ttl_days: i64) -> bool {
        now_ms - self.last_fetched < ttl_days * 24 * 60 * 60 * 1000
    }
}

/// Persisted checkpoint for a resumable classification run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationProgress {
    /// Completed artist -> genres.
    pub results: HashMap<String, Vec<String>>,
    pub current_index: usize,
    pub total: usize,
    pub cancelled: bool,
    /// Epoch milliseconds of the last checkpoint write.
    pub updated_at: i64,
}

/// One sampled duplicate from a merge.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateSample {
    pub track: String,
    pub artist: String,
    pub listened_at: i64,
}

/// Statistics from one merge pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeInfo {
    pub existing: usize,
    pub imported: usize,
    pub duplicates: usize,
    /// Percentage of incoming records that were duplicates, 1 decimal.
    pub duplicate_rate: f64,
    pub total: usize,
    pub sample_duplicates: Vec<DuplicateSample>,
}

/// Report from a taxonomy cleanup pass over a dataset.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenreCleanupReport {
    pub total: usize,
    pub with_valid_genres: usize,
    pub artist_names_removed: usize,
    pub languages_mapped: usize,
    pub set_to_unknown: usize,
    pub total_removed: usize,
}

/// Library-wide statistics for the `stats` command.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LibraryStats {
    pub total_listens: usize,
    pub unique_artists: usize,
    pub unique_tracks: usize,
    pub earliest: Option<i64>,
    pub latest: Option<i64>,
    pub top_genres: Vec<(String, usize)>,
    /// Cache entries per classification source.
    pub cache_by_source: Vec<(String, usize)>,
}
