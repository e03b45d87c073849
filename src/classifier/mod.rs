//! Artist genre classification.
//!
//! A cached-first cascade over free metadata sources, with offline
//! heuristics as the floor so every artist ends up with *some* answer.

pub mod batch;
pub mod heuristic;
pub mod providers;
pub mod ratelimit;

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use crate::db::models::GenreCacheEntry;
use crate::db::{Database, DbError};
use providers::{GenreProviders, Resolution, TagLookup};

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("classification cancelled")]
    Cancelled,
    #[error(transparent)]
    Db(#[from] DbError),
}

pub type Result<T> = std::result::Result<T, ClassifyError>;

/// Cooperative cancellation flag shared across classification threads.
#[derive(Debug, Default)]
pub struct CancelToken {
    flag: AtomicBool,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ClassifyError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// One artist's classification outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub genres: Vec<String>,
    /// Which rung of the cascade answered.
    pub source: String,
}

/// Classify one artist through the provider cascade.
///
/// Order: fresh cache, then MusicBrainz resolution gating the network rungs
/// (Last.fm tags, ListenBrainz similar-artist consensus, MusicBrainz tag
/// votes), with name heuristics merged into every network answer and used
/// alone when the network yields nothing. Every computed answer is cached.
/// Only cancellation and storage failures abort.
pub fn classify_artist(
    db: &Mutex<Database>,
    providers: &dyn GenreProviders,
    artist: &str,
    cache_ttl_days: i64,
    cancel: &CancelToken,
) -> Result<Classification> {
    cancel.check()?;

    let now_ms = chrono::Utc::now().timestamp_millis();
    {
        let db = lock(db);
        if let Some(entry) = db.get_cached_genres(artist)? {
            if entry.is_fresh(now_ms, cache_ttl_days) {
                log::debug!("{artist}: cache hit ({})", entry.source);
                return Ok(Classification {
                    genres: entry.genres,
                    source: "cache".to_string(),
                });
            }
        }
    }

    let heuristic_genres = heuristic::classify_by_heuristics(artist);

    cancel.check()?;
    let mbid = match providers.resolve_artist(artist) {
        Resolution::Found { mbid } => mbid,
        Resolution::NotFound | Resolution::Failed => {
            return finish(db, artist, heuristic_genres, None, "heuristic");
        }
    };

    cancel.check()?;
    if let TagLookup::Found(tags) = providers.artist_info_tags(artist) {
        let genres = heuristic::merge_genres(&heuristic_genres, &tags);
        return finish(db, artist, genres, Some(mbid), "lastfm");
    }

    cancel.check()?;
    if let TagLookup::Found(tags) = providers.similar_artist_tags(&mbid) {
        let genres = heuristic::merge_genres(&heuristic_genres, &tags);
        return finish(db, artist, genres, Some(mbid), "listenbrainz");
    }

    cancel.check()?;
    if let TagLookup::Found(tags) = providers.artist_tags_by_id(&mbid) {
        let genres = heuristic::merge_genres(&heuristic_genres, &tags);
        return finish(db, artist, genres, Some(mbid), "musicbrainz");
    }

    finish(db, artist, heuristic_genres, Some(mbid), "heuristic")
}

/// Cache the answer and wrap it up.
fn finish(
    db: &Mutex<Database>,
    artist: &str,
    genres: Vec<String>,
    mbid: Option<String>,
    source: &str,
) -> Result<Classification> {
    lock(db).put_cached_genres(&GenreCacheEntry {
        artist: artist.to_string(),
        genres: genres.clone(),
        source: source.to_string(),
        mbid,
        last_fetched: chrono::Utc::now().timestamp_millis(),
    })?;
    log::debug!("{artist}: classified via {source} -> {genres:?}");
    Ok(Classification {
        genres,
        source: source.to_string(),
    })
}

fn lock(db: &Mutex<Database>) -> std::sync::MutexGuard<'_, Database> {
    db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Outcome of an offline enrichment pass over the library.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnrichStats {
    /// Listen rows updated with cached genres.
    pub enriched_listens: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub unknown_artists: usize,
}

/// Back-fill genres onto stored listens from the cache alone, no network.
///
/// Artists with a usable cached answer (non-empty, not just "Unknown") get
/// it applied; the rest are left for a classification run.
pub fn enrich_from_cache(db: &Database) -> Result<EnrichStats> {
    let mut cache: std::collections::HashMap<String, Vec<String>> =
        std::collections::HashMap::new();
    for entry in db.get_all_cached_genres()? {
        if !entry.genres.is_empty() && entry.genres[0] != crate::UNKNOWN_GENRE {
            cache.insert(entry.artist.to_lowercase(), entry.genres);
        }
    }

    let mut stats = EnrichStats::default();
    let mut genre_map = std::collections::HashMap::new();
    for artist in db.get_all_artists()? {
        if artist.is_empty() || artist == "Unknown Artist" {
            stats.unknown_artists += 1;
            continue;
        }
        match cache.get(&artist.to_lowercase()) {
            Some(genres) => {
                stats.cache_hits += 1;
                genre_map.insert(artist, genres.clone());
            }
            None => stats.cache_misses += 1,
        }
    }

    stats.enriched_listens = db.apply_genre_map(&genre_map, "cache")?;
    log::info!(
        "enriched {} listens ({} artists hit, {} missed, {} unknown)",
        stats.enriched_listens,
        stats.cache_hits,
        stats.cache_misses,
        stats.unknown_artists
    );
    Ok(stats)
}
