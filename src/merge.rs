//! Duplicate-aware dataset merging.
//!
//! Identity is (track, artist, second): the same play exported twice, even
//! with one export in milliseconds, collapses to a single record.

use std::collections::HashMap;

use thiserror::Error;

use crate::db::models::{DuplicateSample, ListeningEvent, MergeInfo};
use crate::timestamp::{self, MIN_VALID_TIMESTAMP};

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("no listens in dataset")]
    Empty,
    #[error(
        "{invalid} of {total} listens have timestamps outside the valid range; \
         please re-export your listening history"
    )]
    TooManyInvalidTimestamps { invalid: usize, total: usize },
    #[error("dataset spans less than a month; not enough history to analyze")]
    SpanTooShort,
}

/// Minimum share of in-window timestamps for a dataset to be usable.
const MIN_VALID_RATIO: f64 = 0.9;

/// Minimum dataset span in years (about one month).
const MIN_SPAN_YEARS: f64 = 0.08;

const MAX_DUPLICATE_SAMPLES: usize = 5;

fn merge_key(event: &ListeningEvent) -> String {
    format!(
        "{}|||{}|||{}",
        event.track_name.to_lowercase().trim(),
        event.artist_name.to_lowercase().trim(),
        timestamp::normalize_epoch(event.listened_at)
    )
}

/// Merge incoming listens into an existing dataset.
///
/// Pure: neither input is touched. Timestamps are normalized to seconds
/// before key computation, so ms and s copies of the same play collide.
/// First occurrence wins, with one exception: a duplicate carrying
/// classified genres replaces a kept copy that has none, so re-imports
/// never lose classification work.
pub fn merge(
    existing: &[ListeningEvent],
    incoming: &[ListeningEvent],
) -> (Vec<ListeningEvent>, MergeInfo) {
    let mut by_key: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<ListeningEvent> = Vec::with_capacity(existing.len() + incoming.len());
    let mut info = MergeInfo {
        existing: existing.len(),
        imported: incoming.len(),
        ..Default::default()
    };

    for event in existing.iter().chain(incoming) {
        let mut event = event.clone();
        event.listened_at = timestamp::normalize_epoch(event.listened_at);
        let key = merge_key(&event);

        match by_key.get(&key) {
            Some(&idx) => {
                info.duplicates += 1;
                if info.sample_duplicates.len() < MAX_DUPLICATE_SAMPLES {
                    info.sample_duplicates.push(DuplicateSample {
                        track: event.track_name.clone(),
                        artist: event.artist_name.clone(),
                        listened_at: event.listened_at,
                    });
                }
                // Enrichment tie-break: keep the classified copy.
                if event.has_known_genres() && !merged[idx].has_known_genres() {
                    merged[idx] = event;
                }
            }
            None => {
                by_key.insert(key, merged.len());
                merged.push(event);
            }
        }
    }

    merged.sort_by(|a, b| a.listened_at.cmp(&b.listened_at).then_with(|| a.id.cmp(&b.id)));

    info.total = merged.len();
    info.duplicate_rate = if incoming.is_empty() {
        0.0
    } else {
        (info.duplicates as f64 / incoming.len() as f64 * 1000.0).round() / 10.0
    };

    log::info!(
        "merged {} existing + {} incoming -> {} ({} duplicates, {:.1}%)",
        info.existing,
        info.imported,
        info.total,
        info.duplicates,
        info.duplicate_rate
    );
    (merged, info)
}

/// Reject datasets too broken or too short to analyze.
pub fn validate_dataset(events: &[ListeningEvent]) -> Result<(), MergeError> {
    if events.is_empty() {
        return Err(MergeError::Empty);
    }

    let valid: Vec<i64> = events
        .iter()
        .map(|e| e.listened_at)
        .filter(|&ts| timestamp::in_valid_window(ts))
        .collect();

    if (valid.len() as f64) < events.len() as f64 * MIN_VALID_RATIO {
        return Err(MergeError::TooManyInvalidTimestamps {
            invalid: events.len() - valid.len(),
            total: events.len(),
        });
    }

    let earliest = valid.iter().min().copied().unwrap_or(MIN_VALID_TIMESTAMP);
    let latest = valid.iter().max().copied().unwrap_or(MIN_VALID_TIMESTAMP);
    let span_years = (latest - earliest) as f64 / (365.25 * 86_400.0);
    if span_years < MIN_SPAN_YEARS {
        return Err(MergeError::SpanTooShort);
    }

    Ok(())
}
