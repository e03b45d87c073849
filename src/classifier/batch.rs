//! Resumable batch classification over a whole library's artists.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::providers::GenreProviders;
use super::{CancelToken, Classification, ClassifyError, Result, classify_artist, heuristic};
use crate::db::Database;
use crate::db::models::ClassificationProgress;

/// Pause between concurrency batches, a small courtesy on top of the
/// per-provider limiters.
const INTER_BATCH_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Artists classified concurrently per batch.
    pub concurrency: usize,
    /// Resume from a persisted checkpoint if one exists.
    pub resume: bool,
    pub cache_ttl_days: i64,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 5,
            resume: true,
            cache_ttl_days: 30,
        }
    }
}

/// Per-artist progress event.
#[derive(Debug, Clone)]
pub struct BatchProgress<'a> {
    pub current: usize,
    pub total: usize,
    pub artist: &'a str,
}

/// Classify a list of artists in resumable concurrency batches.
///
/// Artists are deduped first. With `resume`, artists already present in a
/// persisted checkpoint are skipped and never hit the providers again. A
/// checkpoint is written after every batch, so each one is a superset of
/// the previous. On cancellation the checkpoint is flagged and the error
/// re-raised; on completion the checkpoint is cleared.
pub fn run_batch<F>(
    db: &Mutex<Database>,
    providers: &dyn GenreProviders,
    artists: &[String],
    options: &BatchOptions,
    cancel: &CancelToken,
    mut on_progress: F,
) -> Result<HashMap<String, Vec<String>>>
where
    F: FnMut(BatchProgress<'_>),
{
    let unique = dedupe(artists);
    let total = unique.len();
    let concurrency = options.concurrency.max(1);

    let mut results: HashMap<String, Vec<String>> = HashMap::new();
    if options.resume {
        if let Some(checkpoint) = lock(db).get_progress()? {
            log::info!(
                "resuming classification: {} of {} artists done",
                checkpoint.results.len(),
                checkpoint.total
            );
            results = checkpoint.results;
        }
    }

    let remaining: Vec<&String> = unique
        .iter()
        .copied()
        .filter(|a| !results.contains_key(*a))
        .collect();
    let mut processed = results.len();

    for batch in remaining.chunks(concurrency) {
        if cancel.is_cancelled() {
            save_checkpoint(db, &results, processed, total, true)?;
            return Err(ClassifyError::Cancelled);
        }

        let outcomes: Vec<(String, Result<Classification>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = batch
                .iter()
                .map(|artist| {
                    let artist = artist.to_string();
                    scope.spawn(move || {
                        let outcome =
                            classify_artist(db, providers, &artist, options.cache_ttl_days, cancel);
                        (artist, outcome)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().expect("classification thread")).collect()
        });

        let mut cancelled = false;
        for (artist, outcome) in outcomes {
            let genres = match outcome {
                Ok(c) => c.genres,
                Err(ClassifyError::Cancelled) => {
                    cancelled = true;
                    continue;
                }
                Err(e) => {
                    log::warn!("classification of {artist} failed: {e}");
                    heuristic::classify_by_heuristics(&artist)
                }
            };
            processed += 1;
            on_progress(BatchProgress {
                current: processed,
                total,
                artist: &artist,
            });
            results.insert(artist, genres);
        }

        save_checkpoint(db, &results, processed, total, cancelled)?;
        if cancelled || cancel.is_cancelled() {
            return Err(ClassifyError::Cancelled);
        }

        std::thread::sleep(INTER_BATCH_DELAY);
    }

    lock(db).clear_progress()?;
    Ok(results)
}

fn dedupe(artists: &[String]) -> Vec<&String> {
    let mut seen = std::collections::HashSet::new();
    artists.iter().filter(|a| seen.insert(a.as_str())).collect()
}

fn save_checkpoint(
    db: &Mutex<Database>,
    results: &HashMap<String, Vec<String>>,
    current_index: usize,
    total: usize,
    cancelled: bool,
) -> Result<()> {
    lock(db).save_progress(&ClassificationProgress {
        results: results.clone(),
        current_index,
        total,
        cancelled,
        updated_at: chrono::Utc::now().timestamp_millis(),
    })?;
    Ok(())
}

fn lock(db: &Mutex<Database>) -> std::sync::MutexGuard<'_, Database> {
    db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::test_support::FakeProviders;

    fn mem_db() -> Mutex<Database> {
        Mutex::new(Database::open_in_memory().unwrap())
    }

    fn artists(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn classifies_everyone_and_clears_checkpoint() {
        let db = mem_db();
        let providers = FakeProviders::all_missing();
        let cancel = CancelToken::new();
        let mut seen = Vec::new();

        let results = run_batch(
            &db,
            &providers,
            &artists(&["DJ Shadow", "Radiohead", "DJ Shadow"]),
            &BatchOptions::default(),
            &cancel,
            |p| seen.push((p.current, p.total, p.artist.to_string())),
        )
        .unwrap();

        // Duplicates collapse before anything runs.
        assert_eq!(results.len(), 2);
        assert_eq!(results["DJ Shadow"], vec!["Electronic"]);
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].1, 2);
        assert!(lock(&db).get_progress().unwrap().is_none());
    }

    #[test]
    fn resume_skips_completed_artists() {
        let db = mem_db();
        let cancel = CancelToken::new();

        // Simulate a prior interrupted run that finished "Radiohead".
        let mut done = HashMap::new();
        done.insert("Radiohead".to_string(), vec!["art rock".to_string()]);
        lock(&db)
            .save_progress(&ClassificationProgress {
                results: done,
                current_index: 1,
                total: 2,
                cancelled: true,
                updated_at: 0,
            })
            .unwrap();

        let providers = FakeProviders::all_missing();
        let results = run_batch(
            &db,
            &providers,
            &artists(&["Radiohead", "DJ Shadow"]),
            &BatchOptions::default(),
            &cancel,
            |_| {},
        )
        .unwrap();

        assert_eq!(results.len(), 2);
        // Resumed artist kept its prior answer and caused no provider calls.
        assert_eq!(results["Radiohead"], vec!["art rock"]);
        assert_eq!(providers.call_log(), vec!["resolve:DJ Shadow"]);
    }

    #[test]
    fn cancellation_persists_a_flagged_checkpoint() {
        let db = mem_db();
        let providers = FakeProviders::all_missing();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = run_batch(
            &db,
            &providers,
            &artists(&["A", "B"]),
            &BatchOptions::default(),
            &cancel,
            |_| {},
        )
        .unwrap_err();
        assert!(matches!(err, ClassifyError::Cancelled));

        let checkpoint = lock(&db).get_progress().unwrap().unwrap();
        assert!(checkpoint.cancelled);
        assert_eq!(checkpoint.total, 2);
    }

    #[test]
    fn checkpoints_grow_monotonically() {
        let db = mem_db();
        let providers = FakeProviders::all_missing();
        let cancel = CancelToken::new();
        let names: Vec<String> = (0..7).map(|i| format!("Artist {i}")).collect();
        let options = BatchOptions {
            concurrency: 2,
            ..Default::default()
        };

        let mut checkpoint_sizes = Vec::new();
        run_batch(&db, &providers, &names, &options, &cancel, |p| {
            if p.current % 2 == 0 {
                if let Some(cp) = lock(&db).get_progress().unwrap() {
                    checkpoint_sizes.push(cp.results.len());
                }
            }
        })
        .unwrap();

        assert!(checkpoint_sizes.windows(2).all(|w| w[0] <= w[1]));
    }
}
