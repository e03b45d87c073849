use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use trackrecord::analytics::periods::{
    TimePeriod, genre_diversity, genre_transitions, group_by_period, suggest_optimal_period,
    top_artists_for_genre,
};
use trackrecord::analytics::{gateway, genre_map_from_events};
use trackrecord::classifier::batch::{BatchOptions, run_batch};
use trackrecord::classifier::providers::HttpProviders;
use trackrecord::classifier::{CancelToken, enrich_from_cache};
use trackrecord::db::Database;
use trackrecord::diag::DiagnosticLog;
use trackrecord::importer;

#[derive(Parser)]
#[command(name = "trackrecord", version, about = "Listening history analyzer")]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import listening-history exports (Spotify, Last.fm, ListenBrainz)
    Import {
        /// Export files or directories to import
        paths: Vec<PathBuf>,

        /// Write the import diagnostic log to this file as JSON
        #[arg(long)]
        diagnostics: Option<PathBuf>,
    },

    /// Classify library artists into genres via MusicBrainz/Last.fm/ListenBrainz
    Classify {
        /// Artists classified concurrently (0 = from config, default 5)
        #[arg(short = 'j', long, default_value = "0")]
        jobs: usize,

        /// Ignore any saved checkpoint and start over
        #[arg(long)]
        no_resume: bool,
    },

    /// Apply cached genres to stored listens without touching the network
    Enrich,

    /// Show listening activity grouped into time periods
    Timeline {
        /// Bucket size: daily, weekly, monthly, quarterly, yearly, or auto
        #[arg(short, long, default_value = "auto")]
        period: String,

        /// Show period-over-period genre changes
        #[arg(long)]
        transitions: bool,
    },

    /// Detect gateway artists (discoveries that preceded a genre shift)
    Gateways {
        /// Bucket size: daily, weekly, monthly, quarterly, yearly, or auto
        #[arg(short, long, default_value = "auto")]
        period: String,
    },

    /// Show top artists for a genre
    Top {
        /// Genre to rank artists within
        genre: String,

        /// Number of results
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Show library statistics
    Stats,

    /// Export the whole library to a backup file
    Export {
        /// Output path for the backup JSON
        path: PathBuf,
    },

    /// Restore a backup file, replacing the current library
    Restore {
        /// Backup JSON produced by `export`
        path: PathBuf,
    },

    /// Clear the artist genre cache
    ClearCache,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let config = trackrecord::config::AppConfig::load();

    // Resolve database path: CLI > config > XDG default
    let db_path = cli
        .db_path
        .or(config.db_path.clone())
        .unwrap_or_else(trackrecord::config::default_db_path);
    log::info!("Database: {}", db_path.display());

    let db = Database::open(&db_path).context("Failed to open database")?;

    match cli.command {
        Commands::Import { paths, diagnostics } => {
            if paths.is_empty() {
                anyhow::bail!("No files to import. Pass export files or directories.");
            }

            let mut diag = DiagnosticLog::new();
            let pb = file_progress_bar();
            let outcome = importer::import_files(&db, &paths, &mut diag, |path, current, total| {
                pb.set_length(total as u64);
                pb.set_position(current as u64);
                pb.set_message(path.display().to_string());
            })
            .context("Import failed")?;
            pb.finish_and_clear();

            let merge = &outcome.merge_info;
            println!(
                "Import complete: {} files read, {} failed",
                outcome.files_imported, outcome.files_failed
            );
            println!(
                "  {} new listens, {} duplicates skipped ({}%), library now {}",
                merge.imported, merge.duplicates, merge.duplicate_rate, merge.total
            );
            if outcome.timestamp_stats.removed > 0 || outcome.timestamp_stats.recovered > 0 {
                println!(
                    "  timestamps: {} converted from ms, {} recovered, {} dropped",
                    outcome.timestamp_stats.converted_from_ms,
                    outcome.timestamp_stats.recovered,
                    outcome.timestamp_stats.removed
                );
            }
            if let Some((earliest, latest)) = outcome.date_range {
                println!("  range: {} to {}", format_date(earliest), format_date(latest));
            }
            if diag.error_count() > 0 {
                println!("  {} problems logged during import", diag.error_count());
            }
            if let Some(path) = diagnostics {
                let json = diag.export_json().context("Failed to render diagnostics")?;
                std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("  diagnostics written to {}", path.display());
            }
        }

        Commands::Classify { jobs, no_resume } => {
            let artists = db.get_all_artists().context("Failed to load artists")?;
            if artists.is_empty() {
                println!("Nothing to classify. Run `trackrecord import` first.");
                return Ok(());
            }

            let options = BatchOptions {
                concurrency: if jobs > 0 { jobs } else { config.resolve_concurrency() },
                resume: !no_resume,
                cache_ttl_days: config.providers.cache_ttl_days,
            };
            let providers = HttpProviders::new(&config.providers);
            let cancel = CancelToken::new();

            let pb = ProgressBar::new(artists.len() as u64);
            pb.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
                )
                .unwrap()
                .progress_chars("#>-"),
            );

            let db = Mutex::new(db);
            let results = run_batch(&db, &providers, &artists, &options, &cancel, |progress| {
                pb.set_position(progress.current as u64);
                pb.set_message(progress.artist.to_string());
            })
            .context("Classification failed")?;
            pb.finish_and_clear();

            let db = db.into_inner().unwrap_or_else(|p| p.into_inner());
            let updated = db
                .apply_genre_map(&results, "classified")
                .context("Failed to apply genres")?;
            println!(
                "Classification complete: {} artists classified, {} listens updated",
                results.len(),
                updated
            );
        }

        Commands::Enrich => {
            let stats = enrich_from_cache(&db).context("Enrichment failed")?;
            println!(
                "Enrichment complete: {} listens updated ({} artists from cache, {} still unclassified, {} unknown)",
                stats.enriched_listens, stats.cache_hits, stats.cache_misses, stats.unknown_artists
            );
        }

        Commands::Timeline { period, transitions } => {
            let events = db.get_all_listens().context("Failed to load listens")?;
            if events.is_empty() {
                println!("No listens yet. Run `trackrecord import` first.");
                return Ok(());
            }

            let period = resolve_period(&period, events.len())?;
            let genre_map = genre_map_from_events(&events);
            let groups = group_by_period(&events, period, &genre_map);

            println!("Timeline ({} buckets, {}):", groups.len(), period.as_str());
            println!();
            println!("{:<18} {:>8} {:>6}  Top genres", "Period", "Listens", "Div");
            println!("{}", "-".repeat(70));
            for group in &groups {
                let top: Vec<String> = group
                    .genres
                    .iter()
                    .take(3)
                    .map(|g| format!("{} ({:.0}%)", g.genre, g.percentage))
                    .collect();
                println!(
                    "{:<18} {:>8} {:>6.2}  {}",
                    group.label,
                    group.listen_count,
                    genre_diversity(&group.genres),
                    top.join(", ")
                );
            }
            println!();
            println!("Div = genre diversity (0 = single genre, 1 = even spread)");

            if transitions {
                println!();
                for t in genre_transitions(&groups) {
                    let mut changes: Vec<&trackrecord::analytics::periods::GenreTransition> =
                        t.transitions.iter().filter(|g| g.change != 0).collect();
                    changes.sort_by_key(|g| -g.change.abs());
                    if changes.is_empty() {
                        continue;
                    }
                    println!("{} -> {}:", t.from_period, t.to_period);
                    for g in changes.iter().take(5) {
                        println!("  {:<20} {:+}", g.genre, g.change);
                    }
                }
            }
        }

        Commands::Gateways { period } => {
            let events = db.get_all_listens().context("Failed to load listens")?;
            if events.is_empty() {
                println!("No listens yet. Run `trackrecord import` first.");
                return Ok(());
            }

            let period = resolve_period(&period, events.len())?;
            let genre_map = genre_map_from_events(&events);
            let groups = group_by_period(&events, period, &genre_map);
            let gateways =
                gateway::detect_gateway_artists(&groups, &genre_map, &events, &config.gateway);

            if gateways.is_empty() {
                println!("No gateway artists found.");
                println!("(Classify more artists or lower the thresholds in config.)");
                return Ok(());
            }

            println!("Gateway artists ({} buckets, {}):", groups.len(), period.as_str());
            println!();
            println!(
                "{:<25} {:<15} {:<16} {:>7} {:>7} {:>7}",
                "Artist", "Genre", "Discovered", "Before", "After", "Growth"
            );
            println!("{}", "-".repeat(85));
            for g in &gateways {
                println!(
                    "{:<25} {:<15} {:<16} {:>6.1}% {:>6.1}% {:>+6.1}",
                    truncate(&g.artist, 25),
                    truncate(&g.trigger_genre, 15),
                    g.period_label,
                    g.before_percentage,
                    g.after_percentage,
                    g.growth,
                );
            }
            println!();
            println!("Growth = percentage-point genre share change around the discovery");
        }

        Commands::Top { genre, limit } => {
            let events = db.get_all_listens().context("Failed to load listens")?;
            let genre_map = genre_map_from_events(&events);
            let top = top_artists_for_genre(&events, &genre_map, &genre, limit);

            if top.is_empty() {
                println!("No artists found for genre \"{}\".", genre);
                return Ok(());
            }

            println!("Top {} artists ({}):", top.len(), genre);
            for (artist, plays) in &top {
                println!("  {:<30} {}", artist, plays);
            }
        }

        Commands::Stats => {
            let stats = db.library_stats().context("Failed to get stats")?;
            println!("Library Statistics");
            println!("==================");
            println!("Total listens:    {}", stats.total_listens);
            println!("Unique artists:   {}", stats.unique_artists);
            println!("Unique tracks:    {}", stats.unique_tracks);
            if let (Some(earliest), Some(latest)) = (stats.earliest, stats.latest) {
                println!(
                    "Range:            {} to {}",
                    format_date(earliest),
                    format_date(latest)
                );
            }
            println!();

            if !stats.top_genres.is_empty() {
                println!("Top genres:");
                for (genre, count) in &stats.top_genres {
                    println!("  {:<20} {}", genre, count);
                }
                println!();
            }

            if !stats.cache_by_source.is_empty() {
                println!("Genre cache by source:");
                for (source, count) in &stats.cache_by_source {
                    println!("  {:<15} {}", source, count);
                }
            }
        }

        Commands::Export { path } => {
            let doc = trackrecord::export::write_backup(&db, &path).context("Export failed")?;
            println!(
                "Exported {} listens to {}",
                doc.metadata.total_listens,
                path.display()
            );
        }

        Commands::Restore { path } => {
            let restored =
                trackrecord::export::read_backup(&db, &path).context("Restore failed")?;
            println!("Restored {} listens from {}", restored, path.display());
        }

        Commands::ClearCache => {
            let cleared = db.clear_genre_cache().context("Failed to clear cache")?;
            println!("Cleared {} cached artist entries", cleared);
        }
    }

    Ok(())
}

/// Parse a period name, with "auto" picking a bucket size for the library.
fn resolve_period(name: &str, listen_count: usize) -> Result<TimePeriod> {
    if name.eq_ignore_ascii_case("auto") {
        let period = suggest_optimal_period(listen_count);
        log::info!("auto period for {} listens: {}", listen_count, period.as_str());
        Ok(period)
    } else {
        TimePeriod::from_str(name).map_err(|e| anyhow::anyhow!(e))
    }
}

fn file_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} files {msg}",
        )
        .unwrap()
        .progress_chars("#>-"),
    );
    pb
}

fn format_date(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        s.to_string()
    }
}
