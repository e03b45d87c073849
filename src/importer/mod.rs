//! File import pipeline: read, detect, parse, sanitize, clean, merge, store.

pub mod detect;
pub mod lastfm;
pub mod listenbrainz;
pub mod spotify;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use walkdir::WalkDir;

use crate::db::models::{GenreCleanupReport, ListeningEvent, MergeInfo};
use crate::db::{Database, DbError};
use crate::diag::DiagnosticLog;
use crate::merge::{self, MergeError};
use crate::taxonomy;
use crate::timestamp::{self, TimestampStats};
use crate::{MAX_IMPORT_BYTES, SUPPORTED_EXTENSIONS};

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path} is not valid JSON: {source}")]
    InvalidJson {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(
        "unable to detect the format of {filename}; supported formats: \
         ListenBrainz JSON export, Spotify extended streaming history, Last.fm scrobbles"
    )]
    UnknownFormat { filename: String },
    #[error("no listen records found")]
    NoRecords,
    #[error("no usable timestamps found")]
    NoTimestamps,
    #[error("no importable files found")]
    NoFiles,
    #[error("import too large: {bytes} bytes (limit {MAX_IMPORT_BYTES})")]
    TooLarge { bytes: u64 },
    #[error("every file failed to import")]
    AllFilesFailed,
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Dataset(#[from] MergeError),
}

pub type Result<T> = std::result::Result<T, ImportError>;

/// Output of one format parser over one file.
#[derive(Debug)]
pub struct ParseOutcome {
    pub events: Vec<ListeningEvent>,
    /// Records seen in the file, kept or not.
    pub total: usize,
    /// Records dropped by the parser's own filters.
    pub filtered: usize,
}

/// Summary of a whole import run.
#[derive(Debug)]
pub struct ImportOutcome {
    pub files_imported: usize,
    pub files_failed: usize,
    pub merge_info: MergeInfo,
    pub genre_report: GenreCleanupReport,
    pub timestamp_stats: TimestampStats,
    pub date_range: Option<(i64, i64)>,
}

/// Strip script blocks and markup from free-text fields. Exports pass
/// through third-party tools; track titles are not trusted.
pub fn sanitize(text: &str) -> String {
    static SCRIPT: OnceLock<Regex> = OnceLock::new();
    static TAG: OnceLock<Regex> = OnceLock::new();
    let script = SCRIPT
        .get_or_init(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script>").expect("script pattern"));
    let tag = TAG.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag pattern"));

    let no_scripts = script.replace_all(text, "");
    tag.replace_all(&no_scripts, "").trim().to_string()
}

/// Expand files and directories into the flat list of importable files.
pub fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                if has_supported_extension(entry.path()) {
                    files.push(entry.into_path());
                }
            }
        } else {
            files.push(path.clone());
        }
    }
    files.sort();
    files
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.as_str()))
}

fn is_jsonl(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref(),
        Some("jsonl") | Some("ndjson")
    )
}

/// Read one file into a JSON value. JSONL files become an array, with
/// unparseable lines skipped.
pub fn load_file(path: &Path) -> Result<Value> {
    let contents = std::fs::read_to_string(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if is_jsonl(path) {
        let mut records = Vec::new();
        let mut skipped = 0usize;
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(v) => records.push(v),
                Err(e) => {
                    skipped += 1;
                    log::warn!("{}: skipping bad line: {e}", path.display());
                }
            }
        }
        if skipped > 0 {
            log::warn!("{}: {skipped} unparseable lines skipped", path.display());
        }
        Ok(Value::Array(records))
    } else {
        serde_json::from_str(&contents).map_err(|source| ImportError::InvalidJson {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Detect and parse one file into events.
pub fn parse_file(path: &Path, batch: usize) -> Result<ParseOutcome> {
    let data = load_file(path)?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let format = detect::detect(&data, filename)?;
    log::info!("{}: detected {format} format", path.display());
    match format {
        detect::SourceFormat::ListenBrainz => listenbrainz::parse(&data, batch),
        detect::SourceFormat::Spotify => spotify::parse(&data, batch),
        detect::SourceFormat::LastFm => lastfm::parse(&data, batch),
    }
}

/// Run the full import pipeline over a set of files and directories.
///
/// Per-file failures are isolated: one bad file never aborts the run unless
/// every file fails. The stored dataset is replaced with the merge of the
/// existing listens and everything newly parsed.
pub fn import_files<F>(
    db: &Database,
    paths: &[PathBuf],
    diag: &mut DiagnosticLog,
    mut on_file: F,
) -> Result<ImportOutcome>
where
    F: FnMut(&Path, usize, usize),
{
    let files = collect_files(paths);
    if files.is_empty() {
        return Err(ImportError::NoFiles);
    }

    let total_bytes: u64 = files
        .iter()
        .filter_map(|f| std::fs::metadata(f).ok())
        .map(|m| m.len())
        .sum();
    if total_bytes > MAX_IMPORT_BYTES {
        return Err(ImportError::TooLarge { bytes: total_bytes });
    }

    let mut incoming = Vec::new();
    let mut files_imported = 0usize;
    let mut files_failed = 0usize;

    for (batch, file) in files.iter().enumerate() {
        on_file(file, batch + 1, files.len());
        match parse_file(file, batch) {
            Ok(outcome) => {
                log::info!(
                    "{}: {} events ({} filtered)",
                    file.display(),
                    outcome.events.len(),
                    outcome.filtered
                );
                incoming.extend(outcome.events);
                files_imported += 1;
            }
            Err(e) => {
                diag.error("import", &format!("{}: {e}", file.display()));
                log::warn!("skipping {}: {e}", file.display());
                files_failed += 1;
            }
        }
    }

    if files_imported == 0 {
        return Err(ImportError::AllFilesFailed);
    }

    let report = taxonomy::clean_genre_data(&mut incoming);
    let (incoming, ts_stats) = timestamp::validate_and_clean(incoming);

    let existing = db.get_all_listens()?;
    let (merged, merge_info) = merge::merge(&existing, &incoming);
    merge::validate_dataset(&merged)?;
    db.replace_listens(&merged)?;

    let date_range = match (merged.first(), merged.last()) {
        (Some(first), Some(last)) => Some((first.listened_at, last.listened_at)),
        _ => None,
    };

    Ok(ImportOutcome {
        files_imported,
        files_failed,
        merge_info,
        genre_report: report,
        timestamp_stats: ts_stats,
        date_range,
    })
}
