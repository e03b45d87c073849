pub mod analytics;
pub mod classifier;
pub mod config;
pub mod db;
pub mod diag;
pub mod export;
pub mod importer;
pub mod merge;
pub mod taxonomy;
pub mod timestamp;

/// Import file extensions we accept when walking a directory.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["json", "jsonl", "ndjson"];

/// Aggregate size cap for a single import, checked before any parsing.
pub const MAX_IMPORT_BYTES: u64 = 250 * 1024 * 1024;

/// Application name for XDG paths
pub const APP_NAME: &str = "trackrecord";

/// Sentinel genre for events with no usable classification.
pub const UNKNOWN_GENRE: &str = "Unknown";
