//! Versioned backup export and restore.
//!
//! Everything the database holds goes into one JSON document, with all
//! timestamps normalized to Unix seconds at export time. Restore replaces
//! the stores wholesale.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::models::{ClassificationProgress, GenreCacheEntry, ListeningEvent};
use crate::db::{Database, DbError};
use crate::timestamp::normalize_epoch;

/// Backup document format version.
pub const BACKUP_VERSION: &str = "2.0";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("backup is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("unsupported backup version '{0}'")]
    UnsupportedVersion(String),
    #[error(transparent)]
    Db(#[from] DbError),
}

pub type Result<T> = std::result::Result<T, ExportError>;

#[derive(Debug, Serialize, Deserialize)]
pub struct DateRange {
    pub earliest: i64,
    pub latest: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BackupMetadata {
    #[serde(rename = "totalListens")]
    pub total_listens: usize,
    #[serde(rename = "dateRange")]
    pub date_range: Option<DateRange>,
}

/// The full backup document.
#[derive(Debug, Serialize, Deserialize)]
pub struct BackupDocument {
    pub version: String,
    #[serde(rename = "exportDate")]
    pub export_date: String,
    pub listens: Vec<ListeningEvent>,
    pub genres: Vec<GenreCacheEntry>,
    pub settings: HashMap<String, String>,
    pub progress: Option<ClassificationProgress>,
    pub metadata: BackupMetadata,
}

/// Build a backup document from everything stored.
pub fn export_backup(db: &Database) -> Result<BackupDocument> {
    let mut listens = db.get_all_listens()?;
    let mut converted = 0usize;
    for listen in &mut listens {
        let normalized = normalize_epoch(listen.listened_at);
        if normalized != listen.listened_at {
            listen.listened_at = normalized;
            converted += 1;
        }
    }
    if converted > 0 {
        log::info!("normalized {converted} listen timestamps to seconds for export");
    }

    let timestamps: Vec<i64> = listens.iter().map(|l| l.listened_at).collect();
    let date_range = match (timestamps.iter().min(), timestamps.iter().max()) {
        (Some(&earliest), Some(&latest)) => Some(DateRange { earliest, latest }),
        _ => None,
    };

    Ok(BackupDocument {
        version: BACKUP_VERSION.to_string(),
        export_date: chrono::Utc::now().to_rfc3339(),
        metadata: BackupMetadata {
            total_listens: listens.len(),
            date_range,
        },
        listens,
        genres: db.get_all_cached_genres()?,
        settings: db.get_all_settings()?,
        progress: db.get_progress()?,
    })
}

/// Serialize a backup to a file.
pub fn write_backup(db: &Database, path: &Path) -> Result<BackupDocument> {
    let doc = export_backup(db)?;
    let json = serde_json::to_string_pretty(&doc)?;
    std::fs::write(path, json).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("wrote backup of {} listens to {}", doc.listens.len(), path.display());
    Ok(doc)
}

/// Restore a backup document, replacing every store.
/// Timestamps are normalized again on the way in; backups from older
/// installs may carry milliseconds.
pub fn restore_backup(db: &Database, mut doc: BackupDocument) -> Result<usize> {
    if doc.version != BACKUP_VERSION {
        return Err(ExportError::UnsupportedVersion(doc.version));
    }

    let mut converted = 0usize;
    for listen in &mut doc.listens {
        let normalized = normalize_epoch(listen.listened_at);
        if normalized != listen.listened_at {
            listen.listened_at = normalized;
            converted += 1;
        }
    }
    if converted > 0 {
        log::info!("converted {converted} backup timestamps from milliseconds");
    }
    doc.listens.sort_by(|a, b| {
        a.listened_at
            .cmp(&b.listened_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    db.replace_listens(&doc.listens)?;
    db.clear_genre_cache()?;
    for entry in &doc.genres {
        db.put_cached_genres(entry)?;
    }
    db.replace_settings(&doc.settings)?;
    match &doc.progress {
        Some(progress) => db.save_progress(progress)?,
        None => db.clear_progress()?,
    }

    Ok(doc.listens.len())
}

/// Read and restore a backup file.
pub fn read_backup(db: &Database, path: &Path) -> Result<usize> {
    let contents = std::fs::read_to_string(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let doc: BackupDocument = serde_json::from_str(&contents)?;
    restore_backup(db, doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, ts: i64) -> ListeningEvent {
        let mut e = ListeningEvent::new("test", 0, 0, ts);
        e.id = id.to_string();
        e.track_name = "Track".into();
        e.artist_name = "Artist".into();
        e
    }

    fn seeded_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.replace_listens(&[event("a", 1_600_000_000), event("b", 1_600_100_000)])
            .unwrap();
        db.put_cached_genres(&GenreCacheEntry {
            artist: "Artist".into(),
            genres: vec!["rock".into()],
            source: "lastfm".into(),
            mbid: None,
            last_fetched: 1,
        })
        .unwrap();
        db.set_setting("period", "monthly").unwrap();
        db
    }

    #[test]
    fn export_carries_everything_with_metadata() {
        let doc = export_backup(&seeded_db()).unwrap();
        assert_eq!(doc.version, "2.0");
        assert_eq!(doc.metadata.total_listens, 2);
        let range = doc.metadata.date_range.as_ref().unwrap();
        assert_eq!(range.earliest, 1_600_000_000);
        assert_eq!(range.latest, 1_600_100_000);
        assert_eq!(doc.genres.len(), 1);
        assert_eq!(doc.settings["period"], "monthly");
        assert!(doc.progress.is_none());
    }

    #[test]
    fn round_trip_into_fresh_database() {
        let doc = export_backup(&seeded_db()).unwrap();
        let json = serde_json::to_string(&doc).unwrap();
        let parsed: BackupDocument = serde_json::from_str(&json).unwrap();

        let fresh = Database::open_in_memory().unwrap();
        let restored = restore_backup(&fresh, parsed).unwrap();
        assert_eq!(restored, 2);
        assert_eq!(fresh.count_listens().unwrap(), 2);
        assert_eq!(
            fresh.get_cached_genres("artist").unwrap().unwrap().genres,
            vec!["rock".to_string()]
        );
        assert_eq!(
            fresh.get_setting("period").unwrap().as_deref(),
            Some("monthly")
        );
    }

    #[test]
    fn restore_normalizes_millisecond_backups() {
        let db = Database::open_in_memory().unwrap();
        let doc = BackupDocument {
            version: "2.0".into(),
            export_date: "2023-01-01T00:00:00Z".into(),
            listens: vec![event("ms", 1_600_000_000_000)],
            genres: vec![],
            settings: HashMap::new(),
            progress: None,
            metadata: BackupMetadata {
                total_listens: 1,
                date_range: None,
            },
        };
        restore_backup(&db, doc).unwrap();
        let listens = db.get_all_listens().unwrap();
        assert_eq!(listens[0].listened_at, 1_600_000_000);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let doc = BackupDocument {
            version: "1.0".into(),
            export_date: String::new(),
            listens: vec![],
            genres: vec![],
            settings: HashMap::new(),
            progress: None,
            metadata: BackupMetadata {
                total_listens: 0,
                date_range: None,
            },
        };
        assert!(matches!(
            restore_backup(&db, doc),
            Err(ExportError::UnsupportedVersion(v)) if v == "1.0"
        ));
    }
}
