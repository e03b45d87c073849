pub mod models;
pub mod queries;

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Migration failed: {0}")]
    Migration(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        // WAL mode for better concurrent read performance
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        self.migrate()?;
        Ok(())
    }

    fn migrate(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if version < 1 {
            self.migrate_v1()?;
        }

        self.conn.pragma_update(None, "user_version", 1)?;
        Ok(())
    }

    /// V1: listens + genre cache + classification checkpoint + settings
    fn migrate_v1(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS listens (
                id              TEXT PRIMARY KEY,
                listened_at     INTEGER NOT NULL,
                track_name      TEXT NOT NULL,
                artist_name     TEXT NOT NULL,
                album_name      TEXT NOT NULL,

                -- JSON array of genre names
                genres          TEXT NOT NULL DEFAULT '[\"Unknown\"]',
                -- JSON: classification source, cached flag, fetch time
                genre_metadata  TEXT,

                -- Export format this record came from
                source          TEXT NOT NULL,
                -- JSON bag of per-format side info (uris, flags, msids)
                side_info       TEXT NOT NULL DEFAULT '{}'
            );

            CREATE INDEX IF NOT EXISTS idx_listens_listened_at ON listens(listened_at);
            CREATE INDEX IF NOT EXISTS idx_listens_artist ON listens(artist_name);
            CREATE INDEX IF NOT EXISTS idx_listens_source ON listens(source);

            -- Artist genre cache. Lookups are case-insensitive.
            CREATE TABLE IF NOT EXISTS genre_cache (
                artist          TEXT PRIMARY KEY COLLATE NOCASE,
                genres          TEXT NOT NULL,
                source          TEXT NOT NULL,
                mbid            TEXT,
                last_fetched    INTEGER NOT NULL
            );

            -- Singleton checkpoint for resumable batch classification
            CREATE TABLE IF NOT EXISTS classification_progress (
                id              TEXT PRIMARY KEY,
                results         TEXT NOT NULL,
                current_index   INTEGER NOT NULL,
                total           INTEGER NOT NULL,
                cancelled       INTEGER NOT NULL DEFAULT 0,
                updated_at      INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS settings (
                key     TEXT PRIMARY KEY,
                value   TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }
}
