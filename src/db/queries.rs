use std::collections::HashMap;

use rusqlite::{OptionalExtension, params};

use super::models::{
    ClassificationProgress, GenreCacheEntry, GenreMetadata, LibraryStats, ListeningEvent,
};
use super::{Database, Result};

/// Row id of the singleton classification checkpoint.
const PROGRESS_ROW_ID: &str = "genre_classification";

impl Database {
    /// Read every stored listen, ascending by timestamp.
    pub fn get_all_listens(&self) -> Result<Vec<ListeningEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, listened_at, track_name, artist_name, album_name,
                    genres, genre_metadata, source, side_info
             FROM listens ORDER BY listened_at, id",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut events = Vec::with_capacity(rows.len());
        for (id, listened_at, track, artist, album, genres, meta, source, side) in rows {
            events.push(ListeningEvent {
                id,
                listened_at,
                track_name: track,
                artist_name: artist,
                album_name: album,
                genres: serde_json::from_str(&genres)?,
                genre_metadata: match meta {
                    Some(m) => serde_json::from_str(&m)?,
                    None => GenreMetadata::default(),
                },
                source,
                side_info: serde_json::from_str(&side)?,
            });
        }
        Ok(events)
    }

    pub fn count_listens(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM listens", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Replace the whole listens table with a merged dataset.
    /// Clear plus bulk insert in a single transaction.
    pub fn replace_listens(&self, events: &[ListeningEvent]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM listens", [])?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO listens (
                    id, listened_at, track_name, artist_name, album_name,
                    genres, genre_metadata, source, side_info
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for e in events {
                stmt.execute(params![
                    e.id,
                    e.listened_at,
                    e.track_name,
                    e.artist_name,
                    e.album_name,
                    serde_json::to_string(&e.genres)?,
                    serde_json::to_string(&e.genre_metadata)?,
                    e.source,
                    serde_json::to_string(&e.side_info)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Back-fill genres onto stored listens from an artist -> genres map.
    /// Artist matching is exact on the stored name. Returns updated row count.
    pub fn apply_genre_map(
        &self,
        genre_map: &HashMap<String, Vec<String>>,
        source: &str,
    ) -> Result<usize> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let tx = self.conn.unchecked_transaction()?;
        let mut updated = 0;
        {
            let mut stmt = tx.prepare_cached(
                "UPDATE listens SET genres = ?1, genre_metadata = ?2 WHERE artist_name = ?3",
            )?;
            for (artist, genres) in genre_map {
                let meta = GenreMetadata {
                    source: Some(source.to_string()),
                    cached: false,
                    needs_fetch: false,
                    last_fetched: Some(now_ms),
                };
                updated += stmt.execute(params![
                    serde_json::to_string(genres)?,
                    serde_json::to_string(&meta)?,
                    artist,
                ])?;
            }
        }
        tx.commit()?;
        Ok(updated)
    }

    /// All distinct artist names in the library.
    pub fn get_all_artists(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT artist_name FROM listens ORDER BY artist_name")?;
        let artists = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(artists)
    }

    // --- Genre cache ---

    /// Case-insensitive cache lookup. TTL is the caller's concern.
    pub fn get_cached_genres(&self, artist: &str) -> Result<Option<GenreCacheEntry>> {
        let row = self
            .conn
            .query_row(
                "SELECT artist, genres, source, mbid, last_fetched
                 FROM genre_cache WHERE artist = ?1",
                params![artist],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((artist, genres, source, mbid, last_fetched)) => Ok(Some(GenreCacheEntry {
                artist,
                genres: serde_json::from_str(&genres)?,
                source,
                mbid,
                last_fetched,
            })),
            None => Ok(None),
        }
    }

    pub fn put_cached_genres(&self, entry: &GenreCacheEntry) -> Result<()> {
        self.conn.execute(
            "INSERT INTO genre_cache (artist, genres, source, mbid, last_fetched)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(artist) DO UPDATE SET
                genres = excluded.genres,
                source = excluded.source,
                mbid = excluded.mbid,
                last_fetched = excluded.last_fetched",
            params![
                entry.artist,
                serde_json::to_string(&entry.genres)?,
                entry.source,
                entry.mbid,
                entry.last_fetched,
            ],
        )?;
        Ok(())
    }

    pub fn get_all_cached_genres(&self) -> Result<Vec<GenreCacheEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT artist, genres, source, mbid, last_fetched
             FROM genre_cache ORDER BY artist",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut entries = Vec::with_capacity(rows.len());
        for (artist, genres, source, mbid, last_fetched) in rows {
            entries.push(GenreCacheEntry {
                artist,
                genres: serde_json::from_str(&genres)?,
                source,
                mbid,
                last_fetched,
            });
        }
        Ok(entries)
    }

    pub fn clear_genre_cache(&self) -> Result<usize> {
        let n = self.conn.execute("DELETE FROM genre_cache", [])?;
        Ok(n)
    }

    // --- Classification checkpoint ---

    pub fn save_progress(&self, progress: &ClassificationProgress) -> Result<()> {
        self.conn.execute(
            "INSERT INTO classification_progress
                (id, results, current_index, total, cancelled, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                results = excluded.results,
                current_index = excluded.current_index,
                total = excluded.total,
                cancelled = excluded.cancelled,
                updated_at = excluded.updated_at",
            params![
                PROGRESS_ROW_ID,
                serde_json::to_string(&progress.results)?,
                progress.current_index as i64,
                progress.total as i64,
                progress.cancelled as i64,
                progress.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_progress(&self) -> Result<Option<ClassificationProgress>> {
        let row = self
            .conn
            .query_row(
                "SELECT results, current_index, total, cancelled, updated_at
                 FROM classification_progress WHERE id = ?1",
                params![PROGRESS_ROW_ID],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((results, current_index, total, cancelled, updated_at)) => {
                Ok(Some(ClassificationProgress {
                    results: serde_json::from_str(&results)?,
                    current_index: current_index as usize,
                    total: total as usize,
                    cancelled: cancelled != 0,
                    updated_at,
                }))
            }
            None => Ok(None),
        }
    }

    pub fn clear_progress(&self) -> Result<()> {
        self.conn.execute(
            "DELETE FROM classification_progress WHERE id = ?1",
            params![PROGRESS_ROW_ID],
        )?;
        Ok(())
    }

    // --- Settings ---

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_all_settings(&self) -> Result<HashMap<String, String>> {
        let mut stmt = self.conn.prepare("SELECT key, value FROM settings")?;
        let settings = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<HashMap<_, _>, _>>()?;
        Ok(settings)
    }

    pub fn replace_settings(&self, settings: &HashMap<String, String>) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM settings", [])?;
        {
            let mut stmt =
                tx.prepare_cached("INSERT INTO settings (key, value) VALUES (?1, ?2)")?;
            for (key, value) in settings {
                stmt.execute(params![key, value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // --- Stats ---

    pub fn library_stats(&self) -> Result<LibraryStats> {
        let (total_listens, unique_artists, unique_tracks): (i64, i64, i64) =
            self.conn.query_row(
                "SELECT COUNT(*), COUNT(DISTINCT artist_name),
                        COUNT(DISTINCT track_name || '|||' || artist_name)
                 FROM listens",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

        let (earliest, latest): (Option<i64>, Option<i64>) = self.conn.query_row(
            "SELECT MIN(listened_at), MAX(listened_at) FROM listens",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let mut stmt = self.conn.prepare(
            "SELECT source, COUNT(*) FROM genre_cache GROUP BY source ORDER BY COUNT(*) DESC",
        )?;
        let cache_by_source = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as usize)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // Genre counts come from the JSON column, tallied in Rust.
        let mut genre_counts: HashMap<String, usize> = HashMap::new();
        let mut stmt = self.conn.prepare("SELECT genres FROM listens")?;
        let genre_rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for raw in genre_rows {
            let genres: Vec<String> = serde_json::from_str(&raw)?;
            for g in genres {
                if g != crate::UNKNOWN_GENRE {
                    *genre_counts.entry(g).or_default() += 1;
                }
            }
        }
        let mut top_genres: Vec<(String, usize)> = genre_counts.into_iter().collect();
        top_genres.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_genres.truncate(10);

        Ok(LibraryStats {
            total_listens: total_listens as usize,
            unique_artists: unique_artists as usize,
            unique_tracks: unique_tracks as usize,
            earliest,
            latest,
            top_genres,
            cache_by_source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, ts: i64, track: &str, artist: &str) -> ListeningEvent {
        let mut e = ListeningEvent::new("test", 0, 0, ts);
        e.id = id.to_string();
        e.track_name = track.to_string();
        e.artist_name = artist.to_string();
        e.album_name = "Album".to_string();
        e
    }

    #[test]
    fn replace_and_read_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let events = vec![
            event("a", 1_600_000_100, "Song B", "Artist One"),
            event("b", 1_600_000_000, "Song A", "Artist Two"),
        ];
        db.replace_listens(&events).unwrap();

        let stored = db.get_all_listens().unwrap();
        assert_eq!(stored.len(), 2);
        // Read back ascending by timestamp.
        assert_eq!(stored[0].id, "b");
        assert_eq!(stored[1].id, "a");
        assert_eq!(stored[0].genres, vec!["Unknown".to_string()]);

        // Replace clears previous contents.
        db.replace_listens(&events[..1]).unwrap();
        assert_eq!(db.count_listens().unwrap(), 1);
    }

    #[test]
    fn cache_lookup_is_case_insensitive() {
        let db = Database::open_in_memory().unwrap();
        db.put_cached_genres(&GenreCacheEntry {
            artist: "Radiohead".into(),
            genres: vec!["Alternative Rock".into()],
            source: "musicbrainz".into(),
            mbid: Some("a74b1b7f".into()),
            last_fetched: 1_000,
        })
        .unwrap();

        let hit = db.get_cached_genres("radiohead").unwrap().unwrap();
        assert_eq!(hit.genres, vec!["Alternative Rock".to_string()]);
        assert!(db.get_cached_genres("Nobody").unwrap().is_none());
    }

    #[test]
    fn cache_upsert_overwrites() {
        let db = Database::open_in_memory().unwrap();
        let mut entry = GenreCacheEntry {
            artist: "Daft Punk".into(),
            genres: vec!["Electronic".into()],
            source: "heuristic".into(),
            mbid: None,
            last_fetched: 1,
        };
        db.put_cached_genres(&entry).unwrap();
        entry.genres = vec!["House".into(), "Electronic".into()];
        entry.source = "lastfm".into();
        db.put_cached_genres(&entry).unwrap();

        let hit = db.get_cached_genres("daft punk").unwrap().unwrap();
        assert_eq!(hit.source, "lastfm");
        assert_eq!(hit.genres.len(), 2);
        assert_eq!(db.get_all_cached_genres().unwrap().len(), 1);
    }

    #[test]
    fn progress_round_trip_and_clear() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_progress().unwrap().is_none());

        let mut results = HashMap::new();
        results.insert("Artist".to_string(), vec!["Rock".to_string()]);
        db.save_progress(&ClassificationProgress {
            results,
            current_index: 5,
            total: 10,
            cancelled: false,
            updated_at: 123,
        })
        .unwrap();

        let p = db.get_progress().unwrap().unwrap();
        assert_eq!(p.current_index, 5);
        assert_eq!(p.results["Artist"], vec!["Rock".to_string()]);

        db.clear_progress().unwrap();
        assert!(db.get_progress().unwrap().is_none());
    }

    #[test]
    fn apply_genre_map_back_fills() {
        let db = Database::open_in_memory().unwrap();
        db.replace_listens(&[
            event("a", 1_600_000_000, "Song", "Radiohead"),
            event("b", 1_600_000_100, "Other", "Someone Else"),
        ])
        .unwrap();

        let mut map = HashMap::new();
        map.insert("Radiohead".to_string(), vec!["Alternative Rock".to_string()]);
        let updated = db.apply_genre_map(&map, "musicbrainz").unwrap();
        assert_eq!(updated, 1);

        let stored = db.get_all_listens().unwrap();
        let radiohead = stored.iter().find(|e| e.artist_name == "Radiohead").unwrap();
        assert_eq!(radiohead.genres, vec!["Alternative Rock".to_string()]);
        assert!(!radiohead.genre_metadata.needs_fetch);
        let other = stored.iter().find(|e| e.artist_name == "Someone Else").unwrap();
        assert_eq!(other.genres, vec!["Unknown".to_string()]);
    }

    #[test]
    fn settings_round_trip() {
        let db = Database::open_in_memory().unwrap();
        db.set_setting("theme", "dark").unwrap();
        db.set_setting("theme", "light").unwrap();
        assert_eq!(db.get_setting("theme").unwrap().as_deref(), Some("light"));

        let mut replacement = HashMap::new();
        replacement.insert("period".to_string(), "monthly".to_string());
        db.replace_settings(&replacement).unwrap();
        assert!(db.get_setting("theme").unwrap().is_none());
        assert_eq!(db.get_all_settings().unwrap().len(), 1);
    }

    #[test]
    fn library_stats_counts() {
        let db = Database::open_in_memory().unwrap();
        let mut a = event("a", 1_600_000_000, "Song", "Artist One");
        a.genres = vec!["Rock".into()];
        let b = event("b", 1_600_000_100, "Song", "Artist One");
        let c = event("c", 1_600_000_200, "Other", "Artist Two");
        db.replace_listens(&[a, b, c]).unwrap();

        let stats = db.library_stats().unwrap();
        assert_eq!(stats.total_listens, 3);
        assert_eq!(stats.unique_artists, 2);
        assert_eq!(stats.unique_tracks, 2);
        assert_eq!(stats.earliest, Some(1_600_000_000));
        assert_eq!(stats.latest, Some(1_600_000_200));
        assert_eq!(stats.top_genres, vec![("Rock".to_string(), 1)]);
    }
}
