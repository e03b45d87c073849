use serde_json::Value;

use super::ImportError;

/// Recognized export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    ListenBrainz,
    Spotify,
    LastFm,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::ListenBrainz => "listenbrainz",
            SourceFormat::Spotify => "spotify",
            SourceFormat::LastFm => "lastfm",
        }
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sniff the export format from parsed JSON, falling back to the filename.
/// Pure; rules are checked in order and the first match wins.
pub fn detect(data: &Value, filename: &str) -> Result<SourceFormat, ImportError> {
    if let Some(first) = data.as_array().and_then(|a| a.first()) {
        if first.get("listened_at").is_some() && first.get("track_metadata").is_some() {
            return Ok(SourceFormat::ListenBrainz);
        }
        if first.get("ts").is_some() && first.get("master_metadata_track_name").is_some() {
            return Ok(SourceFormat::Spotify);
        }
        if first.pointer("/date/uts").is_some() && first.get("artist").is_some() {
            return Ok(SourceFormat::LastFm);
        }
    }

    // ListenBrainz API responses wrap the array in a payload object.
    if data
        .pointer("/payload/listens")
        .is_some_and(Value::is_array)
    {
        return Ok(SourceFormat::ListenBrainz);
    }

    let lower = filename.to_lowercase();
    if lower.contains("spotify")
        || lower.contains("streaming_history")
        || lower.contains("streaminghistory")
    {
        return Ok(SourceFormat::Spotify);
    }
    if lower.contains("listenbrainz") {
        return Ok(SourceFormat::ListenBrainz);
    }
    if lower.contains("lastfm") || lower.contains("last.fm") {
        return Ok(SourceFormat::LastFm);
    }

    Err(ImportError::UnknownFormat {
        filename: filename.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_listenbrainz_array() {
        let data = json!([{"listened_at": 1600000000, "track_metadata": {}}]);
        assert_eq!(detect(&data, "x.json").unwrap(), SourceFormat::ListenBrainz);
    }

    #[test]
    fn detects_spotify_array() {
        let data = json!([{"ts": "2021-01-01T00:00:00Z", "master_metadata_track_name": "A"}]);
        assert_eq!(detect(&data, "x.json").unwrap(), SourceFormat::Spotify);
    }

    #[test]
    fn detects_lastfm_array() {
        let data = json!([{"date": {"uts": "1600000000"}, "artist": "Someone", "name": "Song"}]);
        assert_eq!(detect(&data, "x.json").unwrap(), SourceFormat::LastFm);
    }

    #[test]
    fn detects_listenbrainz_api_wrapper() {
        let data = json!({"payload": {"listens": []}});
        assert_eq!(detect(&data, "x.json").unwrap(), SourceFormat::ListenBrainz);
    }

    #[test]
    fn content_rules_win_over_filename() {
        let data = json!([{"listened_at": 1600000000, "track_metadata": {}}]);
        assert_eq!(
            detect(&data, "spotify_export.json").unwrap(),
            SourceFormat::ListenBrainz
        );
    }

    #[test]
    fn filename_fallback() {
        let empty = json!([]);
        assert_eq!(
            detect(&empty, "StreamingHistory0.json").unwrap(),
            SourceFormat::Spotify
        );
        assert_eq!(
            detect(&empty, "my-listenbrainz-dump.json").unwrap(),
            SourceFormat::ListenBrainz
        );
        assert_eq!(
            detect(&empty, "last.fm-scrobbles.json").unwrap(),
            SourceFormat::LastFm
        );
    }

    #[test]
    fn unknown_format_errors() {
        let data = json!([{"foo": 1}]);
        let err = detect(&data, "mystery.json").unwrap_err();
        assert!(err.to_string().contains("mystery.json"));
    }
}
