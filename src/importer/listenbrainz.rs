use serde_json::Value;

use super::{ImportError, ParseOutcome, sanitize};
use crate::db::models::ListeningEvent;
use crate::importer::detect::SourceFormat;

/// Parse a ListenBrainz export: either the raw listen array or the
/// `payload.listens` API-response wrapper.
pub fn parse(data: &Value, batch: usize) -> Result<ParseOutcome, ImportError> {
    let listens = data
        .as_array()
        .or_else(|| data.pointer("/payload/listens").and_then(Value::as_array))
        .ok_or(ImportError::NoRecords)?;

    if listens.is_empty() {
        return Err(ImportError::NoRecords);
    }

    let now = chrono::Utc::now().timestamp();
    let mut events = Vec::with_capacity(listens.len());

    for (seq, listen) in listens.iter().enumerate() {
        let meta = listen.get("track_metadata");
        let listened_at = match listen.get("listened_at").and_then(Value::as_i64) {
            Some(ts) => ts,
            None => {
                log::warn!("listen #{seq} has no listened_at, defaulting to now");
                now
            }
        };

        let mut event =
            ListeningEvent::new(SourceFormat::ListenBrainz.as_str(), batch, seq, listened_at);
        event.track_name = text_field(meta, "track_name", "Unknown Track");
        event.artist_name = text_field(meta, "artist_name", "Unknown Artist");
        event.album_name = text_field(meta, "release_name", "Unknown Album");

        if let Some(msid) = listen.get("recording_msid").and_then(Value::as_str) {
            event
                .side_info
                .insert("recording_msid".into(), Value::String(msid.to_string()));
        }
        if let Some(info) = meta.and_then(|m| m.get("additional_info")) {
            if !info.is_null() {
                event.side_info.insert("additional_info".into(), info.clone());
            }
        }

        events.push(event);
    }

    Ok(ParseOutcome {
        total: listens.len(),
        filtered: 0,
        events,
    })
}

fn text_field(meta: Option<&Value>, key: &str, default: &str) -> String {
    meta.and_then(|m| m.get(key))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(sanitize)
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_raw_array() {
        let data = json!([
            {
                "listened_at": 1_600_000_000,
                "recording_msid": "msid-1",
                "track_metadata": {
                    "track_name": "Karma Police",
                    "artist_name": "Radiohead",
                    "release_name": "OK Computer",
                    "additional_info": {"duration_ms": 261000}
                }
            }
        ]);
        let outcome = parse(&data, 3).unwrap();
        assert_eq!(outcome.total, 1);
        assert_eq!(outcome.filtered, 0);
        let e = &outcome.events[0];
        assert_eq!(e.id, "listenbrainz-3-0-1600000000");
        assert_eq!(e.track_name, "Karma Police");
        assert_eq!(e.album_name, "OK Computer");
        assert_eq!(
            e.side_info["recording_msid"],
            Value::String("msid-1".into())
        );
        assert!(e.side_info.contains_key("additional_info"));
    }

    #[test]
    fn parses_api_wrapper_and_defaults() {
        let data = json!({
            "payload": {
                "listens": [
                    {"track_metadata": {"artist_name": "Someone"}}
                ]
            }
        });
        let outcome = parse(&data, 0).unwrap();
        let e = &outcome.events[0];
        assert_eq!(e.track_name, "Unknown Track");
        assert_eq!(e.artist_name, "Someone");
        assert_eq!(e.album_name, "Unknown Album");
        // Missing listened_at defaults to roughly now.
        assert!(e.listened_at > 1_600_000_000);
    }

    #[test]
    fn strips_markup_from_fields() {
        let data = json!([
            {
                "listened_at": 1_600_000_000,
                "track_metadata": {
                    "track_name": "<script>alert(1)</script>Song",
                    "artist_name": "<b>Artist</b>"
                }
            }
        ]);
        let outcome = parse(&data, 0).unwrap();
        assert_eq!(outcome.events[0].track_name, "Song");
        assert_eq!(outcome.events[0].artist_name, "Artist");
    }

    #[test]
    fn empty_array_is_an_error() {
        assert!(matches!(
            parse(&json!([]), 0),
            Err(ImportError::NoRecords)
        ));
    }
}
