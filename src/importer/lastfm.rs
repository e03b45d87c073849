use serde_json::Value;

use super::{ImportError, ParseOutcome, sanitize};
use crate::db::models::ListeningEvent;
use crate::importer::detect::SourceFormat;

/// Parse a Last.fm scrobble export array.
///
/// `date.uts` is epoch seconds, serialized as a string in most dumps.
/// `artist` and `album` appear either as plain strings or as
/// `{ "#text": ... }` objects depending on the export tool.
pub fn parse(data: &Value, batch: usize) -> Result<ParseOutcome, ImportError> {
    let records = data.as_array().ok_or(ImportError::NoRecords)?;
    if records.is_empty() {
        return Err(ImportError::NoRecords);
    }

    let mut events = Vec::new();
    let mut seq = 0usize;

    for record in records {
        let Some(listened_at) = uts(record) else {
            continue;
        };

        let mut event =
            ListeningEvent::new(SourceFormat::LastFm.as_str(), batch, seq, listened_at);
        seq += 1;
        event.track_name = record
            .get("name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(sanitize)
            .unwrap_or_else(|| "Unknown Track".to_string());
        event.artist_name = flexible_text(record.get("artist"), "Unknown Artist");
        event.album_name = flexible_text(record.get("album"), "Unknown Album");

        if let Some(mbid) = record.get("mbid").and_then(Value::as_str) {
            if !mbid.is_empty() {
                event
                    .side_info
                    .insert("mbid".into(), Value::String(mbid.to_string()));
            }
        }

        events.push(event);
    }

    let filtered = records.len() - events.len();
    if filtered > 0 {
        log::warn!("lastfm: {filtered} records without date.uts skipped");
    }

    Ok(ParseOutcome {
        total: records.len(),
        filtered,
        events,
    })
}

fn uts(record: &Value) -> Option<i64> {
    match record.pointer("/date/uts")? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

/// A field that is either a plain string or `{ "#text": ... }`.
fn flexible_text(v: Option<&Value>, default: &str) -> String {
    let text = match v {
        Some(Value::String(s)) => Some(s.as_str()),
        Some(Value::Object(o)) => o.get("#text").and_then(Value::as_str),
        _ => None,
    };
    text.filter(|s| !s.is_empty())
        .map(sanitize)
        .unwrap_or_else(|| default.to_string())
}
