use serde_json::Value;

use super::{ImportError, ParseOutcome, sanitize};
use crate::db::models::ListeningEvent;
use crate::importer::detect::SourceFormat;
use crate::timestamp::{self, RawTimestamp};

/// Minimum play length to count as a listen. Spotify logs every skip.
const MIN_MS_PLAYED: i64 = 30_000;

/// Parse a Spotify extended streaming history array.
///
/// The `ts` encoding varies between export vintages (ISO strings, epoch
/// numbers, even spreadsheet serials); it is detected once from the first
/// entry that has one.
pub fn parse(data: &Value, batch: usize) -> Result<ParseOutcome, ImportError> {
    let records = data.as_array().ok_or(ImportError::NoRecords)?;
    if records.is_empty() {
        return Err(ImportError::NoRecords);
    }

    let first_ts = records
        .iter()
        .find_map(|r| raw_timestamp(r.get("ts")))
        .ok_or(ImportError::NoTimestamps)?;
    let format = timestamp::detect_format(&first_ts);
    log::info!("spotify timestamp format: {format:?}");

    let now = chrono::Utc::now().timestamp();
    let mut events = Vec::new();
    let mut seq = 0usize;

    for record in records {
        let raw_ts = raw_timestamp(record.get("ts"));
        let track = record
            .get("master_metadata_track_name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());
        let artist = record
            .get("master_metadata_album_artist_name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());
        let ms_played = record
            .get("ms_played")
            .and_then(Value::as_i64)
            .unwrap_or(0);

        let (Some(raw_ts), Some(track), Some(artist)) = (raw_ts, track, artist) else {
            continue;
        };
        if ms_played < MIN_MS_PLAYED {
            continue;
        }

        let listened_at = match timestamp::convert(&raw_ts) {
            Some(ts) => ts,
            None => {
                log::warn!("unconvertible spotify timestamp {raw_ts:?}, defaulting to now");
                now
            }
        };

        let mut event =
            ListeningEvent::new(SourceFormat::Spotify.as_str(), batch, seq, listened_at);
        seq += 1;
        event.track_name = sanitize(track);
        event.artist_name = sanitize(artist);
        event.album_name = record
            .get("master_metadata_album_album_name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(sanitize)
            .unwrap_or_else(|| "Unknown Album".to_string());

        event
            .side_info
            .insert("ms_played".into(), Value::from(ms_played));
        // Raw ts kept for timestamp recovery after a bad conversion.
        if let Some(orig) = record.get("ts") {
            event.side_info.insert("original_timestamp".into(), orig.clone());
        }
        for key in ["spotify_track_uri", "shuffle", "skipped", "offline"] {
            if let Some(v) = record.get(key) {
                if !v.is_null() {
                    event.side_info.insert(key.into(), v.clone());
                }
            }
        }

        events.push(event);
    }

    let filtered = records.len() - events.len();
    if filtered > 0 {
        log::info!(
            "spotify: kept {} of {} records ({filtered} filtered)",
            events.len(),
            records.len()
        );
    }

    Ok(ParseOutcome {
        total: records.len(),
        filtered,
        events,
    })
}

fn raw_timestamp(v: Option<&Value>) -> Option<RawTimestamp> {
    match v? {
        Value::String(s) => Some(RawTimestamp::Text(s.clone())),
        Value::Number(n) => n.as_i64().map(RawTimestamp::Number),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(ts: Value, track: &str, artist: &str, ms: i64) -> Value {
        json!({
            "ts": ts,
            "master_metadata_track_name": track,
            "master_metadata_album_artist_name": artist,
            "master_metadata_album_album_name": "Album",
            "ms_played": ms,
            "spotify_track_uri": "spotify:track:abc",
            "shuffle": true,
            "skipped": false
        })
    }

    #[test]
    fn filters_short_plays_and_missing_fields() {
        let data = json!([
            record(json!("2021-01-01T00:00:00Z"), "Keeper", "Artist", 200_000),
            record(json!("2021-01-01T00:10:00Z"), "Skip", "Artist", 10_000),
            {"ts": "2021-01-01T00:20:00Z", "ms_played": 200_000},
        ]);
        let outcome = parse(&data, 0).unwrap();
        assert_eq!(outcome.total, 3);
        assert_eq!(outcome.filtered, 2);
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].track_name, "Keeper");
        assert_eq!(outcome.events[0].listened_at, 1_609_459_200);
    }

    #[test]
    fn exactly_thirty_seconds_is_kept() {
        let data = json!([record(json!("2021-01-01T00:00:00Z"), "Edge", "Artist", 30_000)]);
        let outcome = parse(&data, 0).unwrap();
        assert_eq!(outcome.events.len(), 1);
    }

    #[test]
    fn serial_date_timestamps_convert() {
        let data = json!([record(json!(44_561), "Old Export", "Artist", 60_000)]);
        let outcome = parse(&data, 0).unwrap();
        assert_eq!(outcome.events[0].listened_at, 1_640_908_800);
        assert_eq!(
            outcome.events[0].side_info["original_timestamp"],
            json!(44_561)
        );
    }

    #[test]
    fn side_info_preserved() {
        let data = json!([record(json!(1_609_459_200), "Song", "Artist", 45_000)]);
        let e = &parse(&data, 2).unwrap().events[0];
        assert_eq!(e.id, "spotify-2-0-1609459200");
        assert_eq!(e.side_info["ms_played"], json!(45_000));
        assert_eq!(e.side_info["spotify_track_uri"], json!("spotify:track:abc"));
        assert_eq!(e.side_info["shuffle"], json!(true));
    }

    #[test]
    fn no_timestamps_at_all_is_an_error() {
        let data = json!([{"master_metadata_track_name": "X"}]);
        assert!(matches!(parse(&data, 0), Err(ImportError::NoTimestamps)));
    }
}
