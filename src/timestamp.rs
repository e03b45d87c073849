use chrono::{DateTime, NaiveDateTime};
use serde::Serialize;

use crate::db::models::ListeningEvent;

/// Earliest timestamp accepted into the dataset: Jan 1, 2000 (music streaming era).
pub const MIN_VALID_TIMESTAMP: i64 = 946_684_800;

/// Latest timestamp accepted: Jan 19, 2038 (Unix 32-bit limit).
pub const MAX_VALID_TIMESTAMP: i64 = 2_147_483_647;

/// Epoch of the 1900-based spreadsheet serial date system (1900-01-01 UTC).
const SERIAL_DATE_EPOCH: i64 = -2_208_988_800;

const SECS_PER_DAY: i64 = 86_400;

/// Any epoch value above this is assumed to be milliseconds.
const MS_THRESHOLD: i64 = 10_000_000_000;

/// A raw timestamp value as found in an export record.
#[derive(Debug, Clone, PartialEq)]
pub enum RawTimestamp {
    Text(String),
    Number(i64),
}

/// Detected encoding of a raw timestamp value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampFormat {
    Iso8601,
    UnixMillis,
    UnixSeconds,
    SerialDate,
    Unknown,
}

/// Detect the encoding of a raw timestamp without converting it.
pub fn detect_format(raw: &RawTimestamp) -> TimestampFormat {
    match raw {
        RawTimestamp::Text(s) if s.contains('T') => TimestampFormat::Iso8601,
        RawTimestamp::Text(_) => TimestampFormat::Unknown,
        RawTimestamp::Number(n) => {
            if *n > 1_000_000_000_000 {
                TimestampFormat::UnixMillis
            } else if *n >= 1_000_000_000 && *n < 2_000_000_000 {
                TimestampFormat::UnixSeconds
            } else if *n >= 40_000 && *n < 60_000 {
                TimestampFormat::SerialDate
            } else {
                TimestampFormat::Unknown
            }
        }
    }
}

/// Convert a raw timestamp to canonical Unix seconds.
/// Returns None when the encoding cannot be determined or parsed.
pub fn convert(raw: &RawTimestamp) -> Option<i64> {
    match detect_format(raw) {
        TimestampFormat::Iso8601 => match raw {
            RawTimestamp::Text(s) => parse_iso8601(s),
            RawTimestamp::Number(_) => None,
        },
        TimestampFormat::UnixMillis => match raw {
            RawTimestamp::Number(n) => Some(n.div_euclid(1000)),
            RawTimestamp::Text(_) => None,
        },
        TimestampFormat::UnixSeconds => match raw {
            RawTimestamp::Number(n) => Some(*n),
            RawTimestamp::Text(_) => None,
        },
        TimestampFormat::SerialDate => match raw {
            RawTimestamp::Number(n) => Some(serial_date_to_unix(*n)),
            RawTimestamp::Text(_) => None,
        },
        TimestampFormat::Unknown => None,
    }
}

/// Parse an ISO-8601 date-time string to Unix seconds.
/// Accepts both offset-carrying ("...Z", "...+02:00") and naive forms.
pub fn parse_iso8601(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc().timestamp());
    }
    None
}

/// Convert a 1900-based spreadsheet serial day count to Unix seconds.
///
/// The serial system counts days from 1899-12-31 and treats 1900 as a leap
/// year (it was not), so serials above 60 are shifted by 2 days and serials
/// at or below 60 by 1 day.
pub fn serial_date_to_unix(serial: i64) -> i64 {
    let adjusted = if serial > 60 { serial - 2 } else { serial - 1 };
    SERIAL_DATE_EPOCH + adjusted * SECS_PER_DAY
}

/// The everywhere-applied millisecond guard: epoch values on a millisecond
/// scale are floored down to seconds, anything else passes through.
pub fn normalize_epoch(ts: i64) -> i64 {
    if ts > MS_THRESHOLD {
        ts.div_euclid(1000)
    } else {
        ts
    }
}

/// Is a canonical-seconds timestamp inside the accepted window?
pub fn in_valid_window(ts: i64) -> bool {
    (MIN_VALID_TIMESTAMP..=MAX_VALID_TIMESTAMP).contains(&ts)
}

/// One problem record noted during batch validation.
#[derive(Debug, Clone, Serialize)]
pub struct TimestampIssue {
    pub index: usize,
    pub track: String,
    pub artist: String,
    pub issue: String,
    pub original: i64,
}

/// Report from a batch timestamp validation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TimestampStats {
    pub original: usize,
    pub valid: usize,
    pub removed: usize,
    pub converted_from_ms: usize,
    pub recovered: usize,
    pub issues: Vec<TimestampIssue>,
}

/// Maximum issue samples retained in a validation report.
const MAX_ISSUE_SAMPLES: usize = 5;

/// Validate and clean every event's timestamp, dropping events that cannot be
/// brought into the valid window. Per-record filter; never fatal by itself.
///
/// Out-of-window events get one recovery attempt via the `original_timestamp`
/// annotation in their side-info bag (preserved by the Spotify parser).
pub fn validate_and_clean(events: Vec<ListeningEvent>) -> (Vec<ListeningEvent>, TimestampStats) {
    let mut stats = TimestampStats {
        original: events.len(),
        ..Default::default()
    };
    let mut kept = Vec::with_capacity(events.len());

    for (index, mut event) in events.into_iter().enumerate() {
        let original = event.listened_at;
        let mut ts = original;

        if ts > MS_THRESHOLD {
            ts = ts.div_euclid(1000);
            stats.converted_from_ms += 1;
        }

        if !in_valid_window(ts) {
            if let Some(recovered) = recover_from_side_info(&event) {
                log::info!(
                    "recovered timestamp for \"{}\" by {} via original_timestamp",
                    event.track_name,
                    event.artist_name
                );
                ts = recovered;
                stats.recovered += 1;
            }
        }

        if !in_valid_window(ts) {
            if stats.issues.len() < MAX_ISSUE_SAMPLES {
                stats.issues.push(TimestampIssue {
                    index,
                    track: event.track_name.clone(),
                    artist: event.artist_name.clone(),
                    issue: if ts < MIN_VALID_TIMESTAMP {
                        "timestamp too early (before 2000)".into()
                    } else {
                        "timestamp too late (after 2038)".into()
                    },
                    original,
                });
            }
            stats.removed += 1;
            continue;
        }

        event.listened_at = ts;
        kept.push(event);
    }

    stats.valid = kept.len();
    if stats.removed > 0 {
        log::warn!("removed {} listens with invalid timestamps", stats.removed);
    }
    (kept, stats)
}

/// Try to recover an in-window timestamp from the record's preserved
/// original-timestamp annotation.
fn recover_from_side_info(event: &ListeningEvent) -> Option<i64> {
    let raw = event.side_info.get("original_timestamp")?;
    let candidate = match raw {
        serde_json::Value::String(s) => parse_iso8601(s)?,
        serde_json::Value::Number(n) => normalize_epoch(n.as_i64()?),
        _ => return None,
    };
    in_valid_window(candidate).then_some(candidate)
}
