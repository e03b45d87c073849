//! Gateway-artist detection.
//!
//! A gateway artist is one whose discovery precedes a jump in how much of
//! the listener's diet their primary genre takes up. This is correlation
//! over two periods either side of the discovery, not causation; results
//! are leads to explore, not conclusions.

use std::collections::HashMap;

use serde::Serialize;

use super::GenreMap;
use super::periods::PeriodGroup;
use crate::UNKNOWN_GENRE;
use crate::config::GatewayConfig;
use crate::db::models::ListeningEvent;

/// Neighboring periods examined on each side of the discovery period.
const WINDOW: usize = 2;

#[derive(Debug, Clone, Serialize)]
pub struct GatewayArtist {
    pub artist: String,
    pub first_track: String,
    /// Unix seconds of the first listen.
    pub first_listen: i64,
    /// The artist's primary genre, whose share grew.
    pub trigger_genre: String,
    /// Percentage-point growth of the trigger genre's share.
    pub growth: f64,
    pub before_percentage: f64,
    pub after_percentage: f64,
    /// Plays inside the discovery period.
    pub discovery_plays: usize,
    pub total_plays: usize,
    pub period_label: String,
    pub period_index: usize,
}

/// Find artists whose discovery coincided with a genre-share jump.
///
/// An artist qualifies when they first appear in a period with at least
/// `min_first_period_listens` plays there, and their primary genre's share
/// of all genre mentions across the two following periods exceeds the two
/// preceding ones by `min_growth_points` or more. Sorted by growth,
/// descending.
pub fn detect_gateway_artists(
    groups: &[PeriodGroup],
    genre_map: &GenreMap,
    events: &[ListeningEvent],
    config: &GatewayConfig,
) -> Vec<GatewayArtist> {
    let mut first_appearance: HashMap<&str, (i64, &str)> = HashMap::new();
    let mut total_plays: HashMap<&str, usize> = HashMap::new();
    for event in events {
        first_appearance
            .entry(event.artist_name.as_str())
            .or_insert((event.listened_at, event.track_name.as_str()));
        *total_plays.entry(event.artist_name.as_str()).or_default() += 1;
    }

    let now = chrono::Utc::now().timestamp();
    let mut gateways = Vec::new();

    for (i, period) in groups.iter().enumerate() {
        let period_end = groups
            .get(i + 1)
            .map(|next| next.period_start)
            .unwrap_or(now);

        for (artist, &plays) in &period.artist_plays {
            let Some(&(first_ts, first_track)) = first_appearance.get(artist.as_str()) else {
                continue;
            };
            // Only artists discovered in this period.
            if first_ts < period.period_start || first_ts >= period_end {
                continue;
            }
            if (plays as u64) < config.min_first_period_listens {
                continue;
            }

            let unknown = vec![UNKNOWN_GENRE.to_string()];
            let genres = genre_map.get(artist).unwrap_or(&unknown);
            let Some(primary) = genres.first() else {
                continue;
            };

            let before = &groups[i.saturating_sub(WINDOW)..i];
            let after = &groups[(i + 1).min(groups.len())..(i + 1 + WINDOW).min(groups.len())];

            let before_pct = genre_share(before, genre_map, primary);
            let after_pct = genre_share(after, genre_map, primary);
            let growth = after_pct - before_pct;

            if growth >= config.min_growth_points {
                gateways.push(GatewayArtist {
                    artist: artist.clone(),
                    first_track: first_track.to_string(),
                    first_listen: first_ts,
                    trigger_genre: primary.clone(),
                    growth,
                    before_percentage: before_pct,
                    after_percentage: after_pct,
                    discovery_plays: plays,
                    total_plays: total_plays.get(artist.as_str()).copied().unwrap_or(0),
                    period_label: period.label.clone(),
                    period_index: i,
                });
            }
        }
    }

    gateways.sort_by(|a, b| {
        b.growth
            .partial_cmp(&a.growth)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.artist.cmp(&b.artist))
    });
    gateways
}

/// One genre's share of all genre mentions across a slice of periods,
/// in percent.
fn genre_share(periods: &[PeriodGroup], genre_map: &GenreMap, genre: &str) -> f64 {
    let unknown = vec![UNKNOWN_GENRE.to_string()];
    let mut genre_count = 0usize;
    let mut total_mentions = 0usize;

    for period in periods {
        for (artist, &plays) in &period.artist_plays {
            let genres = genre_map.get(artist).unwrap_or(&unknown);
            for g in genres {
                total_mentions += plays;
                if g == genre {
                    genre_count += plays;
                }
            }
        }
    }

    if total_mentions == 0 {
        0.0
    } else {
        genre_count as f64 / total_mentions as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::periods::{TimePeriod, group_by_period};
    use chrono::{Local, TimeZone};

    fn event(artist: &str, track: &str, ts: i64) -> ListeningEvent {
        let mut e = ListeningEvent::new("test", 0, 0, ts);
        e.artist_name = artist.to_string();
        e.track_name = track.to_string();
        e
    }

    fn local_ts(y: i32, m: u32, d: u32) -> i64 {
        Local
            .with_ymd_and_hms(y, m, d, 12, 0, 0)
            .earliest()
            .unwrap()
            .timestamp()
    }

    fn map(pairs: &[(&str, &[&str])]) -> GenreMap {
        pairs
            .iter()
            .map(|(a, gs)| (a.to_string(), gs.iter().map(|g| g.to_string()).collect()))
            .collect()
    }

    /// Months of pop listening, then an electronic artist discovered with
    /// heavy rotation, then the diet shifts toward electronic.
    fn synthetic() -> (Vec<ListeningEvent>, GenreMap) {
        let mut events = Vec::new();
        // Jan + Feb: pop only, below the discovery-play threshold so the
        // pop artist cannot itself qualify against an empty before-window.
        for month in [1, 2] {
            for day in 1..=8 {
                events.push(event("PopStar", "Hit", local_ts(2021, month, day)));
            }
        }
        // March: Daft Punk discovered, 12 plays.
        for day in 1..=12 {
            events.push(event("Daft Punk", "Da Funk", local_ts(2021, 3, day)));
        }
        for day in 16..=20 {
            events.push(event("PopStar", "Hit", local_ts(2021, 3, day)));
        }
        // April + May: mostly electronic now.
        for month in [4, 5] {
            for day in 1..=12 {
                events.push(event("Daft Punk", "Around", local_ts(2021, month, day)));
            }
            for day in 20..=22 {
                events.push(event("PopStar", "Hit", local_ts(2021, month, day)));
            }
        }
        let map = map(&[("PopStar", &["Pop"]), ("Daft Punk", &["Electronic", "House"])]);
        (events, map)
    }

    #[test]
    fn detects_the_synthetic_gateway() {
        let (events, genre_map) = synthetic();
        let groups = group_by_period(&events, TimePeriod::Monthly, &genre_map);
        let gateways =
            detect_gateway_artists(&groups, &genre_map, &events, &GatewayConfig::default());

        assert_eq!(gateways.len(), 1);
        let g = &gateways[0];
        assert_eq!(g.artist, "Daft Punk");
        assert_eq!(g.trigger_genre, "Electronic");
        assert_eq!(g.first_track, "Da Funk");
        assert_eq!(g.discovery_plays, 12);
        assert!(g.growth >= 5.0);
        assert!(g.after_percentage > g.before_percentage);
    }

    #[test]
    fn few_discovery_plays_disqualify() {
        let (events, genre_map) = synthetic();
        let groups = group_by_period(&events, TimePeriod::Monthly, &genre_map);
        let config = GatewayConfig {
            min_first_period_listens: 50,
            ..Default::default()
        };
        assert!(detect_gateway_artists(&groups, &genre_map, &events, &config).is_empty());
    }

    #[test]
    fn growth_threshold_is_configurable() {
        let (events, genre_map) = synthetic();
        let groups = group_by_period(&events, TimePeriod::Monthly, &genre_map);
        let config = GatewayConfig {
            min_growth_points: 1000.0,
            ..Default::default()
        };
        assert!(detect_gateway_artists(&groups, &genre_map, &events, &config).is_empty());
    }

    #[test]
    fn share_is_over_total_genre_mentions() {
        let genre_map = map(&[("A", &["rock", "indie"]), ("B", &["jazz"])]);
        let events = vec![
            event("A", "t", local_ts(2021, 1, 1)),
            event("B", "t", local_ts(2021, 1, 2)),
        ];
        let groups = group_by_period(&events, TimePeriod::Monthly, &genre_map);
        // Three genre mentions total, one of which is jazz.
        let share = genre_share(&groups, &genre_map, "jazz");
        assert!((share - 100.0 / 3.0).abs() < 1e-9);
    }
}
