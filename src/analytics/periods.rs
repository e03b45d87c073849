use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, Duration, Local, NaiveDate, TimeZone};
use serde::Serialize;

use super::GenreMap;
use crate::UNKNOWN_GENRE;
use crate::db::models::ListeningEvent;

/// Granularity for time-bucketed views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimePeriod {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl TimePeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimePeriod::Daily => "daily",
            TimePeriod::Weekly => "weekly",
            TimePeriod::Monthly => "monthly",
            TimePeriod::Quarterly => "quarterly",
            TimePeriod::Yearly => "yearly",
        }
    }
}

impl std::str::FromStr for TimePeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(TimePeriod::Daily),
            "weekly" => Ok(TimePeriod::Weekly),
            "monthly" => Ok(TimePeriod::Monthly),
            "quarterly" => Ok(TimePeriod::Quarterly),
            "yearly" => Ok(TimePeriod::Yearly),
            other => Err(format!(
                "unknown period '{other}' (daily, weekly, monthly, quarterly, yearly)"
            )),
        }
    }
}

/// Pick a bucket size that keeps chart density sane for the library size.
pub fn suggest_optimal_period(listen_count: usize) -> TimePeriod {
    if listen_count < 100 {
        TimePeriod::Daily
    } else if listen_count < 1_000 {
        TimePeriod::Weekly
    } else if listen_count < 10_000 {
        TimePeriod::Monthly
    } else if listen_count < 50_000 {
        TimePeriod::Quarterly
    } else {
        TimePeriod::Yearly
    }
}

/// One genre's share of a period bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenreCount {
    pub genre: String,
    pub count: usize,
    /// Genre mentions over bucket listen count, in percent. Multi-genre
    /// artists make these sum past 100.
    pub percentage: f64,
}

/// One time bucket of the grouped dataset.
#[derive(Debug, Clone, Serialize)]
pub struct PeriodGroup {
    /// Bucket start, Unix seconds, truncated on the local calendar.
    pub period_start: i64,
    pub label: String,
    pub listen_count: usize,
    /// Plays per artist inside the bucket.
    pub artist_plays: HashMap<String, usize>,
    /// Descending by count.
    pub genres: Vec<GenreCount>,
}

/// Truncate a timestamp to the start of its local-calendar period.
/// Weeks start on the preceding Sunday.
pub fn period_start(ts: i64, period: TimePeriod) -> i64 {
    let Some(local) = Local.timestamp_opt(ts, 0).earliest() else {
        return ts;
    };
    let date = local.date_naive();

    let start_date = match period {
        TimePeriod::Daily => date,
        TimePeriod::Weekly => {
            date - Duration::days(date.weekday().num_days_from_sunday() as i64)
        }
        TimePeriod::Monthly => date.with_day(1).unwrap_or(date),
        TimePeriod::Quarterly => {
            let month = (date.month0() / 3) * 3 + 1;
            NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
        }
        TimePeriod::Yearly => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
    };

    let midnight = start_date.and_hms_opt(0, 0, 0).unwrap_or_default();
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.timestamp())
        .unwrap_or(ts)
}

/// Human label for a bucket ("Mar 7, 2021", "Q1 2021", ...).
pub fn period_label(period_start: i64, period: TimePeriod) -> String {
    let Some(local) = Local.timestamp_opt(period_start, 0).earliest() else {
        return period_start.to_string();
    };
    match period {
        TimePeriod::Daily => local.format("%b %-d, %Y").to_string(),
        TimePeriod::Weekly => format!("Week of {}", local.format("%b %-d, %Y")),
        TimePeriod::Monthly => local.format("%B %Y").to_string(),
        TimePeriod::Quarterly => {
            format!("Q{} {}", local.month0() / 3 + 1, local.year())
        }
        TimePeriod::Yearly => local.year().to_string(),
    }
}

/// Group listens into calendar buckets with per-bucket genre tallies.
///
/// Every listen counts toward its bucket; artists without a genre-map entry
/// count as Unknown. Buckets come back ascending, genres within a bucket
/// descending by count.
pub fn group_by_period(
    events: &[ListeningEvent],
    period: TimePeriod,
    genre_map: &GenreMap,
) -> Vec<PeriodGroup> {
    let unknown = vec![UNKNOWN_GENRE.to_string()];
    let mut buckets: BTreeMap<i64, (usize, HashMap<String, usize>, HashMap<String, usize>)> =
        BTreeMap::new();

    for event in events {
        let start = period_start(event.listened_at, period);
        let (listen_count, artist_plays, genre_counts) = buckets.entry(start).or_default();
        *listen_count += 1;
        *artist_plays.entry(event.artist_name.clone()).or_default() += 1;

        let genres = genre_map.get(&event.artist_name).unwrap_or(&unknown);
        for genre in genres {
            *genre_counts.entry(genre.clone()).or_default() += 1;
        }
    }

    buckets
        .into_iter()
        .map(|(start, (listen_count, artist_plays, genre_counts))| {
            let mut genres: Vec<GenreCount> = genre_counts
                .into_iter()
                .map(|(genre, count)| GenreCount {
                    genre,
                    count,
                    percentage: count as f64 / listen_count as f64 * 100.0,
                })
                .collect();
            genres.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.genre.cmp(&b.genre)));

            PeriodGroup {
                period_start: start,
                label: period_label(start, period),
                listen_count,
                artist_plays,
                genres,
            }
        })
        .collect()
}

/// Per-genre count delta between one period and the next.
#[derive(Debug, Clone, Serialize)]
pub struct GenreTransition {
    pub genre: String,
    pub from_count: usize,
    pub to_count: usize,
    pub change: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeriodTransition {
    pub from_period: String,
    pub to_period: String,
    pub transitions: Vec<GenreTransition>,
}

/// Period-over-period genre deltas across consecutive buckets.
pub fn genre_transitions(groups: &[PeriodGroup]) -> Vec<PeriodTransition> {
    groups
        .windows(2)
        .map(|pair| {
            let (current, next) = (&pair[0], &pair[1]);
            let current_counts: HashMap<&str, usize> =
                current.genres.iter().map(|g| (g.genre.as_str(), g.count)).collect();
            let next_counts: HashMap<&str, usize> =
                next.genres.iter().map(|g| (g.genre.as_str(), g.count)).collect();

            let mut all: Vec<&str> = current_counts
                .keys()
                .chain(next_counts.keys())
                .copied()
                .collect();
            all.sort_unstable();
            all.dedup();

            let transitions = all
                .into_iter()
                .map(|genre| {
                    let from_count = current_counts.get(genre).copied().unwrap_or(0);
                    let to_count = next_counts.get(genre).copied().unwrap_or(0);
                    GenreTransition {
                        genre: genre.to_string(),
                        from_count,
                        to_count,
                        change: to_count as i64 - from_count as i64,
                    }
                })
                .collect();

            PeriodTransition {
                from_period: current.label.clone(),
                to_period: next.label.clone(),
                transitions,
            }
        })
        .collect()
}

/// Normalized Shannon entropy of a bucket's genre mix, 0 (monoculture)
/// to 1 (uniform).
pub fn genre_diversity(genres: &[GenreCount]) -> f64 {
    if genres.is_empty() {
        return 0.0;
    }
    let total: usize = genres.iter().map(|g| g.count).sum();
    if total == 0 {
        return 0.0;
    }
    let entropy: f64 = genres
        .iter()
        .filter(|g| g.count > 0)
        .map(|g| {
            let p = g.count as f64 / total as f64;
            -(p * p.log2())
        })
        .sum();
    let max_entropy = (genres.len() as f64).log2();
    if max_entropy == 0.0 { 0.0 } else { entropy / max_entropy }
}

/// Most-played artists classified under a genre.
pub fn top_artists_for_genre(
    events: &[ListeningEvent],
    genre_map: &GenreMap,
    genre: &str,
    limit: usize,
) -> Vec<(String, usize)> {
    let unknown = vec![UNKNOWN_GENRE.to_string()];
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for event in events {
        let genres = genre_map.get(&event.artist_name).unwrap_or(&unknown);
        if genres.iter().any(|g| g == genre) {
            *counts.entry(event.artist_name.as_str()).or_default() += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(a, n)| (a.to_string(), n))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn event(artist: &str, ts: i64) -> ListeningEvent {
        let mut e = ListeningEvent::new("test", 0, 0, ts);
        e.artist_name = artist.to_string();
        e
    }

    fn local_ts(y: i32, m: u32, d: u32, h: u32) -> i64 {
        Local
            .with_ymd_and_hms(y, m, d, h, 30, 0)
            .earliest()
            .unwrap()
            .timestamp()
    }

    fn genre_map(pairs: &[(&str, &[&str])]) -> GenreMap {
        pairs
            .iter()
            .map(|(a, gs)| (a.to_string(), gs.iter().map(|g| g.to_string()).collect()))
            .collect()
    }

    #[test]
    fn weekly_buckets_start_on_sunday() {
        // 2021-03-10 was a Wednesday; its week starts Sunday 2021-03-07.
        let start = period_start(local_ts(2021, 3, 10, 15), TimePeriod::Weekly);
        let date = Local
            .timestamp_opt(start, 0)
            .earliest()
            .unwrap()
            .date_naive();
        assert_eq!(date.weekday(), Weekday::Sun);
        assert_eq!(date, NaiveDate::from_ymd_opt(2021, 3, 7).unwrap());
        assert_eq!(period_label(start, TimePeriod::Weekly), "Week of Mar 7, 2021");
    }

    #[test]
    fn quarterly_and_monthly_truncation() {
        let start = period_start(local_ts(2021, 5, 20, 9), TimePeriod::Quarterly);
        assert_eq!(period_label(start, TimePeriod::Quarterly), "Q2 2021");

        let start = period_start(local_ts(2021, 3, 31, 23), TimePeriod::Monthly);
        assert_eq!(period_label(start, TimePeriod::Monthly), "March 2021");

        let start = period_start(local_ts(2021, 12, 31, 23), TimePeriod::Yearly);
        assert_eq!(period_label(start, TimePeriod::Yearly), "2021");
    }

    #[test]
    fn optimal_period_thresholds() {
        assert_eq!(suggest_optimal_period(99), TimePeriod::Daily);
        assert_eq!(suggest_optimal_period(100), TimePeriod::Weekly);
        assert_eq!(suggest_optimal_period(999), TimePeriod::Weekly);
        assert_eq!(suggest_optimal_period(1_000), TimePeriod::Monthly);
        assert_eq!(suggest_optimal_period(10_000), TimePeriod::Quarterly);
        assert_eq!(suggest_optimal_period(50_000), TimePeriod::Yearly);
    }

    #[test]
    fn grouping_counts_and_percentages() {
        let map = genre_map(&[("A", &["rock", "indie"]), ("B", &["rock"])]);
        let events = vec![
            event("A", local_ts(2021, 3, 1, 10)),
            event("B", local_ts(2021, 3, 2, 10)),
            event("C", local_ts(2021, 4, 1, 10)), // unmapped artist
        ];
        let groups = group_by_period(&events, TimePeriod::Monthly, &map);

        assert_eq!(groups.len(), 2);
        let march = &groups[0];
        assert_eq!(march.label, "March 2021");
        assert_eq!(march.listen_count, 2);
        assert_eq!(march.artist_plays["A"], 1);
        let rock = march.genres.iter().find(|g| g.genre == "rock").unwrap();
        assert_eq!(rock.count, 2);
        assert_eq!(rock.percentage, 100.0);
        let indie = march.genres.iter().find(|g| g.genre == "indie").unwrap();
        assert_eq!(indie.percentage, 50.0);
        // Descending by count.
        assert_eq!(march.genres[0].genre, "rock");

        let april = &groups[1];
        assert_eq!(april.genres[0].genre, "Unknown");
    }

    #[test]
    fn transitions_track_deltas() {
        let map = genre_map(&[("A", &["rock"]), ("B", &["jazz"])]);
        let events = vec![
            event("A", local_ts(2021, 3, 1, 10)),
            event("A", local_ts(2021, 3, 2, 10)),
            event("A", local_ts(2021, 4, 1, 10)),
            event("B", local_ts(2021, 4, 2, 10)),
        ];
        let groups = group_by_period(&events, TimePeriod::Monthly, &map);
        let transitions = genre_transitions(&groups);

        assert_eq!(transitions.len(), 1);
        let t = &transitions[0];
        assert_eq!(t.from_period, "March 2021");
        let rock = t.transitions.iter().find(|x| x.genre == "rock").unwrap();
        assert_eq!(rock.change, -1);
        let jazz = t.transitions.iter().find(|x| x.genre == "jazz").unwrap();
        assert_eq!((jazz.from_count, jazz.to_count, jazz.change), (0, 1, 1));
    }

    #[test]
    fn diversity_bounds() {
        let uniform = vec![
            GenreCount { genre: "a".into(), count: 5, percentage: 0.0 },
            GenreCount { genre: "b".into(), count: 5, percentage: 0.0 },
        ];
        assert!((genre_diversity(&uniform) - 1.0).abs() < 1e-9);

        let mono = vec![GenreCount { genre: "a".into(), count: 5, percentage: 0.0 }];
        assert_eq!(genre_diversity(&mono), 0.0);
        assert_eq!(genre_diversity(&[]), 0.0);
    }

    #[test]
    fn top_artists_ranked_for_genre() {
        let map = genre_map(&[("A", &["rock"]), ("B", &["rock"]), ("C", &["jazz"])]);
        let events = vec![
            event("A", 1),
            event("B", 2),
            event("B", 3),
            event("C", 4),
        ];
        let top = top_artists_for_genre(&events, &map, "rock", 10);
        assert_eq!(top, vec![("B".to_string(), 2), ("A".to_string(), 1)]);
    }
}
