//! Offline genre guessing from artist names.
//!
//! Runs before any network lookup and serves as the fallback when every
//! provider comes up empty. Coarse by design; its output is a last resort.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::UNKNOWN_GENRE;

/// At most this many genres survive any classification.
pub const MAX_GENRES: usize = 3;

/// Genre -> substrings of an artist name that suggest it.
fn genre_keywords() -> &'static [(&'static str, &'static [&'static str])] {
    &[
        ("Rock", &["rock", "metal", "punk", "grunge"]),
        ("Pop", &["pop"]),
        ("Hip Hop", &["rap", "hip hop", "trap", "drill", "grime"]),
        (
            "Electronic",
            &["edm", "house", "techno", "trance", "dubstep", "drum and bass", "electronic"],
        ),
        ("R&B", &["r&b", "soul"]),
        ("Country", &["country", "bluegrass", "americana"]),
        ("Jazz", &["jazz", "bebop", "swing"]),
        ("Classical", &["classical", "orchestra", "symphony", "opera", "baroque"]),
        ("Folk", &["folk", "acoustic"]),
        ("Latin", &["reggaeton", "salsa", "bachata", "banda"]),
        ("Reggae", &["reggae", "ska"]),
        ("Blues", &["blues"]),
        ("Funk", &["funk", "disco"]),
        ("Indie", &["indie", "lo-fi"]),
    ]
}

/// First word of the artist name -> likely genres.
fn first_word_patterns() -> &'static HashMap<&'static str, &'static [&'static str]> {
    static MAP: OnceLock<HashMap<&'static str, &'static [&'static str]>> = OnceLock::new();
    MAP.get_or_init(|| {
        HashMap::from([
            ("dj", &["Electronic"][..]),
            ("mc", &["Hip Hop"][..]),
            ("lil", &["Hip Hop"][..]),
            ("young", &["Hip Hop"][..]),
            ("the", &["Rock", "Indie"][..]),
            ("band", &["Rock"][..]),
            ("orchestra", &["Classical"][..]),
            ("quartet", &["Classical", "Jazz"][..]),
            ("ensemble", &["Classical"][..]),
            ("choir", &["Classical"][..]),
        ])
    })
}

/// Name suffix -> likely genres.
fn suffix_patterns() -> &'static [(&'static str, &'static [&'static str])] {
    &[
        ("beats", &["Hip Hop", "Electronic"]),
        ("boy", &["Hip Hop", "Pop"]),
        ("girl", &["Pop"]),
        ("band", &["Rock"]),
        ("orchestra", &["Classical"]),
        ("ensemble", &["Classical", "Jazz"]),
    ]
}

fn featuring() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(ft\.|feat\.|featuring)\b").expect("featuring pattern"))
}

fn long_digits() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{3,}").expect("digits pattern"))
}

/// Guess genres from the artist name alone. Never fails; returns
/// `["Unknown"]` when nothing matches.
pub fn classify_by_heuristics(artist_name: &str) -> Vec<String> {
    let normalized = artist_name.to_lowercase().trim().to_string();
    if normalized.is_empty() {
        return vec![UNKNOWN_GENRE.to_string()];
    }

    // Insertion-ordered set; dedup keeps the first occurrence.
    let mut genres: Vec<&str> = Vec::new();
    let mut add = |genre: &'static str, genres: &mut Vec<&str>| {
        if !genres.contains(&genre) {
            genres.push(genre);
        }
    };

    for (genre, keywords) in genre_keywords() {
        if keywords.iter().any(|k| normalized.contains(k)) {
            add(genre, &mut genres);
        }
    }

    let words: Vec<&str> = normalized.split_whitespace().collect();
    let first = words.first().copied().unwrap_or("");
    let last = words.last().copied().unwrap_or("");

    if let Some(hits) = first_word_patterns().get(first) {
        for genre in *hits {
            add(genre, &mut genres);
        }
    }

    for (suffix, hits) in suffix_patterns() {
        if last.contains(suffix) || normalized.ends_with(suffix) {
            for genre in *hits {
                add(genre, &mut genres);
            }
        }
    }

    if featuring().is_match(&normalized) {
        add("Hip Hop", &mut genres);
    }
    if normalized.contains(['&', '+']) {
        add("Pop", &mut genres);
        add("R&B", &mut genres);
    }
    if long_digits().is_match(&normalized) {
        add("Electronic", &mut genres);
    }

    if genres.is_empty() {
        return vec![UNKNOWN_GENRE.to_string()];
    }
    genres.truncate(MAX_GENRES);
    genres.into_iter().map(String::from).collect()
}

/// Combine provider genres with heuristic genres, provider first, capped.
/// Unusable provider results defer entirely to the heuristics.
pub fn merge_genres(heuristic: &[String], api: &[String]) -> Vec<String> {
    if api.is_empty() || api.iter().any(|g| g == UNKNOWN_GENRE) {
        return heuristic.to_vec();
    }
    // A sentinel-only heuristic has nothing to contribute.
    let heuristic: Vec<&String> = heuristic
        .iter()
        .filter(|g| g.as_str() != UNKNOWN_GENRE)
        .collect();
    if heuristic.is_empty() {
        return api.to_vec();
    }

    let mut combined: Vec<String> = Vec::new();
    for genre in api.iter().chain(heuristic.into_iter()) {
        if !combined.contains(genre) {
            combined.push(genre.clone());
        }
    }
    combined.truncate(MAX_GENRES);
    combined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_word_patterns_fire() {
        assert_eq!(classify_by_heuristics("DJ Shadow"), vec!["Electronic"]);
        assert!(classify_by_heuristics("Lil Wayne").contains(&"Hip Hop".to_string()));
        let the = classify_by_heuristics("The National");
        assert_eq!(the, vec!["Rock", "Indie"]);
    }

    #[test]
    fn keywords_and_suffixes_fire() {
        assert!(classify_by_heuristics("Boston Symphony Orchestra")
            .contains(&"Classical".to_string()));
        assert!(classify_by_heuristics("Freak Folk Collective").contains(&"Folk".to_string()));
        assert!(classify_by_heuristics("Metro Beats").contains(&"Hip Hop".to_string()));
    }

    #[test]
    fn character_heuristics_fire() {
        assert!(classify_by_heuristics("Artist featuring Someone").contains(&"Hip Hop".to_string()));
        let amp = classify_by_heuristics("Simon & Garfunkel");
        assert!(amp.contains(&"Pop".to_string()) && amp.contains(&"R&B".to_string()));
        assert!(classify_by_heuristics("Blink-182 2000").contains(&"Electronic".to_string())
            || classify_by_heuristics("Crew 808s").contains(&"Electronic".to_string()));
    }

    #[test]
    fn unmatched_names_are_unknown_and_capped_at_three() {
        assert_eq!(classify_by_heuristics("Radiohead"), vec!["Unknown"]);
        assert_eq!(classify_by_heuristics(""), vec!["Unknown"]);
        assert!(classify_by_heuristics("The Jazz Funk Orchestra feat. MC").len() <= MAX_GENRES);
    }

    #[test]
    fn merge_prefers_api_and_caps() {
        let heuristic = vec!["Rock".to_string(), "Indie".to_string()];
        let api = vec!["Alternative".to_string(), "Rock".to_string()];
        assert_eq!(
            merge_genres(&heuristic, &api),
            vec!["Alternative", "Rock", "Indie"]
        );

        // Unusable API output defers to heuristics.
        assert_eq!(merge_genres(&heuristic, &[]), heuristic);
        assert_eq!(
            merge_genres(&heuristic, &["Unknown".to_string()]),
            heuristic
        );
        assert_eq!(merge_genres(&[], &api), api);
    }

    #[test]
    fn merge_drops_heuristic_sentinel() {
        // An unmatched artist name must not smuggle "Unknown" alongside a
        // real provider answer.
        let unknown = vec!["Unknown".to_string()];
        let api = vec!["art rock".to_string()];
        assert_eq!(merge_genres(&unknown, &api), api);

        let mixed = vec!["Rock".to_string(), "Unknown".to_string()];
        assert_eq!(
            merge_genres(&mixed, &api),
            vec!["art rock", "Rock"]
        );
    }
}
