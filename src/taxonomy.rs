//! Closed genre vocabulary and tag validation.
//!
//! Provider tags are noisy: languages, nationalities, vocal descriptors and
//! the artist's own name all show up as "genres". Everything is checked
//! against a canonical vocabulary; salvageable tags (languages, regions) are
//! mapped, the rest are dropped.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::UNKNOWN_GENRE;
use crate::db::models::{GenreCleanupReport, ListeningEvent};

/// Canonical genre vocabulary, all lowercase.
static VALID_GENRES: &[&str] = &[
    // Electronic
    "electronic", "house", "deep house", "tech house", "progressive house", "electro house",
    "techno", "minimal techno", "detroit techno",
    "trance", "psytrance", "progressive trance", "uplifting trance",
    "dubstep", "brostep", "riddim",
    "drum and bass", "jungle", "liquid funk", "neurofunk",
    "edm", "big room", "future bass", "trap", "melodic dubstep",
    "ambient", "dark ambient", "drone",
    "downtempo", "trip hop", "chillwave",
    "electro", "electroclash",
    "idm", "glitch", "breakcore",
    "synthwave", "outrun", "darksynth",
    "vaporwave", "future funk",
    "hardstyle", "hardcore", "gabber",
    // Rock
    "rock", "classic rock", "album rock", "arena rock",
    "indie rock", "indie", "alternative rock", "alternative", "modern rock",
    "punk rock", "punk", "pop punk", "post-punk", "hardcore punk",
    "hard rock", "heavy metal", "metal", "thrash metal", "death metal", "black metal",
    "progressive rock", "prog rock", "art rock",
    "psychedelic rock", "psychedelic", "acid rock",
    "garage rock", "garage", "surf rock",
    "grunge", "post-grunge",
    "emo", "screamo", "metalcore", "deathcore",
    "stoner rock", "sludge metal", "doom metal",
    // Pop
    "pop", "dance-pop", "electropop", "synth-pop", "synthpop",
    "indie pop", "dream pop", "bedroom pop",
    "art pop", "experimental pop", "avant-pop",
    "k-pop", "j-pop", "c-pop",
    "power pop", "bubblegum pop",
    "teen pop", "boy band", "girl group",
    // Hip hop
    "hip hop", "rap", "hip-hop",
    "trap music",
    "boom bap", "golden age hip hop",
    "conscious hip hop", "political hip hop",
    "underground hip hop", "alternative hip hop",
    "gangsta rap", "west coast hip hop", "east coast hip hop", "southern hip hop",
    "mumble rap", "emo rap", "cloud rap",
    "drill", "grime",
    "instrumental hip hop", "lo-fi hip hop", "chillhop",
    // Jazz and blues
    "jazz",
    "bebop", "hard bop",
    "cool jazz", "west coast jazz",
    "free jazz", "avant-garde jazz",
    "modal jazz", "spiritual jazz",
    "jazz fusion", "fusion", "jazz-rock",
    "smooth jazz", "contemporary jazz",
    "swing", "big band", "dixieland",
    "gypsy jazz", "manouche",
    "latin jazz", "afro-cuban jazz", "bossa nova jazz",
    "post-bop", "chamber jazz",
    "blues", "delta blues", "chicago blues", "electric blues",
    "rhythm and blues", "r&b", "rnb",
    "jump blues", "blues rock",
    // Classical
    "classical", "classical music",
    "baroque", "early music", "renaissance",
    "classical period", "romantic", "romantic period",
    "contemporary classical", "modern classical", "20th century classical",
    "minimalism", "minimalist",
    "orchestral", "symphonic", "chamber music",
    "opera", "choral", "vocal",
    "piano", "solo piano",
    // Folk and country
    "folk", "traditional folk", "contemporary folk",
    "indie folk", "freak folk", "psych folk",
    "americana", "roots", "roots rock",
    "country", "contemporary country", "country pop",
    "outlaw country", "alt-country", "alternative country",
    "bluegrass", "old-time", "appalachian",
    "folk rock", "folk pop",
    "singer-songwriter", "acoustic",
    // Soul and funk
    "soul", "southern soul", "northern soul",
    "neo soul", "neo-soul", "alternative r&b",
    "funk", "p-funk", "g-funk",
    "disco", "nu-disco", "disco house",
    "motown", "philadelphia soul",
    "quiet storm", "contemporary r&b",
    // World
    "world", "world music", "world fusion", "ethnic",
    "latin", "latin pop", "salsa", "bachata", "merengue", "cumbia",
    "reggae", "roots reggae", "dub", "dancehall", "reggaeton",
    "ska", "rocksteady", "2 tone",
    "afrobeat", "afro-funk", "highlife",
    "bossa nova", "mpb", "samba", "tropicalia",
    "flamenco", "fado", "tango",
    "bollywood", "indian classical", "raga", "hindustani", "carnatic",
    "celtic", "irish folk", "scottish folk",
    "middle eastern", "arabic", "klezmer",
    "african", "malian", "congolese",
    // Everything else
    "experimental", "avant-garde", "noise",
    "instrumental", "post-rock", "math rock",
    "lo-fi", "lo-fi beats", "chillout", "chill",
    "soundtrack", "score", "film score", "video game music",
    "new age", "meditative", "healing",
    "industrial", "ebm", "dark wave",
    "shoegaze", "noise pop",
    "ska punk", "celtic punk",
    "christian", "gospel", "praise", "worship",
    "comedy", "spoken word", "audiobook",
    "children", "kids music", "lullaby",
];

fn valid_genres() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| VALID_GENRES.iter().copied().collect())
}

/// Tag patterns that are never genres.
fn invalid_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // Languages
            r"(?i)\b(english|spanish|french|german|italian|portuguese|japanese|korean|chinese|hindi|arabic|russian|mandarin|cantonese)\b",
            // Vocal descriptors
            r"(?i)\b(male|female|vocalist|singer|voice|vocals)\b",
            // Nationalities
            r"(?i)\b(american|british|canadian|australian|european|asian|african|indian)\b",
            // Decade markers
            r"(?i)\b(60s|70s|80s|90s|2000s|2010s|2020s|sixties|seventies|eighties|nineties)\b",
            // Vague qualifiers
            r"(?i)\b(good|bad|popular|underground|mainstream|commercial)\b",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("invalid-tag pattern"))
        .collect()
    })
}

/// "new age" and "modern classical" are genres; "new stuff" is not.
/// Matches the temporal qualifier + following word so the exception words
/// can be checked (the pattern itself cannot express the exception).
fn temporal_qualifier() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(new|old|modern|classic|contemporary)\s+(\w+)")
            .expect("temporal qualifier pattern")
    })
}

const TEMPORAL_EXCEPTIONS: &[&str] = &["age", "wave", "jazz", "classical", "folk"];

fn language_mapping() -> &'static HashMap<&'static str, &'static str> {
    static MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    MAP.get_or_init(|| {
        HashMap::from([
            ("hindi", "bollywood"),
            ("japanese", "j-pop"),
            ("korean", "k-pop"),
            ("spanish", "latin"),
            ("portuguese", "latin"),
            ("mandarin", "c-pop"),
            ("cantonese", "c-pop"),
        ])
    })
}

fn region_mapping() -> &'static HashMap<&'static str, &'static str> {
    static MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    MAP.get_or_init(|| {
        HashMap::from([
            ("india", "bollywood"),
            ("indian", "indian classical"),
            ("china", "c-pop"),
            ("japan", "j-pop"),
            ("korea", "k-pop"),
        ])
    })
}

/// Outcome of validating one provider tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Verdict {
    /// Keep the tag as the given canonical form.
    Valid { normalized: String, was_mapped: bool },
    /// Drop the tag.
    Invalid { reason: InvalidReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InvalidReason {
    ArtistName,
    InvalidPattern,
    NotInTaxonomy,
}

/// Validate a provider tag against the vocabulary.
/// Empty, "unknown" and "other" are valid as the Unknown sentinel.
pub fn validate(tag: &str, artist: Option<&str>) -> Verdict {
    let normalized = tag.to_lowercase().trim().to_string();

    if normalized.is_empty() || normalized == "unknown" || normalized == "other" {
        return Verdict::Valid {
            normalized: UNKNOWN_GENRE.to_string(),
            was_mapped: false,
        };
    }

    if let Some(artist) = artist {
        if normalized == artist.to_lowercase() {
            return Verdict::Invalid {
                reason: InvalidReason::ArtistName,
            };
        }
    }

    if valid_genres().contains(normalized.as_str()) {
        return Verdict::Valid {
            normalized,
            was_mapped: false,
        };
    }

    if let Some(mapped) = language_mapping()
        .get(normalized.as_str())
        .or_else(|| region_mapping().get(normalized.as_str()))
    {
        return Verdict::Valid {
            normalized: mapped.to_string(),
            was_mapped: true,
        };
    }

    for pattern in invalid_patterns() {
        if pattern.is_match(&normalized) {
            return Verdict::Invalid {
                reason: InvalidReason::InvalidPattern,
            };
        }
    }

    if let Some(caps) = temporal_qualifier().captures(&normalized) {
        let following = caps[2].to_lowercase();
        if !TEMPORAL_EXCEPTIONS.contains(&following.as_str()) {
            return Verdict::Invalid {
                reason: InvalidReason::InvalidPattern,
            };
        }
    }

    Verdict::Invalid {
        reason: InvalidReason::NotInTaxonomy,
    }
}

/// Run every event's genre list through validation in place.
/// Events whose tags all fail are set to `["Unknown"]`.
pub fn clean_genre_data(events: &mut [ListeningEvent]) -> GenreCleanupReport {
    let mut report = GenreCleanupReport {
        total: events.len(),
        ..Default::default()
    };

    for event in events.iter_mut() {
        let mut kept = Vec::new();
        let mut mapped_here = false;
        let mut artist_name_here = false;

        for tag in &event.genres {
            match validate(tag, Some(&event.artist_name)) {
                Verdict::Valid {
                    normalized,
                    was_mapped,
                } => {
                    if was_mapped {
                        mapped_here = true;
                    }
                    kept.push(normalized);
                }
                Verdict::Invalid { reason } => {
                    report.total_removed += 1;
                    if reason == InvalidReason::ArtistName {
                        artist_name_here = true;
                    }
                }
            }
        }

        if kept.is_empty() {
            kept.push(UNKNOWN_GENRE.to_string());
        }
        event.genres = kept;

        if mapped_here {
            report.languages_mapped += 1;
        }
        if artist_name_here {
            report.artist_names_removed += 1;
        }
        if !event.genres.iter().any(|g| g == UNKNOWN_GENRE) {
            report.with_valid_genres += 1;
        }
        if event.genres.len() == 1 && event.genres[0] == UNKNOWN_GENRE {
            report.set_to_unknown += 1;
        }
    }

    log::info!(
        "genre cleanup: {} listens, {} tags removed, {} mapped, {} set to Unknown",
        report.total,
        report.total_removed,
        report.languages_mapped,
        report.set_to_unknown
    );
    report
}

/// Per-genre listen counts across a dataset, descending, Unknown excluded.
pub fn genre_stats(events: &[ListeningEvent]) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for event in events {
        for genre in &event.genres {
            if genre != UNKNOWN_GENRE {
                *counts.entry(genre).or_default() += 1;
            }
        }
    }
    let mut stats: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(g, n)| (g.to_string(), n))
        .collect();
    stats.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    stats
}
