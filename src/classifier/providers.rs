//! Network genre providers behind a single trait, so the cascade and its
//! tests never care which HTTP calls happen underneath.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use super::ratelimit::RateLimiter;
use crate::config::ProviderConfig;

const MUSICBRAINZ_API: &str = "https://musicbrainz.org/ws/2";
const LASTFM_API: &str = "https://ws.audioscrobbler.com/2.0/";
const LISTENBRAINZ_LABS_API: &str = "https://labs.api.listenbrainz.org";

const USER_AGENT: &str = concat!(
    "trackrecord/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/lexicone42/trackrecord)"
);

/// ListenBrainz Labs similarity algorithm identifier.
const SIMILARITY_ALGORITHM: &str =
    "session_based_days_9000_session_300_contribution_5_threshold_15_limit_50_skip_30";

/// Tags a provider returned at most three of.
pub const MAX_TAGS: usize = 3;

/// Outcome of resolving an artist name to a MusicBrainz id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found { mbid: String },
    NotFound,
    /// Network or decode failure; distinct from a clean miss.
    Failed,
}

/// Outcome of one tag lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagLookup {
    Found(Vec<String>),
    NotFound,
    Failed,
}

/// The provider surface the classification cascade runs against.
pub trait GenreProviders: Send + Sync {
    /// MusicBrainz artist search, best match only.
    fn resolve_artist(&self, artist: &str) -> Resolution;
    /// Last.fm artist.getInfo top tags.
    fn artist_info_tags(&self, artist: &str) -> TagLookup;
    /// ListenBrainz Labs similar-artists tag consensus.
    fn similar_artist_tags(&self, mbid: &str) -> TagLookup;
    /// MusicBrainz tags + genres for a resolved artist, by vote count.
    fn artist_tags_by_id(&self, mbid: &str) -> TagLookup;
}

/// Live HTTP implementation with per-provider rate limiting.
pub struct HttpProviders {
    agent: ureq::Agent,
    lastfm_api_key: Option<String>,
    musicbrainz_limiter: RateLimiter,
    listenbrainz_limiter: RateLimiter,
    lastfm_limiter: RateLimiter,
}

impl HttpProviders {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            lastfm_api_key: config.lastfm_api_key.clone(),
            musicbrainz_limiter: RateLimiter::new(config.musicbrainz_rps),
            listenbrainz_limiter: RateLimiter::new(config.listenbrainz_rps),
            lastfm_limiter: RateLimiter::new(config.lastfm_rps),
        }
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ureq::Error> {
        let mut req = self.agent.get(url).header("user-agent", USER_AGENT);
        for (k, v) in query {
            req = req.query(*k, *v);
        }
        req.call()?.body_mut().read_json()
    }
}

#[derive(Debug, Deserialize)]
struct MbSearchResponse {
    #[serde(default)]
    artists: Vec<MbArtist>,
}

#[derive(Debug, Deserialize)]
struct MbArtist {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MbTagsResponse {
    #[serde(default)]
    tags: Vec<MbTag>,
    #[serde(default)]
    genres: Vec<MbTag>,
}

#[derive(Debug, Deserialize)]
struct MbTag {
    name: String,
    #[serde(default)]
    count: i64,
}

impl GenreProviders for HttpProviders {
    fn resolve_artist(&self, artist: &str) -> Resolution {
        let url = format!("{MUSICBRAINZ_API}/artist");
        let result: Result<MbSearchResponse, _> = self.musicbrainz_limiter.throttle(|| {
            self.get_json(&url, &[("query", artist), ("fmt", "json"), ("limit", "1")])
        });
        match result {
            Ok(resp) => match resp.artists.into_iter().next() {
                Some(a) => Resolution::Found { mbid: a.id },
                None => Resolution::NotFound,
            },
            Err(e) => {
                log::warn!("musicbrainz search failed for {artist}: {e}");
                Resolution::Failed
            }
        }
    }

    fn artist_info_tags(&self, artist: &str) -> TagLookup {
        let Some(api_key) = self.lastfm_api_key.as_deref() else {
            log::debug!("no last.fm api key configured, skipping");
            return TagLookup::NotFound;
        };

        let result: Result<Value, _> = self.lastfm_limiter.throttle(|| {
            self.get_json(
                LASTFM_API,
                &[
                    ("method", "artist.getInfo"),
                    ("artist", artist),
                    ("api_key", api_key),
                    ("format", "json"),
                    ("autocorrect", "1"),
                ],
            )
        });

        match result {
            Ok(body) => {
                if body.get("error").is_some() {
                    return TagLookup::NotFound;
                }
                let tags = collect_tag_names(body.pointer("/artist/tags/tag"));
                if tags.is_empty() {
                    TagLookup::NotFound
                } else {
                    TagLookup::Found(tags)
                }
            }
            Err(e) => {
                log::warn!("last.fm lookup failed for {artist}: {e}");
                TagLookup::Failed
            }
        }
    }

    fn similar_artist_tags(&self, mbid: &str) -> TagLookup {
        let url = format!("{LISTENBRAINZ_LABS_API}/similar-artists");
        let result: Result<Value, _> = self.listenbrainz_limiter.throttle(|| {
            self.get_json(
                &url,
                &[("artist_mbid", mbid), ("algorithm", SIMILARITY_ALGORITHM)],
            )
        });

        match result {
            Ok(body) => {
                let tags = tally_similar_tags(&body);
                if tags.is_empty() {
                    TagLookup::NotFound
                } else {
                    TagLookup::Found(tags)
                }
            }
            Err(e) => {
                log::warn!("listenbrainz similar-artists failed for {mbid}: {e}");
                TagLookup::Failed
            }
        }
    }

    fn artist_tags_by_id(&self, mbid: &str) -> TagLookup {
        let url = format!("{MUSICBRAINZ_API}/artist/{mbid}");
        let result: Result<MbTagsResponse, _> = self
            .musicbrainz_limiter
            .throttle(|| self.get_json(&url, &[("fmt", "json"), ("inc", "tags+genres")]));

        match result {
            Ok(resp) => {
                let tags = rank_mb_tags(resp);
                if tags.is_empty() {
                    TagLookup::NotFound
                } else {
                    TagLookup::Found(tags)
                }
            }
            Err(e) => {
                log::warn!("musicbrainz tag lookup failed for {mbid}: {e}");
                TagLookup::Failed
            }
        }
    }
}

/// Pull tag names out of a Last.fm style `tag` array, top three.
fn collect_tag_names(tags: Option<&Value>) -> Vec<String> {
    tags.and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|t| t.get("name").and_then(Value::as_str))
                .map(String::from)
                .take(MAX_TAGS)
                .collect()
        })
        .unwrap_or_default()
}

/// Tally tags across a similar-artists response, most frequent first.
/// Tag entries appear both as plain strings and `{name}` objects.
fn tally_similar_tags(body: &Value) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    if let Some(tags) = body.pointer("/artist/tag").and_then(Value::as_array) {
        for tag in tags {
            let name = match tag {
                Value::String(s) => Some(s.as_str()),
                other => other.get("name").and_then(Value::as_str),
            };
            if let Some(name) = name {
                *counts.entry(name.to_string()).or_default() += 1;
            }
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(MAX_TAGS).map(|(n, _)| n).collect()
}

/// Merge MusicBrainz tag and genre votes, positive counts only,
/// descending by count.
fn rank_mb_tags(resp: MbTagsResponse) -> Vec<String> {
    let mut all: Vec<MbTag> = resp
        .tags
        .into_iter()
        .chain(resp.genres)
        .filter(|t| t.count > 0)
        .collect();
    all.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    all.into_iter().take(MAX_TAGS).map(|t| t.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn similar_tags_tally_and_rank() {
        let body = json!({
            "artist": {
                "tag": ["rock", {"name": "indie"}, "rock", {"name": "rock"}, "indie", "folk"]
            }
        });
        assert_eq!(tally_similar_tags(&body), vec!["rock", "indie", "folk"]);
        assert!(tally_similar_tags(&json!({})).is_empty());
    }

    #[test]
    fn mb_tags_merge_and_filter_zero_counts() {
        let resp: MbTagsResponse = serde_json::from_value(json!({
            "tags": [
                {"name": "seen live", "count": 0},
                {"name": "rock", "count": 12}
            ],
            "genres": [
                {"name": "alternative rock", "count": 20},
                {"name": "britpop", "count": 5},
                {"name": "electronic", "count": 4}
            ]
        }))
        .unwrap();
        assert_eq!(
            rank_mb_tags(resp),
            vec!["alternative rock", "rock", "britpop"]
        );
    }

    #[test]
    fn lastfm_tag_names_capped() {
        let tags = json!([
            {"name": "a"}, {"name": "b"}, {"name": "c"}, {"name": "d"}
        ]);
        assert_eq!(collect_tag_names(Some(&tags)), vec!["a", "b", "c"]);
        assert!(collect_tag_names(None).is_empty());
    }
}
