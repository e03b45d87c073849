//! Listening-history analytics: time-period aggregation and discovery
//! pattern detection.

pub mod gateway;
pub mod periods;

use std::collections::HashMap;

use crate::db::models::ListeningEvent;

/// Artist -> classified genres, as produced by the classifier.
pub type GenreMap = HashMap<String, Vec<String>>;

/// Build an artist genre map from the genres stored on listens.
/// A classified answer beats an earlier Unknown for the same artist.
pub fn genre_map_from_events(events: &[ListeningEvent]) -> GenreMap {
    let mut map = GenreMap::new();
    for event in events {
        let entry = map
            .entry(event.artist_name.clone())
            .or_insert_with(|| event.genres.clone());
        if event.has_known_genres() && entry.first().map(String::as_str) == Some(crate::UNKNOWN_GENRE)
        {
            *entry = event.genres.clone();
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classified_genres_beat_unknown() {
        let mut a = ListeningEvent::new("test", 0, 0, 1_600_000_000);
        a.artist_name = "Radiohead".into();
        let mut b = ListeningEvent::new("test", 0, 1, 1_600_000_100);
        b.artist_name = "Radiohead".into();
        b.genres = vec!["Rock".into()];

        let map = genre_map_from_events(&[a, b]);
        assert_eq!(map["Radiohead"], vec!["Rock"]);
    }
}
