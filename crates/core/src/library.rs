//! Helpers over a whole song library.

use crate::models::{FingerprintId, Song};
use std::collections::HashMap;

/// Songs sharing a fingerprint id, in first-seen order. Songs without an id
/// never form a group.
pub fn duplicate_groups(songs: &[Song]) -> Vec<Vec<&Song>> {
    let mut order: Vec<FingerprintId> = Vec::new();
    let mut groups: HashMap<FingerprintId, Vec<&Song>> = HashMap::new();
    for song in songs {
        let Some(id) = song.fingerprint_id else {
            continue;
        };
        let group = groups.entry(id).or_default();
        if group.is_empty() {
            order.push(id);
        }
        group.push(song);
    }
    order
        .into_iter()
        .filter_map(|id| groups.remove(&id))
        .filter(|group| group.len() > 1)
        .collect()
}

/// Copies of the other songs of `updated`'s fingerprint whose rating differs,
/// carrying `updated`'s rating.
pub fn propagate_rating(updated: &Song, library: &[Song]) -> Vec<Song> {
    let Some(id) = updated.fingerprint_id else {
        return Vec::new();
    };
    library
        .iter()
        .filter(|s| s.fingerprint_id == Some(id) && s.path != updated.path)
        .filter(|s| s.rating != updated.rating)
        .map(|s| Song {
            rating: updated.rating,
            ..s.clone()
        })
        .collect()
}
