use crate::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Opaque key of a record inside one store.
pub type FingerprintId = i64;

/// Ratings are persisted as fixed-point integers.
pub const RATING_SCALE: i64 = 1000;

pub fn rating_to_int(rating: f64) -> i64 {
    (rating.clamp(0.0, 1.0) * RATING_SCALE as f64).round() as i64
}

pub fn rating_to_float(rating: i64) -> f64 {
    rating as f64 / RATING_SCALE as f64
}

pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Listening statistics kept per fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub last_played: i64,
    pub last_started: i64,
    pub play_count: i64,
    pub rating: i64,
    pub skip_count: i64,
    pub playlists: String,
}

#[derive(Debug, Clone)]
pub struct Record {
    pub fingerprint_id: FingerprintId,
    pub fingerprint: Fingerprint,
    pub basename: String,
    pub dirname: String,
    pub created_at: i64,
    /// `None` until stats were set explicitly; zeroed stats are not authoritative.
    pub updated_at: Option<i64>,
    pub stats: Stats,
}

impl Record {
    /// A record for a newly seen track whose rating was never set.
    pub fn empty(fingerprint: Fingerprint, basename: &str, dirname: &str, now: i64) -> Self {
        Self {
            fingerprint_id: 0,
            fingerprint,
            basename: basename.to_string(),
            dirname: dirname.to_string(),
            created_at: now,
            updated_at: None,
            stats: Stats::default(),
        }
    }

    pub fn has_stats(&self) -> bool {
        self.updated_at.is_some()
    }

    /// Most recent timestamp of any kind, used by windowed sync.
    pub fn last_activity(&self) -> i64 {
        [
            self.stats.last_played,
            self.stats.last_started,
            self.created_at,
            self.updated_at.unwrap_or(0),
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

/// A library song as handed over by the host application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub path: PathBuf,
    pub fingerprint_id: Option<FingerprintId>,
    /// Fixed-point rating; `None` when the user never rated the song.
    pub rating: Option<i64>,
    pub last_played: i64,
    pub last_started: i64,
    pub play_count: i64,
    pub skip_count: i64,
    pub playlists: String,
}

impl Song {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn basename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn dirname(&self) -> String {
        self.path
            .parent()
            .map(Path::to_string_lossy)
            .map(|d| d.into_owned())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> Stats {
        Stats {
            last_played: self.last_played,
            last_started: self.last_started,
            play_count: self.play_count,
            rating: self.rating.unwrap_or(0),
            skip_count: self.skip_count,
            playlists: self.playlists.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_scale_round_trips() {
        assert_eq!(rating_to_int(0.8), 800);
        assert_eq!(rating_to_int(1.7), 1000);
        assert_eq!(rating_to_float(250), 0.25);
    }

    #[test]
    fn song_paths_split_into_basename_and_dirname() {
        let song = Song::new("/music/rock/track.flac");
        assert_eq!(song.basename(), "track.flac");
        assert_eq!(song.dirname(), "/music/rock");
        assert_eq!(song.stats().rating, 0);
    }
}
