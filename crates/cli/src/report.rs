//! Text and JSON rendering of command results.

use chrono::{TimeZone, Utc};
use prdb_core::models::{rating_to_float, Record, Song};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct RecordRow {
    pub id: i64,
    pub path: String,
    pub rating: Option<f64>,
    pub play_count: i64,
    pub skip_count: i64,
    pub last_played: Option<String>,
    pub updated_at: Option<String>,
}

/// RFC 3339 for a unix timestamp; zero means "never".
pub fn format_timestamp(ts: i64) -> Option<String> {
    if ts <= 0 {
        return None;
    }
    Utc.timestamp_opt(ts, 0).single().map(|t| t.to_rfc3339())
}

impl From<&Record> for RecordRow {
    fn from(r: &Record) -> Self {
        Self {
            id: r.fingerprint_id,
            path: if r.dirname.is_empty() {
                r.basename.clone()
            } else {
                format!("{}/{}", r.dirname.trim_end_matches('/'), r.basename)
            },
            rating: r.has_stats().then(|| rating_to_float(r.stats.rating)),
            play_count: r.stats.play_count,
            skip_count: r.stats.skip_count,
            last_played: format_timestamp(r.stats.last_played),
            updated_at: r.updated_at.and_then(format_timestamp),
        }
    }
}

pub fn record_line(row: &RecordRow) -> String {
    let rating = row
        .rating
        .map(|r| format!("{r:.2}"))
        .unwrap_or_else(|| "-".into());
    format!(
        "{:>6}  {:>5}  plays {:<4} skips {:<4} {}",
        row.id, rating, row.play_count, row.skip_count, row.path
    )
}

pub fn duplicate_lines(groups: &[Vec<Song>]) -> Vec<String> {
    let mut lines = Vec::new();
    for group in groups {
        let id = group
            .first()
            .and_then(|s| s.fingerprint_id)
            .unwrap_or_default();
        lines.push(format!("fingerprint {id}: {} songs", group.len()));
        for song in group {
            lines.push(format!("  {}", song.path.display()));
        }
    }
    lines
}
