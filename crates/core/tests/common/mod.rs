#![allow(dead_code)]

use prdb_core::codec::{self, RawFingerprint};
use prdb_core::models::{Record, Stats};
use prdb_core::prdb::SqlitePrdb;
use prdb_core::Fingerprint;
use std::path::Path;

pub fn frames(len: usize, mut seed: u32) -> Vec<u32> {
    (0..len)
        .map(|_| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed
        })
        .collect()
}

/// A track as the producer would report it.
pub fn track(seed: u32) -> RawFingerprint {
    RawFingerprint::new(1, frames(100, seed))
}

/// The same track with one bit of noise.
pub fn reencoded(seed: u32) -> RawFingerprint {
    let mut values = frames(100, seed);
    values[40] ^= 1 << 9;
    RawFingerprint::new(1, values)
}

pub fn base64(raw: &RawFingerprint) -> String {
    codec::encode_base64(raw).unwrap()
}

pub fn record(raw: RawFingerprint, basename: &str, stats: Stats, updated_at: Option<i64>) -> Record {
    Record {
        fingerprint_id: 0,
        fingerprint: Fingerprint::new(raw),
        basename: basename.to_string(),
        dirname: "/music".to_string(),
        created_at: 1_000,
        updated_at,
        stats,
    }
}

pub async fn open_db(dir: &Path, name: &str) -> SqlitePrdb {
    SqlitePrdb::open(&dir.join(name).to_string_lossy())
        .await
        .unwrap()
}
