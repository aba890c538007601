use cli::compare::{compare, compare_files};
use prdb_core::codec::{encode_base64, RawFingerprint};
use prdb_core::matcher::MatchParams;
use prdb_core::Fingerprint;
use producers::fixed::FixedProducer;
use std::path::Path;
use tokio_util::sync::CancellationToken;

fn frames(len: usize, mut seed: u32) -> Vec<u32> {
    (0..len)
        .map(|_| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed
        })
        .collect()
}

#[tokio::test]
async fn compares_two_encodings_of_one_track() {
    let original = frames(120, 3);
    let mut noisy = original.clone();
    noisy[10] ^= 0b100;
    let producer = FixedProducer::new()
        .with("a.mp3", encode_base64(&RawFingerprint::new(1, original)).unwrap())
        .with("b.ogg", encode_base64(&RawFingerprint::new(1, noisy)).unwrap());

    let cmp = compare_files(
        &producer,
        Path::new("a.mp3"),
        Path::new("b.ogg"),
        &MatchParams::default(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    assert!(cmp.equal);
    assert!(cmp.hash_distance <= 1);
    assert_eq!(cmp.frames_a, 120);
    assert_eq!(cmp.ratio_ab, 1.0);
    assert_eq!(cmp.ratio_ba, 1.0);
    assert!(cmp.to_string().contains("same track:    yes"));
}

#[test]
fn unrelated_tracks_differ() {
    let a = Fingerprint::new(RawFingerprint::new(1, frames(80, 1)));
    let b = Fingerprint::new(RawFingerprint::new(1, frames(80, 2)));
    let cmp = compare(&a, &b, &MatchParams::default());
    assert!(!cmp.equal);
    assert!(cmp.ratio_ab < 0.9);
}

#[tokio::test]
async fn missing_fingerprint_is_an_error() {
    let err = compare_files(
        &FixedProducer::new(),
        Path::new("a.mp3"),
        Path::new("b.mp3"),
        &MatchParams::default(),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("a.mp3"));
}
