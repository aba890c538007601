use anyhow::Context;
use prdb_core::matcher::{hamming_distance, MatchParams};
use prdb_core::Fingerprint;
use producers::FingerprintProducer;
use serde::Serialize;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Diagnostics for one pair of fingerprints.
#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub frames_a: usize,
    pub frames_b: usize,
    pub hash_a: u32,
    pub hash_b: u32,
    pub hash_distance: u32,
    pub ratio_ab: f64,
    pub ratio_ba: f64,
    pub equal: bool,
}

pub fn compare(a: &Fingerprint, b: &Fingerprint, params: &MatchParams) -> Comparison {
    Comparison {
        frames_a: a.raw().len(),
        frames_b: b.raw().len(),
        hash_a: a.summary_hash(),
        hash_b: b.summary_hash(),
        hash_distance: hamming_distance(a.summary_hash(), b.summary_hash()),
        ratio_ab: a.match_ratio(b, params),
        ratio_ba: b.match_ratio(a, params),
        equal: a.matches(b, params),
    }
}

pub async fn compare_files(
    producer: &dyn FingerprintProducer,
    a: &Path,
    b: &Path,
    params: &MatchParams,
    cancel: &CancellationToken,
) -> anyhow::Result<Comparison> {
    let mut fps = Vec::with_capacity(2);
    for path in [a, b] {
        let encoded = producer
            .compute(path, cancel)
            .await
            .with_context(|| format!("fingerprint {}", path.display()))?;
        let fp = Fingerprint::from_base64(&encoded)
            .with_context(|| format!("decode fingerprint of {}", path.display()))?;
        fps.push(fp);
    }
    Ok(compare(&fps[0], &fps[1], params))
}

impl std::fmt::Display for Comparison {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "frames:        {} / {}", self.frames_a, self.frames_b)?;
        writeln!(f, "summary hash:  {:08x} / {:08x}", self.hash_a, self.hash_b)?;
        writeln!(f, "hash distance: {}", self.hash_distance)?;
        writeln!(f, "match ratio:   {:.3} / {:.3}", self.ratio_ab, self.ratio_ba)?;
        write!(f, "same track:    {}", if self.equal { "yes" } else { "no" })
    }
}
