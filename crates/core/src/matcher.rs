//! Fuzzy comparison of decoded fingerprints.
//!
//! A 32-bit majority-vote digest rejects most non-matches cheaply; candidates
//! that pass are aligned with an offset histogram and accepted when enough
//! frames agree at the best-supported offset.

use serde::{Deserialize, Serialize};

/// Thresholds of the equality test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchParams {
    /// Largest summary-hash distance that still gets the full comparison.
    pub max_hash_distance: u32,
    /// Largest per-frame bit error counted as agreement.
    pub max_bit_error: u32,
    /// Largest frame drift searched in either direction.
    pub max_align_offset: usize,
    pub min_match_ratio: f64,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self {
            max_hash_distance: 3,
            max_bit_error: 2,
            max_align_offset: 120,
            min_match_ratio: 0.90,
        }
    }
}

pub fn summary_hash(raw: &[u32]) -> u32 {
    let mut votes = [0usize; 32];
    for value in raw {
        for (bit, count) in votes.iter_mut().enumerate() {
            *count += ((value >> bit) & 1) as usize;
        }
    }
    let threshold = raw.len() / 2;
    votes
        .iter()
        .enumerate()
        .filter(|&(_, &count)| count > threshold)
        .fold(0u32, |hash, (bit, _)| hash | 1 << bit)
}

pub fn hamming_distance(a: u32, b: u32) -> u32 {
    (a ^ b).count_ones()
}

/// Share of frames agreeing at the best alignment offset, in `[0, 1]`.
///
/// The search window is `|i - j| <= max_align_offset`, which keeps the score
/// independent of argument order.
pub fn match_ratio(a: &[u32], b: &[u32], params: &MatchParams) -> f64 {
    let (na, nb) = (a.len(), b.len());
    if na == 0 || nb == 0 {
        return 0.0;
    }
    let mut counts = vec![0u32; na + nb + 1];
    for (i, &x) in a.iter().enumerate() {
        let begin = i.saturating_sub(params.max_align_offset);
        let end = nb.min(i + params.max_align_offset + 1);
        for (j, &y) in b.iter().enumerate().take(end).skip(begin) {
            if (x ^ y).count_ones() <= params.max_bit_error {
                counts[i + nb - j] += 1;
            }
        }
    }
    let top = counts.iter().copied().max().unwrap_or(0);
    top as f64 / na.min(nb) as f64
}

pub fn are_equal(
    a: &[u32],
    a_hash: u32,
    b: &[u32],
    b_hash: u32,
    params: &MatchParams,
) -> bool {
    if hamming_distance(a_hash, b_hash) > params.max_hash_distance {
        return false;
    }
    match_ratio(a, b, params) >= params.min_match_ratio
}
