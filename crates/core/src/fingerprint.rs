//! Content identity of a track: decoded frames plus a lazily computed digest.

use crate::codec::{self, RawFingerprint};
use crate::error::{PrdbError, Result};
use crate::matcher::{self, MatchParams};
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct Fingerprint {
    raw: RawFingerprint,
    summary_hash: OnceLock<u32>,
}

impl Fingerprint {
    pub fn new(raw: RawFingerprint) -> Self {
        Self {
            raw,
            summary_hash: OnceLock::new(),
        }
    }

    /// Uses a digest computed earlier, e.g. the one stored next to the blob.
    pub fn with_hash(raw: RawFingerprint, summary_hash: u32) -> Self {
        Self {
            raw,
            summary_hash: OnceLock::from(summary_hash),
        }
    }

    pub fn from_base64(text: &str) -> Result<Self> {
        Ok(Self::new(codec::decode_base64(text)?))
    }

    /// Restores a fingerprint persisted with [`Fingerprint::to_blob`].
    pub fn from_blob(algorithm: u8, blob: &[u8], summary_hash: Option<u32>) -> Result<Self> {
        if blob.len() % 4 != 0 {
            return Err(PrdbError::MalformedFingerprint(format!(
                "blob of {} bytes is not a sequence of u32",
                blob.len()
            )));
        }
        let values = blob
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect();
        let raw = RawFingerprint::new(algorithm, values);
        Ok(match summary_hash {
            Some(hash) => Self::with_hash(raw, hash),
            None => Self::new(raw),
        })
    }

    pub fn to_blob(&self) -> Vec<u8> {
        self.raw
            .values()
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect()
    }

    pub fn raw(&self) -> &RawFingerprint {
        &self.raw
    }

    pub fn summary_hash(&self) -> u32 {
        *self
            .summary_hash
            .get_or_init(|| matcher::summary_hash(self.raw.values()))
    }

    pub fn matches(&self, other: &Fingerprint, params: &MatchParams) -> bool {
        matcher::are_equal(
            self.raw.values(),
            self.summary_hash(),
            other.raw.values(),
            other.summary_hash(),
            params,
        )
    }

    pub fn match_ratio(&self, other: &Fingerprint, params: &MatchParams) -> f64 {
        matcher::match_ratio(self.raw.values(), other.raw.values(), params)
    }
}

/// Fuzzy equality with the default thresholds; not bitwise.
impl PartialEq for Fingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other, &MatchParams::default())
    }
}
