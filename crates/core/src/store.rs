//! Persistence capability for fingerprint-indexed records.

use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::matcher::MatchParams;
use crate::models::{FingerprintId, Record, Stats};
use async_trait::async_trait;

/// Mutating calls report contention as [`crate::error::PrdbError::StoreLocked`].
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_by_exact_key(&self, id: FingerprintId) -> Result<Option<Record>>;

    /// Records whose summary hash lies within `max_distance` bits of `summary_hash`.
    async fn find_candidates_by_hash(
        &self,
        summary_hash: u32,
        max_distance: u32,
    ) -> Result<Vec<Record>>;

    /// Stores `record` and returns its new id; the record's own id is ignored.
    async fn insert(&self, record: &Record) -> Result<FingerprintId>;

    /// Sets basename and stats unless they already match. Returns whether
    /// anything changed.
    async fn update_if_different(
        &self,
        id: FingerprintId,
        basename: &str,
        stats: &Stats,
    ) -> Result<bool>;

    /// Overwrites names, stats and timestamps of `record.fingerprint_id`.
    async fn force_update(&self, record: &Record) -> Result<()>;

    async fn list_all(&self) -> Result<Vec<Record>>;

    /// First stored record fuzzy-equal to `fingerprint`.
    async fn find_matching(
        &self,
        fingerprint: &Fingerprint,
        params: &MatchParams,
    ) -> Result<Option<Record>> {
        let candidates = self
            .find_candidates_by_hash(fingerprint.summary_hash(), params.max_hash_distance)
            .await?;
        Ok(candidates
            .into_iter()
            .find(|r| r.fingerprint.matches(fingerprint, params)))
    }
}
