//! Fingerprint producer abstractions.
//!
//! A producer turns a media file into the base64 text form of a compressed
//! acoustic fingerprint. Audio decoding happens outside this workspace.

use std::path::Path;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub mod fixed;
pub mod fpcalc;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProducerError {
    #[error("cancelled")]
    Cancelled,
    #[error("timed out")]
    Timeout,
    #[error("fingerprint failed: {0}")]
    Failed(String),
}

#[async_trait::async_trait]
pub trait FingerprintProducer: Send + Sync {
    /// Computes the base64 fingerprint of `path`.
    ///
    /// Implementations must return promptly once `cancel` fires.
    async fn compute(&self, path: &Path, cancel: &CancellationToken)
        -> Result<String, ProducerError>;
}
