use producers::ProducerError;
use thiserror::Error;

/// Item-level failure taxonomy shared by the codec, the stores and the executor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PrdbError {
    #[error("malformed fingerprint: {0}")]
    MalformedFingerprint(String),
    #[error("fingerprint unavailable: {0}")]
    FingerprintUnavailable(String),
    #[error("database is locked")]
    StoreLocked,
    #[error("database error: {0}")]
    Store(String),
    #[error("cancelled")]
    Cancelled,
}

impl PrdbError {
    /// Transient contention: the executor re-queues the item instead of failing it.
    pub fn is_locked(&self) -> bool {
        matches!(self, PrdbError::StoreLocked)
    }
}

impl From<sqlx::Error> for PrdbError {
    fn from(err: sqlx::Error) -> Self {
        if storage::is_locked(&err) {
            PrdbError::StoreLocked
        } else {
            PrdbError::Store(err.to_string())
        }
    }
}

impl From<ProducerError> for PrdbError {
    fn from(err: ProducerError) -> Self {
        PrdbError::FingerprintUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PrdbError>;
