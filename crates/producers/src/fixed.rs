use crate::{FingerprintProducer, ProducerError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Serves precomputed fingerprints from memory.
#[derive(Debug, Default, Clone)]
pub struct FixedProducer {
    fingerprints: HashMap<PathBuf, String>,
}

impl FixedProducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<PathBuf>, fp_base64: impl Into<String>) -> Self {
        self.fingerprints.insert(path.into(), fp_base64.into());
        self
    }
}

#[async_trait::async_trait]
impl FingerprintProducer for FixedProducer {
    async fn compute(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<String, ProducerError> {
        if cancel.is_cancelled() {
            return Err(ProducerError::Cancelled);
        }
        self.fingerprints
            .get(path)
            .cloned()
            .ok_or_else(|| ProducerError::Failed(format!("no fingerprint for {}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_latest_known_fingerprint_only() {
        let producer = FixedProducer::new()
            .with("/music/a.mp3", "AQAAAA")
            .with("/music/a.mp3", "AQAAAB");
        let cancel = CancellationToken::new();

        let fp = producer.compute(Path::new("/music/a.mp3"), &cancel).await;
        assert_eq!(fp, Ok("AQAAAB".to_string()));

        let missing = producer.compute(Path::new("/music/b.mp3"), &cancel).await;
        assert!(matches!(missing, Err(ProducerError::Failed(_))));

        cancel.cancel();
        let cancelled = producer.compute(Path::new("/music/a.mp3"), &cancel).await;
        assert_eq!(cancelled, Err(ProducerError::Cancelled));
    }
}
