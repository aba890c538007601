//! Runs the chromaprint `fpcalc` tool as a child process.

use crate::{FingerprintProducer, ProducerError};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct FpcalcConfig {
    pub command: String,
    pub timeout: Duration,
}

impl Default for FpcalcConfig {
    fn default() -> Self {
        Self {
            command: "fpcalc".to_string(),
            timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FpcalcProducer {
    config: FpcalcConfig,
}

impl FpcalcProducer {
    pub fn new(config: FpcalcConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl FingerprintProducer for FpcalcProducer {
    async fn compute(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<String, ProducerError> {
        if cancel.is_cancelled() {
            return Err(ProducerError::Cancelled);
        }
        let child = Command::new(&self.config.command)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProducerError::Failed(format!("spawn {}: {}", self.config.command, e)))?;

        // Dropping the pending future kills the child.
        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(ProducerError::Cancelled),
            _ = tokio::time::sleep(self.config.timeout) => {
                warn!(path = %path.display(), "fingerprint timed out");
                return Err(ProducerError::Timeout);
            }
            out = child.wait_with_output() => {
                out.map_err(|e| ProducerError::Failed(e.to_string()))?
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProducerError::Failed(format!(
                "{} exited with {}: {}",
                self.config.command,
                output.status,
                stderr.trim()
            )));
        }
        let fp = parse_output(&String::from_utf8_lossy(&output.stdout))?;
        debug!(path = %path.display(), len = fp.len(), "fingerprint computed");
        Ok(fp)
    }
}

/// Extracts the `FINGERPRINT=` value from fpcalc's key/value output.
pub fn parse_output(stdout: &str) -> Result<String, ProducerError> {
    stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix("FINGERPRINT="))
        .filter(|fp| !fp.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ProducerError::Failed("no fingerprint in fpcalc output".into()))
}
