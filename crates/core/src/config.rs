use crate::executor::ExecutorConfig;
use crate::matcher::MatchParams;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scan: ScanPaths,
    pub matching: MatchParams,
    pub executor: ExecutorConfig,
    pub producer: ProducerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Local ratings DB.
    pub path: String,
    /// Ratings DB shared with other machines, used by `sync`.
    pub external_path: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "personal.db".into(),
            external_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanPaths {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub extensions: Vec<String>,
}

impl Default for ScanPaths {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            extensions: ["mp3", "flac", "ogg", "opus", "m4a", "wav", "wma", "aac"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    pub command: String,
    pub timeout_ms: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            command: "fpcalc".into(),
            timeout_ms: 3000,
        }
    }
}

impl ProducerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Reads `path` (or `config/default` when present), then `PRDB__*` variables.
pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    settings = settings.add_source(
        config::Environment::with_prefix("PRDB")
            .prefix_separator("__")
            .separator("__"),
    );
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}
