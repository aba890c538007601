use crate::config::AppConfig;
use crate::executor::{run_all, Processor, TaskTotals};
use crate::library;
use crate::models::Song;
use crate::prdb::SqlitePrdb;
use crate::processors::{
    AddedProcessor, ExportProcessor, FingerprintProcessor, SongContext,
};
use crate::scanner;
use crate::store::Store;
use crate::sync::{self, SyncOptions, SyncSummary};
use anyhow::Context;
use producers::fpcalc::{FpcalcConfig, FpcalcProducer};
use producers::FingerprintProducer;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Treat files as newly added songs.
    Added,
    /// Copy the songs' stats into the local DB.
    Export { force: bool },
}

#[derive(Debug, Default, Serialize)]
pub struct ScanSummary {
    pub discovered: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: Vec<String>,
    pub cancelled: bool,
    /// Songs handed back by the processor.
    pub songs: Vec<Song>,
}

impl From<TaskTotals<Song>> for ScanSummary {
    fn from(totals: TaskTotals<Song>) -> Self {
        Self {
            discovered: totals.settled(),
            succeeded: totals.succeeded.len(),
            skipped: totals.skipped,
            failed: totals
                .failed
                .iter()
                .map(|(song, err)| format!("{}: {err}", song.path.display()))
                .collect(),
            cancelled: totals.error.is_some(),
            songs: totals.succeeded,
        }
    }
}

pub fn build_producer(config: &AppConfig) -> Arc<dyn FingerprintProducer> {
    Arc::new(FpcalcProducer::new(FpcalcConfig {
        command: config.producer.command.clone(),
        timeout: config.producer.timeout(),
    }))
}

pub async fn open_local(config: &AppConfig) -> anyhow::Result<SqlitePrdb> {
    SqlitePrdb::open(&config.database.path)
        .await
        .with_context(|| format!("open local ratings db {}", config.database.path))
}

pub async fn open_external(config: &AppConfig) -> anyhow::Result<SqlitePrdb> {
    let path = config
        .database
        .external_path
        .as_deref()
        .context("database.external_path is not configured")?;
    SqlitePrdb::open(path)
        .await
        .with_context(|| format!("open external ratings db {path}"))
}

/// Roots given on the command line win over `scan.include`.
pub fn scan_roots(config: &AppConfig, paths: Vec<PathBuf>) -> Vec<PathBuf> {
    if paths.is_empty() {
        config.scan.include.iter().map(PathBuf::from).collect()
    } else {
        paths
    }
}

async fn discover(config: &AppConfig, roots: &[PathBuf]) -> anyhow::Result<Vec<Song>> {
    if roots.is_empty() {
        warn!("no scan roots configured");
    }
    info!("Starting discovery...");
    let songs = scanner::discover(roots, &config.scan.exclude, &config.scan.extensions).await?;
    info!("Discovery complete. Found {} songs.", songs.len());
    Ok(songs)
}

async fn process<P: Processor<Song>>(
    config: &AppConfig,
    processor: P,
    songs: Vec<Song>,
    cancel: &CancellationToken,
) -> TaskTotals<Song> {
    run_all(processor, songs, config.executor, cancel).await
}

pub async fn run_scan(
    config: &AppConfig,
    roots: &[PathBuf],
    mode: ScanMode,
    producer: Arc<dyn FingerprintProducer>,
    store: Arc<dyn Store>,
    cancel: &CancellationToken,
) -> anyhow::Result<ScanSummary> {
    let songs = discover(config, roots).await?;
    let ctx = SongContext::new(producer, store, config.matching);
    info!("Starting fingerprint phase...");
    let totals = match mode {
        ScanMode::Added => process(config, AddedProcessor(ctx), songs, cancel).await,
        ScanMode::Export { force } => {
            process(config, ExportProcessor { ctx, force }, songs, cancel).await
        }
    };
    info!("Fingerprint phase complete.");
    Ok(totals.into())
}

/// Fingerprints everything under `roots` and groups songs of the same track.
pub async fn find_duplicates(
    config: &AppConfig,
    roots: &[PathBuf],
    producer: Arc<dyn FingerprintProducer>,
    store: Arc<dyn Store>,
    cancel: &CancellationToken,
) -> anyhow::Result<Vec<Vec<Song>>> {
    let songs = discover(config, roots).await?;
    let ctx = SongContext::new(producer, store, config.matching);
    let totals = process(config, FingerprintProcessor(ctx), songs, cancel).await;
    for (song, err) in &totals.failed {
        warn!(path = %song.path.display(), error = %err, "not fingerprinted");
    }
    Ok(library::duplicate_groups(&totals.succeeded)
        .into_iter()
        .map(|group| group.into_iter().cloned().collect())
        .collect())
}

pub async fn run_sync(
    config: &AppConfig,
    options: &SyncOptions,
    cancel: &CancellationToken,
) -> anyhow::Result<SyncSummary> {
    let local = open_local(config).await?;
    let external = open_external(config).await?;
    sync::sync_stores(
        Arc::new(local),
        Arc::new(external),
        options,
        config.executor,
        cancel,
    )
    .await
}
