use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::compare;
use cli::report::{self, RecordRow};
use prdb_core::config::{self, AppConfig};
use prdb_core::pipeline::{self, ScanMode};
use prdb_core::store::Store;
use prdb_core::sync::SyncOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            on_signal.cancel();
        }
    });

    match cli.command {
        Commands::Scan {
            paths,
            export,
            force,
            json,
        } => {
            let mode = if export {
                ScanMode::Export { force }
            } else {
                ScanMode::Added
            };
            run_scan(&cfg, paths, mode, json, &cancel).await
        }
        Commands::Sync {
            since,
            dry_run,
            json,
        } => run_sync(&cfg, since, dry_run, json, &cancel).await,
        Commands::Dups { paths, json } => run_dups(&cfg, paths, json, &cancel).await,
        Commands::Compare { a, b, json } => run_compare(&cfg, a, b, json, &cancel).await,
        Commands::List { json } => run_list(&cfg, json).await,
    }
}

#[derive(Parser)]
#[command(name = "prdb")]
#[command(about = "Acoustic-fingerprint ratings database", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fingerprint audio files and record them in the local ratings DB
    Scan {
        /// Roots to scan; defaults to scan.include
        paths: Vec<PathBuf>,
        /// Export the songs' stats instead of treating them as new
        #[arg(long)]
        export: bool,
        /// With --export, overwrite whenever stats differ
        #[arg(long, requires = "export")]
        force: bool,
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
    /// Reconcile the local ratings DB with database.external_path
    Sync {
        /// Only consider records active since this unix timestamp
        #[arg(long)]
        since: Option<i64>,
        /// Print the plan without applying it
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
    /// List songs that are the same recording
    Dups {
        /// Roots to scan; defaults to scan.include
        paths: Vec<PathBuf>,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Compare the fingerprints of two files
    Compare {
        a: PathBuf,
        b: PathBuf,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// List records of the local ratings DB
    List {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

async fn run_scan(
    cfg: &AppConfig,
    paths: Vec<PathBuf>,
    mode: ScanMode,
    json: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let roots = pipeline::scan_roots(cfg, paths);
    let store: Arc<dyn Store> = Arc::new(pipeline::open_local(cfg).await?);
    let producer = pipeline::build_producer(cfg);
    let summary = pipeline::run_scan(cfg, &roots, mode, producer, store, cancel).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "scan: {} songs, {} updated, {} skipped, {} failed{}",
            summary.discovered,
            summary.succeeded,
            summary.skipped,
            summary.failed.len(),
            if summary.cancelled { " (cancelled)" } else { "" }
        );
        for line in &summary.failed {
            println!("  {line}");
        }
    }
    Ok(())
}

async fn run_sync(
    cfg: &AppConfig,
    since: Option<i64>,
    dry_run: bool,
    json: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let options = SyncOptions {
        min_timestamp: since,
        dry_run,
        params: cfg.matching,
    };
    let summary = pipeline::run_sync(cfg, &options, cancel).await?;
    if json {
        let summary_json = serde_json::json!({
            "status": if summary.cancelled { "cancelled" } else { "ok" },
            "dry_run": dry_run,
            "summary": summary,
        });
        println!("{}", serde_json::to_string_pretty(&summary_json)?);
    } else {
        println!(
            "plan: add local {}, update local {}, add external {}, update external {}",
            summary.add_local, summary.update_local, summary.add_external, summary.update_external
        );
        if !dry_run {
            println!(
                "applied {}, skipped {}, failed {}",
                summary.applied,
                summary.skipped,
                summary.failed.len()
            );
            for line in &summary.failed {
                println!("  {line}");
            }
        }
    }
    Ok(())
}

async fn run_dups(
    cfg: &AppConfig,
    paths: Vec<PathBuf>,
    json: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let roots = pipeline::scan_roots(cfg, paths);
    let store: Arc<dyn Store> = Arc::new(pipeline::open_local(cfg).await?);
    let producer = pipeline::build_producer(cfg);
    let groups = pipeline::find_duplicates(cfg, &roots, producer, store, cancel).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
    } else if groups.is_empty() {
        println!("no duplicates");
    } else {
        for line in report::duplicate_lines(&groups) {
            println!("{line}");
        }
    }
    Ok(())
}

async fn run_compare(
    cfg: &AppConfig,
    a: PathBuf,
    b: PathBuf,
    json: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let producer = pipeline::build_producer(cfg);
    let cmp = compare::compare_files(producer.as_ref(), &a, &b, &cfg.matching, cancel).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&cmp)?);
    } else {
        println!("{cmp}");
    }
    Ok(())
}

async fn run_list(cfg: &AppConfig, json: bool) -> Result<()> {
    let store = pipeline::open_local(cfg).await?;
    let rows: Vec<RecordRow> = store.list_all().await?.iter().map(RecordRow::from).collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for row in &rows {
            println!("{}", report::record_line(row));
        }
        println!("{} records", rows.len());
    }
    Ok(())
}
