//! Sift - incremental filesystem content index

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use directories::ProjectDirs;
use sift::{logging, Database, FullScan, IndexConfig, SyncPipeline};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Rebuild the index from scratch for a directory
    Scan {
        /// Directory to index
        path: PathBuf,
    },
    /// Bring the index up to date with a directory
    Sync {
        /// Directory to synchronize
        path: PathBuf,
    },
    /// Search indexed names, paths and content
    Search {
        /// Text to look for
        term: String,
        /// Maximum number of results
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show index size and recent runs
    Status {
        /// Number of runs to show
        #[arg(long, default_value_t = 5)]
        limit: i64,
    },
}

#[derive(Parser, Debug)]
#[command(name = "sift")]
#[command(version)]
#[command(about = "Incremental filesystem content index", long_about = None)]
struct Args {
    /// Configuration file path (overrides defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database path (default: ~/.local/share/sift/sift.db)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Append logs to the log file instead of the console
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = IndexConfig::load(args.config.as_deref())?;
    logging::init_logging(args.verbose || config.debug, args.log_file)?;
    if args.log_file {
        eprintln!("Logging to {}", logging::get_log_path_display());
    }

    let db_path = args
        .db_path
        .clone()
        .or_else(|| config.db_path.clone())
        .unwrap_or_else(default_db_path);
    tracing::debug!("Opening database at {:?}", db_path);
    let db = Arc::new(
        Database::new(&db_path)
            .await
            .with_context(|| format!("Cannot open index at {}", db_path.display()))?,
    );
    let config = Arc::new(config);

    let result = match args.command {
        Command::Scan { path } => {
            let scan = FullScan::new(db.clone(), config).with_cancel(cancel_on_ctrl_c());
            let record = scan.run(&path).await?;
            print_summary(&record);
            Ok(())
        }
        Command::Sync { path } => {
            let pipeline = SyncPipeline::new(db.clone(), config).with_cancel(cancel_on_ctrl_c());
            let record = pipeline.run(&path).await?;
            print_summary(&record);
            Ok(())
        }
        Command::Search { term, limit } => search(&db, &term, limit).await,
        Command::Status { limit } => status(&db, &db_path, limit).await,
    };

    db.close().await;
    result
}

fn default_db_path() -> PathBuf {
    ProjectDirs::from("com", "sift", "sift")
        .map(|dirs| dirs.data_dir().join("sift.db"))
        .unwrap_or_else(|| PathBuf::from("sift.db"))
}

/// Token cancelled on the first Ctrl-C; in-flight entries still finish
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing in-flight entries");
            trigger.cancel();
        }
    });
    token
}

fn print_summary(record: &sift::db::ScanRecord) {
    println!(
        "{} scan: {} directories, {} files ({} with content), {} deleted, {} ignored in {} ms",
        record.scan_kind,
        record.directory_count,
        record.file_count,
        record.file_w_content_count,
        record.deleted_count,
        record.ignored_entries_count,
        record.scan_duration_ms
    );
    if !record.indexing_completed {
        println!("Run did not complete; the next sync will pick up the rest");
    }
}

async fn search(db: &Database, term: &str, limit: i64) -> anyhow::Result<()> {
    let results = db.search(term, limit).await?;
    if results.is_empty() {
        println!("No matches for '{}'", term);
        return Ok(());
    }

    for result in &results {
        let kind = if result.is_dir { "dir " } else { "file" };
        println!(
            "{} {:>10}  {}  {}",
            kind,
            result.size,
            format_nanos(result.modification_time),
            result.path
        );
        if let Some(snippet) = &result.content_snippet {
            let line = snippet.lines().next().unwrap_or_default();
            if !line.trim().is_empty() {
                println!("     {}", line.trim());
            }
        }
    }
    println!("{} result(s)", results.len());
    Ok(())
}

async fn status(db: &Database, db_path: &Path, limit: i64) -> anyhow::Result<()> {
    println!("Index: {}", db_path.display());
    println!("Entries: {}", db.count_entries().await?);

    let scans = db.recent_scans(limit).await?;
    if scans.is_empty() {
        println!("No runs recorded yet");
        return Ok(());
    }

    println!("Recent runs:");
    for scan in &scans {
        println!(
            "  {} {:<4} {:>6} entries {:>5} deleted {:>5} ignored {:>8} ms{}",
            scan.scan_start,
            scan.scan_kind,
            scan.total_entries(),
            scan.deleted_count,
            scan.ignored_entries_count,
            scan.scan_duration_ms,
            if scan.indexing_completed { "" } else { "  (incomplete)" }
        );
    }
    Ok(())
}

fn format_nanos(nanos: i64) -> String {
    let secs = nanos.div_euclid(1_000_000_000);
    let subsec = nanos.rem_euclid(1_000_000_000) as u32;
    DateTime::<Utc>::from_timestamp(secs, subsec)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}
