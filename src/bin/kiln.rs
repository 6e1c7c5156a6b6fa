//! kiln: Import a JSON document into a flat key-value store and query it
//!
//! Usage:
//!   # Import a file, then answer one path per line read from stdin
//!   kiln data.json
//!
//!   # Import from stdin and answer a few paths
//!   cat data.json | kiln --query users/0/name --query users/1
//!
//!   # Build an on-disk store once, query it later without re-importing
//!   kiln data.json --db data.json.db --import-only
//!   kiln data.json --db data.json.db --query config
//!
//! Set RUST_LOG=info to see import progress.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use kiln::{import_json, ImportStats, IndexEncoding, KilnConfig, MemStore, ProgressReader, QueryService, Store};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(about = "Flatten JSON into a sorted key-value store and serve subtrees", long_about = None)]
struct Args {
    /// Input JSON file (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<String>,

    /// On-disk database path; an existing database is served without re-importing
    #[cfg(feature = "redb")]
    #[arg(long)]
    db: Option<String>,

    /// Stop after the import
    #[arg(long)]
    import_only: bool,

    /// Path to answer after import (repeatable); without any, paths are read from stdin
    #[arg(long = "query", short = 'q', value_name = "PATH")]
    queries: Vec<String>,

    /// Zero-pad array indices to this many digits so they sort numerically
    #[arg(long, value_name = "WIDTH")]
    padded_indices: Option<usize>,

    /// Maximum bytes per write batch (default: 8 MiB)
    #[arg(long)]
    batch_bytes: Option<usize>,

    /// Maximum entries per write batch (default: 100000)
    #[arg(long)]
    batch_entries: Option<usize>,

    /// Reject documents nesting containers deeper than this (default: 256)
    #[arg(long, value_name = "LEVELS")]
    max_depth: Option<usize>,

    /// Don't log import progress
    #[arg(long)]
    no_progress: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // Build config
    let mut config = KilnConfig::default();
    if let Some(width) = args.padded_indices {
        config.index_encoding = IndexEncoding::Padded { width };
    }
    if let Some(bytes) = args.batch_bytes {
        config.batch_limits.max_bytes = bytes;
    }
    if let Some(entries) = args.batch_entries {
        config.batch_limits.max_entries = entries;
    }
    if let Some(depth) = args.max_depth {
        config.max_depth = depth;
    }

    #[cfg(feature = "redb")]
    {
        if let Some(db_path) = args.db.clone() {
            return run_on_disk(&args, &db_path, &config);
        }
    }

    let store = MemStore::with_limits(config.batch_limits);
    import_input(&args, &store, &config)?;
    serve(&args, Arc::new(store), &config)
}

/// Serve from a redb file, importing only when it does not exist yet
#[cfg(feature = "redb")]
fn run_on_disk(args: &Args, db_path: &str, config: &KilnConfig) -> Result<()> {
    let store = if std::path::Path::new(db_path).exists() {
        tracing::info!(db = %db_path, "database exists, skipping import");
        kiln::RedbStore::open(db_path, config.batch_limits)
            .with_context(|| format!("Failed to open database: {}", db_path))?
    } else {
        let (store, stats) = kiln::RedbStore::create_from_json(db_path, open_input(args)?, config)
            .with_context(|| format!("Import into {} failed", db_path))?;
        report(&stats, config);
        store
    };
    serve(args, Arc::new(store), config)
}

/// Reader over the input file, or stdin when no file was given
fn open_input(args: &Args) -> Result<Box<dyn Read>> {
    let Some(file_path) = &args.input else {
        return Ok(Box::new(BufReader::new(io::stdin())));
    };
    let file = File::open(file_path).with_context(|| format!("Failed to open input: {}", file_path))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    if args.no_progress {
        Ok(Box::new(BufReader::new(file)))
    } else {
        Ok(Box::new(BufReader::new(ProgressReader::new(file, size))))
    }
}

/// Import the input file or stdin into `store`
fn import_input<S: Store>(args: &Args, store: &S, config: &KilnConfig) -> Result<()> {
    let stats = import_json(open_input(args)?, store, config).context("Import failed")?;
    report(&stats, config);
    Ok(())
}

fn report(stats: &ImportStats, config: &KilnConfig) {
    eprintln!(
        "Imported {} records in {} batches ({} bytes)",
        stats.records, stats.batches, stats.bytes
    );
    if stats.ambiguous_names > 0 {
        eprintln!(
            "⚠ Warning: {} field names contain the '{}' separator and will not reconstruct faithfully",
            stats.ambiguous_names,
            char::from(config.separator)
        );
    }
}

/// Answer `--query` paths, or one path per stdin line when none were given
fn serve<S: Store>(args: &Args, store: Arc<S>, config: &KilnConfig) -> Result<()> {
    if args.import_only {
        return Ok(());
    }

    let service = QueryService::new(store, config.codec());
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if !args.queries.is_empty() {
        for path in &args.queries {
            service
                .query(path, &mut out)
                .with_context(|| format!("Query failed: {}", path))?;
        }
        out.flush()?;
        return Ok(());
    }

    if args.input.is_none() {
        // stdin already held the document
        return Ok(());
    }

    for line in io::stdin().lock().lines() {
        let line = line.context("Failed to read query path")?;
        let path = query_path(&line);
        // A failed query only affects its own response
        if let Err(err) = service.query(path, &mut out) {
            tracing::error!(path, error = %err, "query failed");
        }
        out.flush()?;
    }

    Ok(())
}

/// A stdin line names a path verbatim; only the line terminator is dropped,
/// since field names may begin or end with whitespace
fn query_path(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}
