//! Cache command - inspect and manage the archive cache

use crate::cache::{codec_for, CacheMetadata, CacheStore, EvictionPolicy, Fingerprint};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::cli::commands::cache_location;
use crate::cli::GlobalArgs;
use crate::clock::SystemClock;
use crate::config::Config;
use crate::context::create_context;
use crate::error::AccelResult;
use chrono::{DateTime, Utc};
use console::style;
use std::io::{self, Write};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

/// Execute the cache command
pub async fn execute(args: CacheArgs, global: &GlobalArgs, config: &Config) -> AccelResult<()> {
    let (directory, limit) = cache_location(global, config);
    let context = create_context(global.remote_host.as_deref());
    let codec = Arc::from(codec_for(&*context));
    let store = CacheStore::new(directory, context, codec, Arc::new(SystemClock));
    debug!("Using cache directory {}", store.root().display());

    match args.action {
        CacheAction::List { format } => list_entries(&store, format).await,
        CacheAction::Clean => clean_cache(&store, limit).await,
        CacheAction::Clear { yes } => clear_cache(&store, yes).await,
    }
}

/// One cached archive as shown to the user
#[derive(Debug, Clone)]
struct CacheRow {
    fingerprint: Fingerprint,
    metadata: CacheMetadata,
}

/// Entries least recently used first, with their metadata
async fn collect_rows(store: &CacheStore) -> AccelResult<Vec<CacheRow>> {
    let mut rows = Vec::new();
    for (_, entry) in EvictionPolicy::new(store).ranked_entries().await? {
        let metadata = store.entry_metadata(&entry).await;
        rows.push(CacheRow {
            fingerprint: entry.fingerprint,
            metadata,
        });
    }
    Ok(rows)
}

/// List cached archives
async fn list_entries(store: &CacheStore, format: OutputFormat) -> AccelResult<()> {
    let rows = collect_rows(store).await?;

    if rows.is_empty() && !matches!(format, OutputFormat::Json) {
        println!("No archives in {}.", store.root().display());
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_table(&rows),
        OutputFormat::Json => println!("{}", rows_to_json(&rows)?),
        OutputFormat::Plain => {
            for row in &rows {
                println!("{}", row.fingerprint);
            }
        }
    }

    Ok(())
}

fn print_table(rows: &[CacheRow]) {
    println!(
        "{:<42} {:<18} {:<18} {:>6}",
        "FINGERPRINT", "LAST ACCESSED", "CREATED", "HITS"
    );
    println!("{}", "-".repeat(87));

    for row in rows {
        println!(
            "{:<42} {:<18} {:<18} {:>6}",
            row.fingerprint,
            format_timestamp(row.metadata.last_accessed),
            format_timestamp(row.metadata.date_created),
            row.metadata.cache_hits
        );
    }

    println!();
    println!("Total: {} archive(s)", rows.len());
}

fn rows_to_json(rows: &[CacheRow]) -> AccelResult<String> {
    #[derive(serde::Serialize)]
    struct EntryJson {
        fingerprint: String,
        date_created: Option<String>,
        last_accessed: Option<String>,
        cache_hits: u64,
    }

    let entries: Vec<EntryJson> = rows
        .iter()
        .map(|row| EntryJson {
            fingerprint: row.fingerprint.to_string(),
            date_created: row.metadata.date_created.and_then(rfc3339),
            last_accessed: row.metadata.last_accessed.and_then(rfc3339),
            cache_hits: row.metadata.cache_hits,
        })
        .collect();

    Ok(serde_json::to_string_pretty(&entries)?)
}

fn rfc3339(timestamp: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(timestamp, 0).map(|t| t.to_rfc3339())
}

fn format_timestamp(timestamp: Option<i64>) -> String {
    timestamp
        .and_then(|t| DateTime::<Utc>::from_timestamp(t, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Remove the least recently used archives beyond the limit
async fn clean_cache(store: &CacheStore, limit: NonZeroUsize) -> AccelResult<()> {
    let report = EvictionPolicy::new(store).enforce(limit).await?;

    if report.removed.is_empty() && report.failed.is_empty() {
        println!(
            "Cache holds {} archive(s), within the limit of {}.",
            report.examined, limit
        );
        return Ok(());
    }

    for fingerprint in &report.removed {
        println!("  {} {}", style("•").red(), fingerprint);
    }
    for fingerprint in &report.failed {
        println!("  {} {} (could not remove)", style("!").yellow(), fingerprint);
    }
    println!(
        "{} removed {} archive(s), {} kept",
        style("✓").green(),
        report.removed.len(),
        report.retained()
    );

    Ok(())
}

/// Remove every archive
async fn clear_cache(store: &CacheStore, skip_confirm: bool) -> AccelResult<()> {
    let count = store.list_entries().await?.count();

    if count == 0 {
        println!("No archives to clear.");
        return Ok(());
    }

    println!(
        "This will remove {} archive(s) from {}",
        count,
        store.root().display()
    );

    if !skip_confirm {
        print!("Are you sure? [y/N] ");
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            println!("Failed to read input, aborting.");
            return Ok(());
        }

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    print!("Clearing cache... ");
    let _ = io::stdout().flush();

    let removed = store.clear().await?;
    println!("{} cleared {} archive(s)", style("✓").green(), removed);

    Ok(())
}
