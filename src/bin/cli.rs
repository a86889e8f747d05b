//! krjobs CLI
//!
//! Scrapes the configured sites and persists new postings to the
//! selected storage backend. Exit status is non-zero when any source
//! ends in a failed state.

use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;
use krjobs::{
    config::Settings,
    error::Result,
    models::{Source, SourceState},
    pipeline::{self, RunOptions},
    storage::{StorageKind, build_storage},
};

/// krjobs - Korean job board scraper for foreigners
#[derive(Parser, Debug)]
#[command(
    name = "krjobs",
    version,
    about = "Collects foreigner-focused job postings from Korean listing sites"
)]
struct Cli {
    /// Sites to scrape, comma-separated (kowork, komate, klik) or "all"
    #[arg(long, value_delimiter = ',', default_value = "all")]
    sites: Vec<String>,

    /// Storage backend: local, sheets, supabase (default: config/STORAGE_TYPE)
    #[arg(long)]
    storage: Option<String>,

    /// Skip detail scraping; persist light records only
    #[arg(long)]
    no_deep: bool,

    /// Print storage statistics and exit
    #[arg(long)]
    stats: bool,

    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Resolve the requested sites, expanding "all".
fn resolve_sites(names: &[String]) -> Result<Vec<Source>> {
    if names.iter().any(|n| n.eq_ignore_ascii_case("all")) {
        return Ok(Source::ALL.to_vec());
    }
    names.iter().map(|n| Source::from_str(n)).collect()
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = Settings::load_or_default(&cli.config);
    settings.validate()?;

    let kind: StorageKind = cli
        .storage
        .as_deref()
        .unwrap_or(&settings.storage.kind)
        .parse()?;
    let storage = build_storage(kind, &settings)?;
    let sources = resolve_sites(&cli.sites)?;

    log::info!("Storage backend: {}", storage.name());

    if cli.stats {
        println!("\n=== Storage Statistics ===");
        let mut total = 0;
        for source in &sources {
            let stats = storage.stats(source.partition()).await?;
            total += stats.total;
            println!("  - {source}: {} postings", stats.total);
            let deep = stats.field_coverage.get("content_raw").copied().unwrap_or(0);
            println!("      deep-scraped: {deep}");
        }
        println!("Total postings: {total}");
        return Ok(());
    }

    let options = RunOptions::from_settings(&settings, !cli.no_deep);
    log::info!(
        "Starting scrape for sites: {:?} (deep scrape: {})",
        sources.iter().map(Source::as_str).collect::<Vec<_>>(),
        options.deep_scrape
    );

    let report = pipeline::run_all(&sources, storage.as_ref(), &settings, &options).await;

    println!("\n=== Scraping Result ===");
    println!("Started: {}", report.started_at.to_rfc3339());
    if let Some(finished) = report.finished_at {
        println!("Completed: {}", finished.to_rfc3339());
    }
    println!("Total new postings: {}", report.total_persisted());
    println!("\nBy site:");
    for source in &report.sources {
        match source.state {
            SourceState::Done => println!(
                "  - {}: found {}, already known {}, deep-scraped {}, invalid {}, persisted {}",
                source.source,
                source.found,
                source.already_known,
                source.deep_scraped,
                source.invalid,
                source.persisted
            ),
            _ => println!(
                "  - {}: ERROR - {}",
                source.source,
                source.failure.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    if report.has_failures() {
        println!("\nFailed sources:");
        for failed in report.failed_sources() {
            println!(
                "  - {}: {} ({} records unsaved)",
                failed.source,
                failed.failure.as_deref().unwrap_or("unknown error"),
                failed.unsaved
            );
        }
        std::process::exit(1);
    }

    Ok(())
}
