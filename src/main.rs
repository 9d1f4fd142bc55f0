//! steam-scraper main entry point
//!
//! This is the command-line interface for the Steam storefront crawler.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use steam_scraper::config::{load_config_with_hash, Config};
use steam_scraper::crawler::{run_crawl, Seed, Spider};
use steam_scraper::output::print_statistics;
use steam_scraper::shard::{split_review_urls, DEFAULT_PIECES};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// steam-scraper: product metadata and user reviews from the Steam store
///
/// Crawls the store search listing and product pages, or the community
/// review listings of one or more apps, writing one record per product or
/// review. Responses are cached on disk so interrupted runs resume cheaply.
#[derive(Parser, Debug)]
#[command(name = "steam-scraper")]
#[command(version = "1.0.0")]
#[command(about = "A Steam store and review crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl product pages from the store
    Products {
        /// Crawl a single app instead of the search listing
        #[arg(long, value_name = "ID")]
        steam_id: Option<String>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Crawl user reviews from the community site
    Reviews {
        /// Crawl the reviews of a single app
        #[arg(long, value_name = "ID", conflicts_with = "url_file")]
        steam_id: Option<String>,

        /// File of review URLs, one per line
        #[arg(long, value_name = "FILE")]
        url_file: Option<PathBuf>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Split scraped products' review URLs into shard files
    SplitUrls {
        /// JSON-lines file written by the products crawl
        #[arg(long, value_name = "FILE")]
        scraped_products: PathBuf,

        /// Directory for the review_urls_NN.txt files
        #[arg(long, value_name = "DIR")]
        output_dir: PathBuf,

        /// Number of shards to aim for
        #[arg(long, default_value_t = DEFAULT_PIECES)]
        pieces: usize,
    },
}

/// Options shared by both crawls
#[derive(Args, Debug)]
struct RunArgs {
    /// Output file (overrides output.path)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Fetch everything from the network, ignoring the response cache
    #[arg(long)]
    no_cache: bool,

    /// Validate config and show the seed requests without crawling
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            match load_config_with_hash(path) {
                Ok((cfg, hash)) => {
                    tracing::info!("Configuration loaded successfully (hash: {})", hash);
                    cfg
                }
                Err(e) => {
                    tracing::error!("Failed to load configuration: {}", e);
                    return Err(e.into());
                }
            }
        }
        None => Config::default(),
    };

    match cli.command {
        Command::Products { steam_id, run } => {
            let seed = steam_id.map_or(Seed::Default, Seed::SteamId);
            handle_crawl(&config, Spider::products(seed)?, run).await?;
        }
        Command::Reviews {
            steam_id,
            url_file,
            run,
        } => {
            let seed = match (steam_id, url_file) {
                (Some(id), _) => Seed::SteamId(id),
                (None, Some(path)) => Seed::UrlFile(path),
                (None, None) => Seed::Default,
            };
            handle_crawl(&config, Spider::reviews(seed)?, run).await?;
        }
        Command::SplitUrls {
            scraped_products,
            output_dir,
            pieces,
        } => handle_split(&scraped_products, &output_dir, pieces)?,
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("steam_scraper=info,warn"),
            1 => EnvFilter::new("steam_scraper=debug,info"),
            2 => EnvFilter::new("steam_scraper=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles --dry-run: shows the settings and the requests a crawl would start with
fn handle_dry_run(config: &Config, spider: &Spider, run: &RunArgs) -> anyhow::Result<()> {
    println!("=== steam-scraper Dry Run ({}) ===\n", spider.name());

    println!("Crawler Configuration:");
    println!("  Max concurrent requests: {}", config.crawler.max_concurrent_requests);
    println!("  Download delay: {}ms", config.crawler.download_delay);
    println!(
        "  Autothrottle: {} (start {}ms, max {}ms)",
        config.autothrottle.enabled, config.autothrottle.start_delay, config.autothrottle.max_delay
    );
    println!("  Obey robots.txt: {}", config.robots.obey);
    println!(
        "  Cache: {}",
        if config.cache.enabled && !run.no_cache {
            config.cache.directory.as_str()
        } else {
            "disabled"
        }
    );

    let output = run
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output.path));
    println!("\nOutput:");
    println!("  {:?} -> {}", config.output.format, output.display());

    let seeds = spider
        .start_requests()
        .context("Failed to build seed requests")?;
    println!("\nSeed Requests ({}):", seeds.len());
    for request in &seeds {
        println!("  - {} {}", request.method().as_str(), request.url());
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles a products or reviews crawl
async fn handle_crawl(
    config: &Config,
    spider: Spider,
    run: RunArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    if run.dry_run {
        handle_dry_run(config, &spider, &run)?;
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping crawl");
            on_interrupt.cancel();
        }
    });

    let use_cache = config.cache.enabled && !run.no_cache;
    match run_crawl(config, spider, run.output.as_deref(), use_cache, cancel).await {
        Ok(outcome) => {
            print_statistics(&outcome.stats);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}

/// Handles split-urls: shards review URLs of scraped products
fn handle_split(products: &Path, output_dir: &Path, pieces: usize) -> anyhow::Result<()> {
    let report = split_review_urls(products, output_dir, pieces, &mut rand::thread_rng())
        .with_context(|| format!("Failed to shard review URLs from {}", products.display()))?;

    println!("There are <={} reviews to be scraped.", report.review_upper_bound);
    Ok(())
}
