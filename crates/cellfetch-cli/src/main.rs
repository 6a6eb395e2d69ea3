//! Cellfetch demo - scrolls a virtual list of image URLs through the fetch
//! pipeline and logs what each row receives.

mod scroll;

use anyhow::{Context, Result};
use cellfetch::{PipelineConfig, PositionTaskCoordinator, ResourceFetcher};
use clap::Parser;
use scroll::{LoggingSink, ScrollSimulation};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "cellfetch")]
#[command(about = "Scroll a list of image URLs through a cached, cancelable fetch pipeline")]
struct Args {
    /// JSON pipeline configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for the persistent cache (overrides the config file)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Number of rows visible at once
    #[arg(short, long, default_value = "4")]
    window: u32,

    /// Number of rows prefetched past the visible window
    #[arg(short, long, default_value = "2")]
    prefetch: u32,

    /// Time spent on each scroll position
    #[arg(long, default_value = "250")]
    step_delay_ms: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Image URLs, one per row
    #[arg(required = true)]
    urls: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = args.cache_dir {
        config.cache.disk_path = dir;
    }

    let rows = args
        .urls
        .iter()
        .map(|raw| Url::parse(raw).with_context(|| format!("Invalid URL: {}", raw)))
        .collect::<Result<Vec<_>>>()?;

    info!(
        "Scrolling {} rows, window {} + prefetch {}",
        rows.len(),
        args.window,
        args.prefetch
    );

    let fetcher = Arc::new(ResourceFetcher::from_config(&config)?);
    let coordinator = PositionTaskCoordinator::new(fetcher.clone(), LoggingSink::default());
    let mut simulation = ScrollSimulation::new(coordinator, rows, args.window, args.prefetch);

    let report = simulation
        .run(Duration::from_millis(args.step_delay_ms))
        .await;
    info!(
        "Done after {} steps: {} fetches ({} from cache, {} joined), {} cancelled, {} delivered ({} failed)",
        report.steps,
        report.network + report.cached,
        report.cached,
        report.joined,
        report.cancelled,
        report.delivered,
        report.failed
    );

    println!("{}", serde_json::to_string_pretty(&fetcher.cache().stats())?);

    Ok(())
}
