//! Uptime results consumer.
//!
//! Reads newline-delimited check results from stdin and runs them through
//! the result dispatcher. Subscriptions and bindings are held in memory and
//! loaded from the JSON file given with `--subscriptions`; without it every
//! result resolves to a missing subscription.
//!
//! ```text
//!   stdin (NDJSON)
//!        │
//!        ▼
//!   ┌───────────┐   mpsc   ┌──────────────┐        ┌──────────────────┐
//!   │ transport │────────▶│ run_consumer │──────▶│ ProcessingStrategy│
//!   └───────────┘          └──────────────┘        └────────┬─────────┘
//!                                 ▲                         │
//!                          shutdown (signals)               ▼
//!                                                  ┌──────────────────┐
//!                                                  │ ResultDispatcher │
//!                                                  └──────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use clap::Parser;
use tokio::io::BufReader;
use tokio::sync::mpsc;

use uptime_results::config::loader::load_config;
use uptime_results::config::watcher::ConfigWatcher;
use uptime_results::config::{ConsumerMode, PipelineConfig};
use uptime_results::consumer::transport::pump_lines;
use uptime_results::consumer::{run_consumer, LoggingCommitter, ResultsStrategyFactory};
use uptime_results::lifecycle::signals::shutdown_on_signal;
use uptime_results::lifecycle::Shutdown;
use uptime_results::observability::{logging, metrics};
use uptime_results::store::InMemoryStateStore;
use uptime_results::uptime::blacklist::StoreFailedUrlRegistry;
use uptime_results::uptime::issues::InMemoryIssueStore;
use uptime_results::uptime::producer::LoggingProducer;
use uptime_results::uptime::rebalance::{RegionSource, ThreadRngSource};
use uptime_results::uptime::repository::InMemorySubscriptionRepository;
use uptime_results::uptime::{Collaborators, ResultDispatcher};

#[derive(Parser)]
#[command(name = "uptime-results")]
#[command(about = "Consume uptime check results from stdin", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured consumer mode (serial or parallel).
    #[arg(long)]
    mode: Option<ConsumerMode>,

    /// Partition number assigned to stdin messages.
    #[arg(long, default_value_t = 0)]
    partition: u32,

    /// JSON file with the subscriptions and bindings to serve.
    #[arg(long)]
    subscriptions: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(mode) = args.mode {
        config.consumer.mode = mode;
    }

    logging::init_logging(&config.observability);
    tracing::info!("uptime-results v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    tracing::info!(
        mode = ?config.consumer.mode,
        max_batch_size = config.consumer.max_batch_size,
        max_workers = config.consumer.max_workers,
        regions = config.enabled_regions().count(),
        "Configuration loaded"
    );

    let regions = RegionSource::new(config.regions.clone());
    let _watcher = match &args.config {
        Some(path) => Some(ConfigWatcher::new(path, regions.clone()).run()?),
        None => None,
    };

    let repository = match &args.subscriptions {
        Some(path) => InMemorySubscriptionRepository::load_seed(path)?,
        None => {
            tracing::warn!("No subscriptions file given, every result will be unmatched");
            InMemorySubscriptionRepository::new()
        }
    };
    tracing::info!(subscriptions = repository.subscription_count(), "Subscriptions loaded");

    let store = Arc::new(InMemoryStateStore::new());
    let deps = Collaborators {
        store: store.clone(),
        repository: Arc::new(repository),
        issues: Arc::new(InMemoryIssueStore::new()),
        producer: Arc::new(LoggingProducer),
        failed_urls: Arc::new(StoreFailedUrlRegistry::new(
            store,
            config.thresholds.failed_url_ttl(),
        )),
        sampler: Arc::new(ThreadRngSource),
        regions,
    };
    let dispatcher = Arc::new(ResultDispatcher::new(deps, &config));
    let factory = ResultsStrategyFactory::new(
        config.consumer.clone(),
        dispatcher,
        Arc::new(LoggingCommitter),
    );

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    let (tx, rx) = mpsc::channel(config.consumer.max_batch_size.max(1) * 2);
    let partition = args.partition;
    tokio::spawn(async move {
        if let Err(e) = pump_lines(BufReader::new(tokio::io::stdin()), partition, tx).await {
            tracing::error!(error = %e, "Failed to read results from stdin");
        }
    });

    run_consumer(
        factory.create(),
        rx,
        config.consumer.poll_interval(),
        shutdown.subscribe(),
    )
    .await?;

    tracing::info!("uptime-results stopped");
    Ok(())
}
