//! Command-line interface for datalift.
//!
//! Provides commands for running the watch-and-process daemon, one-shot
//! directory sweeps, processing single files, and inspecting the state
//! store and resolved configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use chrono::Utc;

use crate::config;
use crate::core::{PluginRegistry, StageSequencer, StateStore};
use crate::domain::{DatasetKind, FileTask, PipelineOutcome, SchemaCatalog};
use crate::ingest::{compute_file_hash, task_queue, Dispatcher, FileWatcher, InFlightTracker, WatcherConfig};
use crate::plugins::{Alerter, DirectoryPublisher, WebhookAlerter};

/// datalift - file-ingestion pipeline daemon
#[derive(Parser, Debug)]
#[command(name = "datalift")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch the drop directory and process files until interrupted
    Run {
        /// Override the configured worker count
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Sweep the drop directory once, process everything found, exit
    Scan,

    /// Run a single file through the pipeline
    Process {
        /// Path to the data file
        file: PathBuf,
    },

    /// Show committed state per dataset kind
    State {
        /// Restrict to one dataset kind
        kind: Option<String>,
    },

    /// Show resolved configuration
    Config,
}

/// Shared collaborators wired from configuration
struct Engine {
    sequencer: Arc<StageSequencer>,
    alerter: Option<Arc<dyn Alerter>>,
    watcher_config: WatcherConfig,
    workers: usize,
    queue_capacity: Option<usize>,
}

fn build_engine() -> Result<Engine> {
    let cfg = config::config()?;

    // The daemon owns its directories; create what is missing
    std::fs::create_dir_all(&cfg.home)
        .with_context(|| format!("Failed to create home: {}", cfg.home.display()))?;
    std::fs::create_dir_all(&cfg.watch_dir)
        .with_context(|| format!("Failed to create watch dir: {}", cfg.watch_dir.display()))?;

    let schemas = Arc::new(
        SchemaCatalog::load_dir(&cfg.schemas_dir)
            .with_context(|| format!("Failed to load schemas: {}", cfg.schemas_dir.display()))?,
    );

    if schemas.kinds().is_empty() {
        tracing::warn!(
            dir = %cfg.schemas_dir.display(),
            "No schemas loaded; every delivery will fail validation"
        );
    }

    let state = Arc::new(StateStore::open(&config::state_dir()?)?);
    let registry = Arc::new(PluginRegistry::standard());
    let publisher = Arc::new(DirectoryPublisher::new(cfg.publish_dir.clone()));

    let sequencer = Arc::new(StageSequencer::new(
        registry,
        schemas,
        state,
        publisher,
        config::artifacts_dir()?,
    ));

    let alerter: Option<Arc<dyn Alerter>> = cfg
        .alert_webhook
        .clone()
        .map(|url| Arc::new(WebhookAlerter::new(url)) as Arc<dyn Alerter>);

    let watcher_config = WatcherConfig {
        watch_dir: cfg.watch_dir.clone(),
        stability_delay_secs: cfg.pipeline.stability_delay_secs,
        extensions: cfg.pipeline.extensions.clone(),
    };

    Ok(Engine {
        sequencer,
        alerter,
        watcher_config,
        workers: cfg.pipeline.workers,
        queue_capacity: cfg.pipeline.queue_capacity,
    })
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run { workers } => run_daemon(workers).await,
            Commands::Scan => scan_once().await,
            Commands::Process { file } => process_file(file).await,
            Commands::State { kind } => show_state(kind).await,
            Commands::Config => show_config(),
        }
    }
}

/// Watch + dispatch until ctrl-c, then drain and stop
async fn run_daemon(workers_override: Option<usize>) -> Result<()> {
    let engine = build_engine()?;
    let workers = workers_override.unwrap_or(engine.workers);

    let (tx, rx) = task_queue(engine.queue_capacity);
    let tracker = InFlightTracker::new();

    let watcher = FileWatcher::new(engine.watcher_config.clone());

    // Pick up files that arrived while the daemon was down
    let report = watcher.scan_once(&tx, &tracker).await?;
    if report.enqueued > 0 {
        println!("Recovered {} pending file(s) from the drop directory", report.enqueued);
    }

    let watch_handle = watcher.watch(tx.clone(), tracker.clone())?;

    let dispatcher = Dispatcher::new(engine.sequencer, engine.alerter, tracker, workers);
    let dispatch_handle = dispatcher.start(rx);

    println!(
        "Watching {} with {} worker(s); ctrl-c to stop",
        engine.watcher_config.watch_dir.display(),
        workers
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    println!("Shutting down: draining in-flight work...");
    watch_handle.stop().await?;
    drop(tx);

    let stats = dispatch_handle.join().await;
    println!(
        "Done: {} processed, {} succeeded, {} failed",
        stats.processed(),
        stats.succeeded(),
        stats.failed()
    );

    Ok(())
}

/// One-shot sweep: enqueue everything in the drop directory and drain
async fn scan_once() -> Result<()> {
    let engine = build_engine()?;

    let (tx, rx) = task_queue(engine.queue_capacity);
    let tracker = InFlightTracker::new();

    let watcher = FileWatcher::new(engine.watcher_config.clone());
    let report = watcher.scan_once(&tx, &tracker).await?;
    drop(tx);

    let dispatcher = Dispatcher::new(engine.sequencer, engine.alerter, tracker, engine.workers);
    let stats = dispatcher.start(rx).join().await;

    println!(
        "Scanned {}: {} enqueued, {} in flight, {} unresolvable, {} errors",
        engine.watcher_config.watch_dir.display(),
        report.enqueued,
        report.in_flight,
        report.unresolvable,
        report.errors
    );
    println!(
        "Processed {}: {} succeeded, {} failed",
        stats.processed(),
        stats.succeeded(),
        stats.failed()
    );

    Ok(())
}

/// Run one file through the full stage chain
async fn process_file(file: PathBuf) -> Result<()> {
    let engine = build_engine()?;

    let kind = DatasetKind::from_path(&file)
        .with_context(|| format!("Cannot resolve dataset kind from: {}", file.display()))?;

    let size = tokio::fs::metadata(&file)
        .await
        .with_context(|| format!("Cannot read file: {}", file.display()))?
        .len();

    let id = compute_file_hash(&file).await?;
    let mut task = FileTask::new(id, file, kind, size, Utc::now());

    let outcome = engine.sequencer.run(&mut task).await;

    match outcome {
        PipelineOutcome::Succeeded {
            records_read,
            records_deduped,
            records_written,
        } => {
            println!("Succeeded: {} read, {} deduped, {} written", records_read, records_deduped, records_written);
            Ok(())
        }
        PipelineOutcome::Failed { stage, error } => {
            anyhow::bail!("Failed at {}: {}", stage, error)
        }
    }
}

/// Print state store summaries
async fn show_state(kind: Option<String>) -> Result<()> {
    let state = StateStore::open(&config::state_dir()?)?;
    let summaries = state.summaries().await;

    let filtered: Vec<_> = summaries
        .into_iter()
        .filter(|s| kind.as_deref().map_or(true, |k| s.kind == k))
        .collect();

    if filtered.is_empty() {
        println!("No committed state");
        return Ok(());
    }

    println!("{:<20} {:>10} {:>16}", "KIND", "VERSION", "COMMITTED KEYS");
    for summary in filtered {
        println!(
            "{:<20} {:>10} {:>16}",
            summary.kind, summary.version, summary.committed_keys
        );
    }

    Ok(())
}

/// Print the resolved configuration
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("home:        {}", cfg.home.display());
    println!("watch dir:   {}", cfg.watch_dir.display());
    println!("publish dir: {}", cfg.publish_dir.display());
    println!("schemas dir: {}", cfg.schemas_dir.display());
    println!("workers:     {}", cfg.pipeline.workers);
    println!(
        "queue:       {}",
        match cfg.pipeline.queue_capacity {
            Some(n) => format!("bounded ({})", n),
            None => "unbounded".to_string(),
        }
    );
    println!("extensions:  {}", cfg.pipeline.extensions.join(", "));
    println!(
        "alerting:    {}",
        cfg.alert_webhook.as_deref().unwrap_or("(none)")
    );
    match &cfg.config_file {
        Some(path) => println!("config file: {}", path.display()),
        None => println!("config file: (defaults)"),
    }

    Ok(())
}
