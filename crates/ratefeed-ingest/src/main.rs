//! Ratefeed Ingest - rate-controlled stream ingestion

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use ratefeed_common::logging::{init_logging, LogConfig, LogLevel};
use ratefeed_ingest::{
    config::IngestConfig,
    orchestrator::IngestOrchestrator,
    queue::SqsQueue,
    scheduler::{RateScheduler, TrafficProfile},
    state::{CursorStore, PgCursorStore},
    storage::Storage,
};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "ratefeed-ingest")]
#[command(author, version, about = "Release records from a blob-stored CSV into a queue at a shaped rate")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a single invocation and print its report
    Run,

    /// Run an invocation every RATEFEED_TICK_SECS until interrupted
    Serve,

    /// Print the stored cursor for the configured stream
    Status {
        /// Also report the source object size and bytes remaining
        #[arg(long)]
        size: bool,
    },

    /// Print the target count for a window
    Target {
        /// Window time (RFC 3339); defaults to now
        #[arg(long, value_parser = parse_time)]
        at: Option<DateTime<Utc>>,

        /// Fixed jitter factor instead of a sampled one
        #[arg(long)]
        factor: Option<f64>,
    },
}

fn parse_time(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 time '{}': {}", raw, e))
}

fn scheduler(config: &IngestConfig) -> RateScheduler {
    match config.seed {
        Some(seed) => RateScheduler::seeded(TrafficProfile::default(), seed),
        None => RateScheduler::new(TrafficProfile::default()),
    }
}

async fn build_orchestrator(config: &IngestConfig) -> Result<IngestOrchestrator> {
    let storage = Storage::new(config.storage.clone()).await?;
    let cursors = PgCursorStore::connect(&config.database).await?;
    let queue = SqsQueue::new(config.queue.clone()).await?;

    Ok(IngestOrchestrator::new(
        config.engine.clone(),
        scheduler(config),
        Arc::new(storage),
        Arc::new(cursors),
        Arc::new(queue),
    )?)
}

async fn run(config: &IngestConfig) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;
    let report = orchestrator.run_once(Utc::now()).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn serve(config: &IngestConfig) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;
    let mut ticker = config.ticker();

    info!(
        stream_id = %config.engine.stream_id,
        tick_secs = config.tick_secs,
        "Serving; press Ctrl-C to stop"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match orchestrator.run_once(Utc::now()).await {
                    Ok(report) => info!(
                        target_count = report.target,
                        sent = report.sent,
                        outcome = ?report.outcome,
                        "Tick complete"
                    ),
                    Err(err) => error!(kind = err.kind(), error = %err, "Invocation failed, retrying next tick"),
                }
            }
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}

async fn status(config: &IngestConfig, size: bool) -> Result<()> {
    let cursors = PgCursorStore::connect(&config.database).await?;
    let stream_id = &config.engine.stream_id;
    let cursor = cursors
        .get(stream_id)
        .await?
        .with_context(|| format!("No cursor stored for stream '{}'", stream_id))?;

    let mut output = serde_json::to_value(&cursor)?;
    if size {
        let storage = Storage::new(config.storage.clone()).await?;
        let object_size = storage.object_size(&config.engine.source_key).await?;
        output["object_size"] = object_size.into();
        output["bytes_remaining"] = object_size.saturating_sub(cursor.byte_offset).into();
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn target(config: &IngestConfig, at: Option<DateTime<Utc>>, factor: Option<f64>) -> Result<()> {
    let at = at.unwrap_or_else(Utc::now);
    let scheduler = match factor {
        Some(factor) => RateScheduler::fixed(TrafficProfile::default(), factor),
        None => scheduler(config),
    };
    let target = scheduler.target_at(at, config.engine.daily_target);

    println!(
        "{}",
        serde_json::json!({
            "at": at.to_rfc3339(),
            "daily_target": config.engine.daily_target,
            "target": target,
        })
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("ratefeed-ingest")
        .filter_directives("sqlx=warn,aws_config=warn,aws_smithy_runtime=warn")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let config = IngestConfig::load()?;
    info!(
        stream_id = %config.engine.stream_id,
        source = %config.engine.source_key,
        daily_target = config.engine.daily_target,
        "Configuration loaded"
    );

    match cli.command {
        Command::Run => run(&config).await?,
        Command::Serve => serve(&config).await?,
        Command::Status { size } => status(&config, size).await?,
        Command::Target { at, factor } => target(&config, at, factor)?,
    }

    Ok(())
}
