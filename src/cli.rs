use std::path::PathBuf;
use std::time::Instant;

use chrono::NaiveTime;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::info;

use crate::engine::{Engine, EngineConfig};
use crate::feed::{DEFAULT_CHUNK_SIZE, OrderFeed};
use crate::simulate::{self, SimConfig};

/// Replay or simulate single-symbol order flow through the matching engine.
#[derive(Parser)]
#[command(name = "nse-lob")]
#[command(version = "0.1", about = "Limit order book replay for NSE equity order streams")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay order files (CSV, optionally .gz) in sequence
    Process {
        /// Order files in chronological order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Minimum price increment
        #[arg(long, default_value = "0.05")]
        tick_size: Decimal,

        /// Events log destination (trades; every event with --full-events)
        #[arg(long)]
        events_log: Option<PathBuf>,

        /// Continuous book statistics destination
        #[arg(long)]
        stats_log: Option<PathBuf>,

        /// End-of-day aggregates destination
        #[arg(long)]
        daily_stats_log: Option<PathBuf>,

        /// Mirror emitted records to stdout
        #[arg(long)]
        show_output: bool,

        /// Log every add/cancel/modify row, not only trades
        #[arg(long)]
        full_events: bool,

        /// Records pulled from the file per chunk
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Stop before the first event at or past this time,
        /// e.g. 09:25:00.000000
        #[arg(long)]
        until: Option<NaiveTime>,
    },
    /// Generate a synthetic order stream and run it through the engine
    Simulate {
        /// Number of events to generate
        #[arg(long, default_value_t = 10_000)]
        events: usize,

        /// Generator seed; the stream is deterministic per seed
        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[arg(long, default_value = "0.05")]
        tick_size: Decimal,

        #[arg(long)]
        show_output: bool,
    },
}

#[allow(clippy::too_many_arguments)]
fn handle_process(
    files: Vec<PathBuf>,
    tick_size: Decimal,
    events_log: Option<PathBuf>,
    stats_log: Option<PathBuf>,
    daily_stats_log: Option<PathBuf>,
    show_output: bool,
    full_events: bool,
    chunk_size: usize,
    until: Option<NaiveTime>,
) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = EngineConfig {
        tick_size,
        show_output,
        sparse_events: !full_events,
        events_log_file: events_log,
        stats_log_file: stats_log,
        daily_stats_log_file: daily_stats_log,
    };
    let mut engine = Engine::new(config)?;

    let mut processed: u64 = 0;
    'files: for path in &files {
        info!(file = %path.display(), "replaying order file");
        let mut feed = OrderFeed::open(path)?.with_chunk_size(chunk_size);
        while let Some(chunk) = feed.next_chunk()? {
            for event in chunk {
                if let Some(cutoff) = until {
                    if event.trans_time >= cutoff {
                        info!(%cutoff, "reached cutoff time; stopping");
                        break 'files;
                    }
                }
                engine.process_event(event)?;
                processed += 1;
            }
        }
    }

    if let Some(stats) = engine.finish()? {
        println!("{stats}");
    }
    println!(
        "Processing time:               {:.3}s",
        start.elapsed().as_secs_f64()
    );
    info!(events = processed, "replay complete");
    Ok(())
}

fn handle_simulate(
    events: usize,
    seed: u64,
    tick_size: Decimal,
    show_output: bool,
) -> anyhow::Result<()> {
    let sim = SimConfig {
        events,
        seed,
        tick_size,
        ..SimConfig::default()
    };
    let config = EngineConfig {
        tick_size,
        show_output,
        ..EngineConfig::default()
    };
    let mut engine = Engine::new(config)?;
    engine.process(simulate::generate(&sim))?;
    if let Some(stats) = engine.finish()? {
        println!("{stats}");
    }
    Ok(())
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Process {
            files,
            tick_size,
            events_log,
            stats_log,
            daily_stats_log,
            show_output,
            full_events,
            chunk_size,
            until,
        } => handle_process(
            files,
            tick_size,
            events_log,
            stats_log,
            daily_stats_log,
            show_output,
            full_events,
            chunk_size,
            until,
        ),
        Commands::Simulate {
            events,
            seed,
            tick_size,
            show_output,
        } => handle_simulate(events, seed, tick_size, show_output),
    }
}
