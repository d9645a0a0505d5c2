use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use crashwatch::config::AgentConfig;
use crashwatch::engine::CaptureEngine;
use crashwatch::replay;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "crashwatch",
    about = "Crashwatch — error telemetry capture and crash correlation harness",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Agent config file (TOML)
    #[arg(long, env = "CRASHWATCH_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CRASHWATCH_LOG", global = true)]
    log: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a recorded page-event stream (JSON Lines) through a fresh engine
    Replay {
        /// Path to the JSONL event stream
        #[arg(long)]
        input: PathBuf,

        /// Collector endpoint to forward records to (overrides config)
        #[arg(long, env = "CRASHWATCH_COLLECTOR")]
        collector: Option<String>,

        /// Page URL attributed to the replayed session
        #[arg(long, default_value = "https://replay.local/")]
        page_url: String,

        /// Print the final buffer snapshot as JSON
        #[arg(long)]
        dump_state: bool,
    },
    /// Drive a synthetic error through the full detector path and print the crash
    Selftest,
}

fn init_tracing(level: Option<&str>) {
    let filter = tracing_subscriber::EnvFilter::try_new(level.unwrap_or("info"))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<AgentConfig> {
    match path {
        Some(path) => AgentConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(AgentConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log.as_deref());
    let config = load_config(args.config.as_ref())?;

    match args.command {
        Command::Replay {
            input,
            collector,
            page_url,
            dump_state,
        } => run_replay(config, input, collector, page_url, dump_state).await,
        Command::Selftest => run_selftest(config),
    }
}

async fn run_replay(
    mut config: AgentConfig,
    input: PathBuf,
    collector: Option<String>,
    page_url: String,
    dump_state: bool,
) -> Result<()> {
    if collector.is_some() {
        config.collector.endpoint = collector;
    }

    let engine = Arc::new(CaptureEngine::new(config, page_url));
    engine.start_collector();

    let file = std::fs::File::open(&input)
        .with_context(|| format!("opening replay stream {}", input.display()))?;
    let reader = BufReader::new(file);

    let mut applied = 0usize;
    let mut skipped = 0usize;
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match replay::parse_line(&line) {
            Ok(event) => {
                replay::apply(&engine, event);
                applied += 1;
            }
            Err(e) => {
                warn!(line = line_no + 1, "skipping unparseable event: {e}");
                skipped += 1;
            }
        }
    }

    let snapshot = engine.snapshot();
    let metrics = engine.metrics();
    info!(
        applied,
        skipped,
        console_errors = snapshot.console_errors.len(),
        page_errors = snapshot.page_errors.len(),
        api_errors = snapshot.api_errors.len(),
        crashes = snapshot.crashes.len(),
        noise_suppressed = metrics.noise_suppressed,
        "replay complete"
    );

    for crash in &snapshot.crashes {
        println!("{}", serde_json::to_string_pretty(crash)?);
    }
    if dump_state {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }

    // Final collector flush before exit.
    engine.teardown();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    Ok(())
}

fn run_selftest(config: AgentConfig) -> Result<()> {
    let engine = CaptureEngine::new(config, "https://selftest.local/");
    engine.trigger_test_error();

    let snapshot = engine.snapshot();
    anyhow::ensure!(
        snapshot.crashes.len() == 1,
        "expected exactly one crash event, got {}",
        snapshot.crashes.len()
    );
    println!("{}", serde_json::to_string_pretty(&snapshot.crashes[0])?);
    info!("selftest passed: detector path emitted one crash event");
    Ok(())
}
