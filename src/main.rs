//! ChaosKVS - chaos-engineering simulator for an in-memory KVS fleet
//!
//! This is the command-line entry point: pick a preset or a config file,
//! optionally override a few knobs, run the scenario, print the report.
#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use chaos_kvs::config::FileConfig;
use chaos_kvs::events::EventBus;
use chaos_kvs::scenario::{presets, Engine, ScenarioConfig};

/// ChaosKVS - chaos-engineering simulator for an in-memory KVS fleet
#[derive(Parser, Debug)]
#[command(name = "chaos-kvs")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a scenario configuration file (TOML or JSON)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Preset scenario name (see --list-presets)
    #[arg(short = 'p', long = "preset", value_name = "NAME")]
    preset: Option<String>,

    /// Scenario duration override (e.g. "10s", "1m")
    #[arg(long = "duration", value_name = "DURATION", value_parser = humantime::parse_duration)]
    duration: Option<Duration>,

    /// Node count override
    #[arg(long = "nodes", value_name = "COUNT")]
    nodes: Option<usize>,

    /// Client worker count override
    #[arg(long = "workers", value_name = "COUNT")]
    workers: Option<usize>,

    /// Disable chaos injection
    #[arg(long = "no-chaos")]
    no_chaos: bool,

    /// Disable automatic recovery
    #[arg(long = "no-recovery")]
    no_recovery: bool,

    /// List available preset scenarios and exit
    #[arg(long = "list-presets")]
    list_presets: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();

    if cli.list_presets {
        println!("Available presets:");
        for name in presets::preset_names() {
            let config = presets::preset(name).expect("preset");
            println!("  {name:<12} {}", config.description);
        }
        return ExitCode::SUCCESS;
    }

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let bus = Arc::new(EventBus::new());
    let engine = Engine::new(config);
    engine.set_event_bus(Arc::clone(&bus));

    // Ctrl-C cancels the run; the engine still reports the partial result.
    let root = CancellationToken::new();
    {
        let root = root.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                root.cancel();
            }
        });
    }

    // Mirror bus traffic into the log.
    let mut subscriber = bus.subscribe();
    let event_logger = tokio::spawn(async move {
        while let Some(event) = subscriber.recv().await {
            info!(
                event = %event.event_type,
                node = %event.node_id,
                "bus event"
            );
        }
    });

    let result = match engine.run(&root).await {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "scenario failed");
            return ExitCode::FAILURE;
        }
    };

    bus.close();
    let _ = event_logger.await;

    println!("{}", result.report());
    ExitCode::SUCCESS
}

fn build_config(cli: &Cli) -> chaos_kvs::Result<ScenarioConfig> {
    let mut config = if let Some(path) = &cli.config {
        FileConfig::load(path)?.to_scenario_config()?
    } else if let Some(name) = &cli.preset {
        presets::preset(name).ok_or_else(|| {
            chaos_kvs::ChaosKvsError::Config(format!("unknown preset: {name}"))
        })?
    } else {
        ScenarioConfig::default()
    };

    if let Some(duration) = cli.duration {
        config.duration = duration;
    }
    if let Some(nodes) = cli.nodes {
        config.node_count = nodes;
    }
    if let Some(workers) = cli.workers {
        config.client_workers = workers;
    }
    if cli.no_chaos {
        config.enable_chaos = false;
    }
    if cli.no_recovery {
        config.enable_recovery = false;
    }

    Ok(config)
}

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
