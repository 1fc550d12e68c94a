//! # Skirmish
//!
//! Runs a combat scenario headlessly and prints the outcome.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]
#![allow(clippy::print_stdout)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use skirmish_sim::{LoadoutLoader, ScenarioDefinition, ScenarioRunner, SimConfig};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Skirmish - headless combat scenario runner
#[derive(Parser, Debug)]
#[command(name = "skirmish")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario file (.toml)
    #[arg(required = true)]
    scenario: PathBuf,

    /// Directory of loadout files (default: from config)
    #[arg(short, long)]
    loadouts: Option<PathBuf>,

    /// Simulation config file
    #[arg(short, long, default_value = skirmish_sim::CONFIG_FILE)]
    config: PathBuf,

    /// Tick limit, overriding the scenario and config
    #[arg(short, long)]
    ticks: Option<u64>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

/// Main entry point.
fn main() -> Result<()> {
    let args = Args::parse();
    let config = SimConfig::load_from(&args.config);

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(config.log_filter.parse()?))
        .init();

    info!("Skirmish {}", env!("CARGO_PKG_VERSION"));

    let loadout_path = args
        .loadouts
        .unwrap_or_else(|| PathBuf::from(&config.loadout_path));
    let mut loader = LoadoutLoader::new(&loadout_path);
    loader
        .load_all()
        .with_context(|| format!("loading loadouts from {}", loadout_path.display()))?;
    let registry = loader.into_registry();

    let scenario = ScenarioDefinition::load(&args.scenario)
        .with_context(|| format!("loading scenario {}", args.scenario.display()))?;

    let runner = ScenarioRunner::new(&registry, &config);
    let report = runner
        .run(&scenario, args.ticks)
        .with_context(|| format!("running scenario '{}'", scenario.name))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }

    Ok(())
}
