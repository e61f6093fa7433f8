//! BiLend CLI - Main entry point

use anyhow::Context;
use bilend_protocol::{run_scenario, ProtocolConfig, Scenario};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bilend")]
#[command(about = "BiLend - Pooled money-market lending engine", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a protocol config file
    CheckConfig {
        /// Path to the JSON config
        file: PathBuf,
    },

    /// Run a scenario and print the final state
    Simulate {
        /// Path to the JSON scenario
        scenario: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::CheckConfig { file } => {
            let config = ProtocolConfig::load(&file)
                .with_context(|| format!("invalid config {}", file.display()))?;
            println!("✅ Config valid ({} markets)", config.markets.len());
            for (market, params) in &config.markets {
                println!(
                    "   {}: collateral factor {}, reserve factor {}",
                    market,
                    config.risk.collateral_factor(market),
                    params.reserve_factor
                );
            }
        }

        Commands::Simulate { scenario, json } => {
            let loaded = Scenario::load(&scenario)
                .with_context(|| format!("cannot load scenario {}", scenario.display()))?;
            let report = run_scenario(&loaded)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{report}");
            }
        }
    }

    Ok(())
}
