//! Safeport CLI - Command-line interface
//!
//! Runs placement simulations against a procedural world and reports how
//! the placement core performed.

mod commands;
mod error;

use clap::{Parser, Subcommand};
use safeport::logging::{init_logging, LoggingConfig};

use commands::simulate::SimulateArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "safeport")]
#[command(version = safeport::VERSION)]
#[command(about = "Safe random placement for voxel worlds", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run placements against a procedural world and report performance
    Simulate(SimulateArgs),
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Simulate(args) => run_simulate(args),
    };

    if let Err(e) = result {
        e.exit();
    }
}

fn run_simulate(args: SimulateArgs) -> Result<(), CliError> {
    let logging = LoggingConfig {
        level: if args.verbose { "debug" } else { "warn" }.to_string(),
        log_file: args.log_file.clone(),
        ansi: console::colors_enabled_stderr(),
    };
    let _guard = init_logging(&logging).map_err(|e| CliError::LoggingInit(e.to_string()))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    runtime.block_on(commands::simulate::run(args))
}
