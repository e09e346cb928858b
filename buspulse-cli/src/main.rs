//! Bus Pulse CLI - Command-line interface
//!
//! Drives the buspulse library from the terminal: simulate a bus trip and
//! watch its arrival estimate, or manage the configuration file.

mod commands;
mod error;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::simulate::SimulateArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "buspulse")]
#[command(about = "Live bus locations and arrival estimates", long_about = None)]
#[command(version = buspulse::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a bus driving to a stop and track its ETA
    Simulate(SimulateArgs),

    /// View or initialize the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli.command) {
        e.exit();
    }
}

fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Simulate(args) => commands::simulate::run(args),
        Commands::Config { command } => commands::config::run(command),
    }
}
