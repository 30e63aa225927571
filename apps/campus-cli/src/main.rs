//! campus CLI - run and inspect user imports from the command line.
//!
//! - `campus import` runs a configured import against the demo store
//! - `campus check-config` validates a run configuration without importing

use clap::{Parser, Subcommand};

mod commands;
mod error;
mod logging;

use error::CliResult;

/// campus CLI - school identity imports
#[derive(Parser)]
#[command(name = "campus")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an import from a roster file
    Import(commands::import::ImportArgs),

    /// Validate a run configuration, including scheme compilation
    CheckConfig(commands::check::CheckConfigArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = run(cli).await;

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Import(args) => commands::import::execute(args).await,
        Commands::CheckConfig(args) => commands::check::execute(args),
    }
}
