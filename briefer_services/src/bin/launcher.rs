//! Entry point for the processes supervised inside the container.

use briefer_core::{launcher, telemetry};
use clap::{Parser, Subcommand};
use tracing::error;

#[derive(Parser)]
#[command(name = "launcher", about = "Start Briefer services inside the container")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate configuration, prepare the database and run migrations
    Setup,
    /// Run the AI API
    Ai,
    /// Run the web API
    Api,
    /// Run the notebook server
    Jupyter,
}

#[tokio::main]
async fn main() {
    telemetry::init_tracing(env!("CARGO_CRATE_NAME"));
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Setup => launcher::run_setup().await,
        Command::Ai => launcher::run_ai().await,
        Command::Api => launcher::run_api().await,
        Command::Jupyter => launcher::run_jupyter().await,
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(e.exit_code());
    }
}
