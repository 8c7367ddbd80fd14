//! Run and manage Briefer on the local machine.

use briefer_core::container::{self, RunOptions, DEFAULT_IMAGE};
use clap::Parser;

#[derive(Parser)]
#[command(name = "briefer", about = "Run and manage Briefer.")]
struct Cli {
    /// Run Briefer in detached mode
    #[arg(short, long)]
    detach: bool,

    #[arg(long, hide = true, default_value = DEFAULT_IMAGE)]
    image: String,
}

#[tokio::main]
async fn main() {
    // The terminal belongs to container output; only warnings are logged.
    briefer_core::telemetry::init_tracing_with_level(env!("CARGO_CRATE_NAME"), "warn");

    let cli = Cli::parse();
    let options = RunOptions {
        image: cli.image,
        detach: cli.detach,
    };

    if let Err(e) = container::run(options).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
