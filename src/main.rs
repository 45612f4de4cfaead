//! Twinform CLI, dual-target infrastructure synthesis.

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Log filter variable, e.g. `TWINFORM_LOG=twinform=debug`.
const LOG_ENV: &str = "TWINFORM_LOG";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = twinform::cli::Cli::parse();
    if let Err(e) = twinform::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
