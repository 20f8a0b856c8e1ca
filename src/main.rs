use std::process::ExitCode;

use clap::Parser;

use tunnel_agent::config;
use tunnel_agent::logging::{RotatingFileLog, DEFAULT_LOG_FILE};

/// Bring the declared local SSH tunnels up, once per invocation.
#[derive(Parser)]
#[command(name = "tunnel-agent", version)]
struct Cli {
    /// Path to the tunnel configuration document.
    document: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let document_path = config::resolve_document_path(cli.document.as_deref());

    let log = match RotatingFileLog::open(DEFAULT_LOG_FILE) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("cannot open {DEFAULT_LOG_FILE}: {e}");
            return ExitCode::FAILURE;
        }
    };

    match tunnel_agent::run(&document_path, &log) {
        Ok(_) => ExitCode::SUCCESS,
        Err(fatal) => ExitCode::from(fatal.exit_code()),
    }
}
