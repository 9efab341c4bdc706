//! Questlock CLI - quest sequencing over user-level locks
//!
//! Binary name: `questlock`

use std::process;

use clap::Parser;

mod cli;
mod commands;

use cli::Cli;

/// Format an error for user display (no stack traces)
fn format_error(err: &anyhow::Error) -> String {
    let msg = err.to_string();
    if let Some(source) = err.source() {
        let source_msg = source.to_string();
        if !msg.contains(&source_msg) && !source_msg.is_empty() {
            return format!("{msg}\nCause: {source_msg}");
        }
    }
    msg
}

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(err) = commands::run(cli).await {
        #[allow(clippy::print_stderr)]
        {
            eprintln!("Error: {}", format_error(&err));
        }

        let code = err
            .downcast_ref::<questlock_core::Error>()
            .map_or(1, questlock_core::Error::exit_code);

        #[allow(clippy::exit)]
        process::exit(code);
    }
}
