mod app;
mod assistant;
mod attachments;
mod cli;
mod completions;
mod config;
mod db;
mod directory;
mod dispatch;
mod domain;
mod escalation;
mod export;
mod history;
mod listing;
mod notify;
mod outcome;
mod ticket_id;
mod ui;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

fn main() {
    init_tracing();

    let cli = cli::Cli::parse();
    if let cli::Commands::Completions(args) = &cli.command {
        let mut stdout = std::io::stdout().lock();
        completions::generate_completions(args.shell, &mut stdout);
        return;
    }

    let json = cli.json;
    let outcome = match dispatch::run(cli) {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            outcome::Outcome::failure(&err)
        }
    };
    ui::print_outcome(&outcome, json);
    if outcome.is_error() {
        std::process::exit(1);
    }
}

/// Diagnostics go to stderr so stdout stays parseable; `STICKET_LOG` takes
/// the usual `EnvFilter` directives.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("STICKET_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}
