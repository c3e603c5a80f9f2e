//! `lockdown` command line entry point.

use std::process::ExitCode;

use clap::Parser;
use lockdown::LockdownBuilder;
use lockdown::cli::Cli;
use lockdown::commands::{self, CommandOutcome};
use lockdown::config::AppConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Some(url) = cli.database_url {
        config.database.url = url;
    }

    match run(&cli.command, config).await {
        Ok(outcome) => {
            print!("{}", outcome.stdout);
            ExitCode::from(outcome.exit_code)
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(
    command: &lockdown::cli::Command,
    config: AppConfig,
) -> Result<CommandOutcome, Box<dyn std::error::Error>> {
    tracing::debug!(database = %config.database.url, "Opening lockdown database");

    let lockdown = LockdownBuilder::new()
        .with_sqlite_pool(&config.database.url, config.database.max_connections)
        .await?
        .with_settings(config.lockout)
        .apply_migrations(true)
        .build()
        .await?;

    Ok(commands::execute(command, &lockdown).await?)
}
