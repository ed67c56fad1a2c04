// src/main.rs — autopromo entry point

use clap::Parser;

use autopromo::cli::{Cli, Commands};
use autopromo::infra::config::Config;
use autopromo::infra::logger;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config (falls back to defaults if no config.toml)
    let config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // Initialize logging (respects RUST_LOG / AUTOPROMO_LOG)
    let level = if cli.verbose {
        "debug"
    } else {
        config.runtime.log_level.as_str()
    };
    logger::init_logging(level);

    match cli.command {
        Commands::Run { events } => {
            autopromo::infra::paths::ensure_dirs().await?;
            autopromo::cli::run::run_service(&config, events.as_deref()).await
        }
        Commands::Status => autopromo::cli::inspect::show_status(&config).await,
        Commands::History { limit } => autopromo::cli::inspect::show_history(&config, limit).await,
        Commands::Config { action } => autopromo::cli::settings::run_config(&config, action).await,
        Commands::Send { number, at } => {
            autopromo::cli::send::run_send(&config, &number, at.as_deref()).await
        }
        Commands::LastCaller => autopromo::cli::inspect::show_last_caller(&config).await,
        Commands::Migrate { status, rollback } => {
            autopromo::cli::migrate::run_migrate(&config, status, rollback).await
        }
    }
}
