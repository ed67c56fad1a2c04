// src/cli/inspect.rs — Read-only views: status, history, last caller

use chrono::Local;

use crate::dispatch::{DispatchConfig, ThrottleStore, HISTORY_CAPACITY};
use crate::infra::config::Config;
use crate::infra::paths;

pub async fn show_status(config: &Config) -> anyhow::Result<()> {
    let config_path = paths::config_file_path();
    let db_path = config.store.resolved_path();

    println!("autopromo v{}", env!("CARGO_PKG_VERSION"));
    println!();

    if config_path.exists() {
        println!("  Config:     {} (loaded)", config_path.display());
    } else {
        println!("  Config:     (using defaults)");
    }
    println!("  Database:   {}", db_path.display());
    println!("  Transport:  {:?}", config.transport.kind);
    println!(
        "  Call log:   {}",
        config
            .call_log
            .as_ref()
            .map(|c| c.program.as_str())
            .unwrap_or("(none)")
    );
    println!();

    let prefs = super::open_store(config)?;
    super::settings::print_settings(&DispatchConfig::load(&prefs)?);

    let keys = prefs.keys()?;
    let throttle = ThrottleStore::new(prefs);
    match (throttle.last_send_times(), throttle.history()) {
        (Ok(records), Ok(history)) => {
            println!();
            println!("  Numbers:    {} throttle record(s)", records.len());
            println!("  History:    {}/{} entries", history.len(), HISTORY_CAPACITY);
            println!("  Stored:     {}", keys.join(", "));
        }
        (Err(e), _) | (_, Err(e)) => {
            println!();
            println!("  Throttle state unreadable: {e}");
        }
    }
    Ok(())
}

pub async fn show_history(config: &Config, limit: usize) -> anyhow::Result<()> {
    let throttle = ThrottleStore::new(super::open_store(config)?);
    let history = throttle.history()?;

    if history.is_empty() {
        println!("No messages sent yet.");
        return Ok(());
    }

    for entry in history.iter().rev().take(limit) {
        let when = entry
            .sent_at()
            .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| entry.timestamp.to_string());
        println!("{when}  {:<16}  {}", entry.phone_number, entry.message);
    }
    if history.len() > limit {
        println!("({} older not shown)", history.len() - limit);
    }
    Ok(())
}

pub async fn show_last_caller(config: &Config) -> anyhow::Result<()> {
    match super::call_log_or_none(config)
        .most_recent_incoming_number()
        .await
    {
        Some(number) => println!("{number}"),
        None => println!("No inbound call found."),
    }
    Ok(())
}
