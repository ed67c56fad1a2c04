// src/cli/settings.rs — `autopromo config show|set`

use crate::cli::ConfigAction;
use crate::dispatch::config::{encode_setting, DispatchConfig};
use crate::infra::config::Config;

pub async fn run_config(config: &Config, action: ConfigAction) -> anyhow::Result<()> {
    let prefs = super::open_store(config)?;

    match action {
        ConfigAction::Show => {
            let settings = DispatchConfig::load(&prefs)?;
            print_settings(&settings);
        }
        ConfigAction::Set { key, value } => {
            let encoded = encode_setting(&key, &value)?;
            prefs.set(&key, &encoded)?;
            tracing::info!("Setting '{}' updated", key);
            print_settings(&DispatchConfig::load(&prefs)?);
        }
    }
    Ok(())
}

pub fn print_settings(settings: &DispatchConfig) {
    let message = if settings.message_template.is_empty() {
        "(empty)".to_string()
    } else {
        format!(
            "{:?} ({} chars)",
            settings.message_template,
            settings.message_template.chars().count()
        )
    };
    let interval = match settings.interval_days {
        0 => "no throttling".to_string(),
        1 => "1 day".to_string(),
        n => format!("{n} days"),
    };

    println!("  Auto send:  {}", if settings.enabled { "on" } else { "off" });
    println!("  Message:    {message}");
    println!("  Interval:   {interval}");
    println!("  Trigger:    {}", settings.trigger_policy);
}
