// src/cli/mod.rs — CLI definition (clap derive)

pub mod inspect;
pub mod migrate;
pub mod run;
pub mod send;
pub mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::infra::config::Config;
use crate::store::PrefsStore;
use crate::telephony::call_log::{CommandCallLog, NoCallLog};
use crate::telephony::CallLogQuery;

#[derive(Parser)]
#[command(
    name = "autopromo",
    about = "Send one throttled follow-up text to callers",
    version
)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch call events (JSON lines) and dispatch messages
    Run {
        /// Read events from this file instead of stdin
        #[arg(long)]
        events: Option<PathBuf>,
    },
    /// Show settings and throttle state
    Status,
    /// Show send history, newest first
    History {
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Read or change dispatch settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Dispatch to one number now (settings and throttle still apply)
    Send {
        number: String,
        /// Treat the call as happening at this time (RFC 3339)
        #[arg(long)]
        at: Option<String>,
    },
    /// Print the number the call-log fallback would use
    LastCaller,
    /// Show schema status, run pending migrations or roll back the last one
    Migrate {
        #[arg(long)]
        status: bool,
        #[arg(long)]
        rollback: bool,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigAction {
    /// Print the current settings
    Show,
    /// Change one setting (auto_send_enabled, message, interval_days, trigger_policy)
    Set { key: String, value: String },
}

/// Open the persisted store named by the config.
pub fn open_store(config: &Config) -> anyhow::Result<Arc<PrefsStore>> {
    let path = config.store.resolved_path();
    tracing::debug!("Opening store at {}", path.display());
    Ok(Arc::new(PrefsStore::open(&path)?))
}

/// The call-log fallback, or `None` when none is configured.
pub fn call_log(config: &Config) -> Option<Arc<dyn CallLogQuery>> {
    config
        .call_log
        .as_ref()
        .map(|c| Arc::new(CommandCallLog::from_config(c)) as Arc<dyn CallLogQuery>)
}

/// Like [`call_log`] but always answers, for commands that only report.
pub fn call_log_or_none(config: &Config) -> Arc<dyn CallLogQuery> {
    call_log(config).unwrap_or_else(|| Arc::new(NoCallLog))
}
