// src/infra/config.rs — Application configuration loading (TOML)
//
// This is the operator-side configuration: where state lives and how the
// outbound transport and call log are reached. The dispatch policy itself
// (enabled, message, interval, trigger) lives in the persisted store, see
// `crate::dispatch::config`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    /// Call-log fallback (optional section in config.toml).
    #[serde(default)]
    pub call_log: Option<CallLogConfig>,

    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file; defaults to `<data_dir>/autopromo.db`.
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(paths::db_path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Command,
    #[default]
    DryRun,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,
    /// Program to run for `kind = "command"`.
    pub program: Option<String>,
    /// Arguments; `{number}` and `{text}` are substituted per send.
    #[serde(default = "default_transport_args")]
    pub args: Vec<String>,
    #[serde(default = "default_max_segment_chars")]
    pub max_segment_chars: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::DryRun,
            program: None,
            args: default_transport_args(),
            max_segment_chars: default_max_segment_chars(),
        }
    }
}

fn default_transport_args() -> Vec<String> {
    vec!["-n".into(), "{number}".into(), "{text}".into()]
}

fn default_max_segment_chars() -> usize {
    70
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLogConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub queue_capacity: usize,
    pub log_level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            log_level: "info".into(),
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.transport.kind == TransportKind::Command && self.transport.program.is_none() {
            anyhow::bail!("[transport] kind = \"command\" requires `program`");
        }
        if self.transport.max_segment_chars == 0 {
            anyhow::bail!("[transport] max_segment_chars must be positive");
        }
        if self.runtime.queue_capacity == 0 {
            anyhow::bail!("[runtime] queue_capacity must be positive");
        }
        Ok(())
    }
}
