// src/dispatch/config.rs — Dispatch policy stored alongside the throttle state
//
// The settings surface writes these keys; the core only reads them, once per
// decision. A key that is missing or does not decode falls back to its default.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::infra::errors::AutoPromoError;
use crate::store::PrefsStore;

pub const KEY_ENABLED: &str = "auto_send_enabled";
pub const KEY_MESSAGE: &str = "message";
pub const KEY_INTERVAL_DAYS: &str = "interval_days";
pub const KEY_TRIGGER_POLICY: &str = "trigger_policy";

/// When a call produces a dispatch candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPolicy {
    /// As soon as the phone starts ringing, answered or not.
    OnRing,
    /// When an answered call hangs up. Unanswered calls produce nothing.
    #[default]
    OnAnswerEnd,
}

impl TriggerPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnRing => "on_ring",
            Self::OnAnswerEnd => "on_answer_end",
        }
    }
}

impl fmt::Display for TriggerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "on_ring" => Ok(Self::OnRing),
            "on_answer_end" => Ok(Self::OnAnswerEnd),
            other => Err(format!(
                "unknown trigger policy '{other}' (expected on_ring or on_answer_end)"
            )),
        }
    }
}

/// Read-only snapshot of the dispatch settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DispatchConfig {
    pub enabled: bool,
    pub message_template: String,
    /// 0 disables throttling.
    pub interval_days: u32,
    pub trigger_policy: TriggerPolicy,
}

impl DispatchConfig {
    /// Snapshot the settings. Only a failure to read the store at all is an error.
    pub fn load(store: &PrefsStore) -> anyhow::Result<Self> {
        Ok(Self {
            enabled: read_or_default(store, KEY_ENABLED)?,
            message_template: read_or_default(store, KEY_MESSAGE)?,
            interval_days: read_or_default(store, KEY_INTERVAL_DAYS)?,
            trigger_policy: read_or_default(store, KEY_TRIGGER_POLICY)?,
        })
    }

    /// Persist every field.
    pub fn save(&self, store: &PrefsStore) -> anyhow::Result<()> {
        store.update(|txn| {
            txn.set_json(KEY_ENABLED, &self.enabled)?;
            txn.set_json(KEY_MESSAGE, &self.message_template)?;
            txn.set_json(KEY_INTERVAL_DAYS, &self.interval_days)?;
            txn.set_json(KEY_TRIGGER_POLICY, &self.trigger_policy)?;
            Ok(())
        })
    }
}

fn read_or_default<T>(store: &PrefsStore, key: &str) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    let Some(raw) = store.get(key)? else {
        return Ok(T::default());
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::warn!(
                target: "autopromo::config",
                "Setting '{}' holds an undecodable value ({}); using default",
                key,
                e
            );
            Ok(T::default())
        }
    }
}

/// Validate an operator-supplied `value` for `key` and return its stored JSON form.
pub fn encode_setting(key: &str, value: &str) -> Result<String, AutoPromoError> {
    let invalid = |message: String| AutoPromoError::InvalidSetting {
        key: key.to_string(),
        message,
    };

    let json = match key {
        KEY_ENABLED => {
            let parsed: bool = match value.trim().to_ascii_lowercase().as_str() {
                "true" | "on" | "yes" | "1" => true,
                "false" | "off" | "no" | "0" => false,
                other => return Err(invalid(format!("'{other}' is not a boolean"))),
            };
            serde_json::to_string(&parsed)?
        }
        KEY_MESSAGE => serde_json::to_string(value)?,
        KEY_INTERVAL_DAYS => {
            let days: u32 = value
                .trim()
                .parse()
                .map_err(|_| invalid(format!("'{value}' is not a non-negative integer")))?;
            serde_json::to_string(&days)?
        }
        KEY_TRIGGER_POLICY => {
            let policy: TriggerPolicy = value.parse().map_err(invalid)?;
            serde_json::to_string(&policy)?
        }
        _ => {
            return Err(AutoPromoError::UnknownSetting {
                key: key.to_string(),
            })
        }
    };
    Ok(json)
}
