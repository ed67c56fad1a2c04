// src/telephony/call_log.rs — Call-log fallback lookups

use async_trait::async_trait;
use serde::Deserialize;

use crate::infra::config::CallLogConfig;
use crate::telephony::CallLogQuery;

/// One row of the call log as printed by the lookup program.
#[derive(Debug, Clone, Deserialize)]
pub struct CallLogRecord {
    #[serde(alias = "phone_number")]
    pub number: Option<String>,
    #[serde(rename = "type", default)]
    pub call_type: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

impl CallLogRecord {
    /// Incoming, missed and rejected calls all originate from the far end.
    /// Records without a type are given the benefit of the doubt.
    fn is_inbound(&self) -> bool {
        match self.call_type.as_deref() {
            None => true,
            Some(t) => matches!(
                t.to_ascii_uppercase().as_str(),
                "INCOMING" | "MISSED" | "REJECTED" | "1" | "3" | "5"
            ),
        }
    }
}

/// First inbound record with a non-blank number. Records are newest first.
pub fn most_recent_inbound(records: &[CallLogRecord]) -> Option<String> {
    records
        .iter()
        .filter(|r| r.is_inbound())
        .filter_map(|r| r.number.as_deref())
        .map(str::trim)
        .find(|n| !n.is_empty())
        .map(str::to_string)
}

/// Runs a program that prints the call log as a JSON array, newest first.
pub struct CommandCallLog {
    program: String,
    args: Vec<String>,
}

impl CommandCallLog {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &CallLogConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
    }

    async fn query(&self) -> anyhow::Result<Vec<CallLogRecord>> {
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("{} exited with {}: {}", self.program, output.status, stderr.trim());
        }

        let records: Vec<CallLogRecord> = serde_json::from_slice(&output.stdout)?;
        Ok(records)
    }
}

#[async_trait]
impl CallLogQuery for CommandCallLog {
    async fn most_recent_incoming_number(&self) -> Option<String> {
        match self.query().await {
            Ok(records) => {
                let number = most_recent_inbound(&records);
                match &number {
                    Some(n) => tracing::debug!(target: "autopromo::call_log", "Call log returned {}", n),
                    None => tracing::info!(
                        target: "autopromo::call_log",
                        "Call log has no inbound number ({} record(s))",
                        records.len()
                    ),
                }
                number
            }
            Err(e) => {
                tracing::info!(target: "autopromo::call_log", "Call log unavailable: {}", e);
                None
            }
        }
    }
}

/// Used when no call-log program is configured.
pub struct NoCallLog;

#[async_trait]
impl CallLogQuery for NoCallLog {
    async fn most_recent_incoming_number(&self) -> Option<String> {
        tracing::info!(target: "autopromo::call_log", "No call log configured");
        None
    }
}
