// src/cli/send.rs — Manual dispatch to a single number

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::dispatch::{DispatchCandidate, DispatchCoordinator, DispatchOutcome};
use crate::infra::config::Config;
use crate::telephony::{transport, MessageTransport};

pub async fn run_send(config: &Config, number: &str, at: Option<&str>) -> anyhow::Result<()> {
    let at = match at {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map_err(|e| anyhow::anyhow!("invalid --at '{raw}': {e}"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let prefs = super::open_store(config)?;
    let transport: Arc<dyn MessageTransport> = Arc::from(transport::from_config(&config.transport)?);
    let coordinator = DispatchCoordinator::new(prefs, transport);

    let outcome = coordinator
        .dispatch(&DispatchCandidate::manual(number, at))
        .await;

    match outcome {
        DispatchOutcome::Sent { segments } => {
            println!("Sent to {number} ({segments} segment(s)).")
        }
        DispatchOutcome::Skipped(reason) => println!("Not sent: {reason}."),
        DispatchOutcome::Throttled { until } => {
            println!("Throttled: {number} is eligible again at {}.", until.to_rfc3339())
        }
        DispatchOutcome::TransportFailed { error } => anyhow::bail!("send failed: {error}"),
        DispatchOutcome::SentUnrecorded { error } => {
            anyhow::bail!("sent, but the send could not be recorded: {error}")
        }
    }
    Ok(())
}
