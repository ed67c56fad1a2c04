// src/dispatch/coordinator.rs — One end-to-end dispatch attempt per candidate
//
// settings check -> throttle reservation -> transport -> record.
// A failed send releases its reservation and is never retried.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::dispatch::config::DispatchConfig;
use crate::dispatch::throttle::{Reservation, ThrottleStore};
use crate::dispatch::tracker::DispatchCandidate;
use crate::store::PrefsStore;
use crate::telephony::MessageTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    EmptyTemplate,
    EmptyNumber,
    /// The settings could not be read at all.
    ConfigUnavailable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disabled => "auto send disabled",
            Self::EmptyTemplate => "message is empty",
            Self::EmptyNumber => "number is empty",
            Self::ConfigUnavailable => "settings unavailable",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent { segments: usize },
    Skipped(SkipReason),
    Throttled { until: DateTime<Utc> },
    TransportFailed { error: String },
    /// The text went out but the throttle write failed.
    SentUnrecorded { error: String },
}

impl DispatchOutcome {
    pub fn was_sent(&self) -> bool {
        matches!(
            self,
            DispatchOutcome::Sent { .. } | DispatchOutcome::SentUnrecorded { .. }
        )
    }
}

pub struct DispatchCoordinator {
    prefs: Arc<PrefsStore>,
    throttle: ThrottleStore,
    transport: Arc<dyn MessageTransport>,
}

impl DispatchCoordinator {
    pub fn new(prefs: Arc<PrefsStore>, transport: Arc<dyn MessageTransport>) -> Self {
        Self {
            throttle: ThrottleStore::new(prefs.clone()),
            prefs,
            transport,
        }
    }

    pub fn throttle(&self) -> &ThrottleStore {
        &self.throttle
    }

    /// Run one attempt to completion. Store access happens on the blocking pool.
    pub async fn dispatch(&self, candidate: &DispatchCandidate) -> DispatchOutcome {
        let attempt = short_id();
        let number = candidate.number.trim().to_string();

        tracing::info!(
            target: "autopromo::dispatch",
            "[{}] Candidate {} ({}) at {}",
            attempt,
            number,
            candidate.reason,
            candidate.at.to_rfc3339()
        );

        // 1. Settings
        let prefs = self.prefs.clone();
        let config = match run_blocking(move || DispatchConfig::load(&prefs)).await {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(
                    target: "autopromo::dispatch",
                    "[{}] Cannot load settings: {}",
                    attempt,
                    e
                );
                return DispatchOutcome::Skipped(SkipReason::ConfigUnavailable);
            }
        };

        let skip = if !config.enabled {
            Some(SkipReason::Disabled)
        } else if config.message_template.is_empty() {
            Some(SkipReason::EmptyTemplate)
        } else if number.is_empty() {
            Some(SkipReason::EmptyNumber)
        } else {
            None
        };
        if let Some(reason) = skip {
            tracing::info!(target: "autopromo::dispatch", "[{}] Not sending: {}", attempt, reason);
            return DispatchOutcome::Skipped(reason);
        }

        // 2. Throttle: check and reserve the number in one store transaction
        let throttle = self.throttle.clone();
        let (reserve_number, at) = (number.clone(), candidate.at);
        let reservation = match run_blocking(move || throttle.reserve(&reserve_number, at)).await {
            Ok(reservation) => Some(reservation),
            Err(e) => {
                tracing::warn!(
                    target: "autopromo::dispatch",
                    "[{}] Throttle state unavailable, failing open: {}",
                    attempt,
                    e
                );
                None
            }
        };

        if let Some(Reservation::Blocked { until, .. }) = reservation {
            let until = Utc
                .timestamp_millis_opt(until)
                .single()
                .unwrap_or(candidate.at);
            tracing::info!(
                target: "autopromo::dispatch",
                "[{}] Throttled: {} eligible again at {}",
                attempt,
                number,
                until.to_rfc3339()
            );
            return DispatchOutcome::Throttled { until };
        }

        // 3. Send
        let message = config.message_template;
        let segments = match self.transport.send(&number, &message).await {
            Ok(receipt) => receipt.segments,
            Err(e) => {
                tracing::error!(
                    target: "autopromo::dispatch",
                    "[{}] Send to {} via {} failed: {}",
                    attempt,
                    number,
                    self.transport.name(),
                    e
                );
                if let Some(held) = reservation {
                    let throttle = self.throttle.clone();
                    let release_number = number.clone();
                    if let Err(release_err) =
                        run_blocking(move || throttle.release(&release_number, held)).await
                    {
                        tracing::error!(
                            target: "autopromo::dispatch",
                            "[{}] Could not release reservation for {}: {}",
                            attempt,
                            number,
                            release_err
                        );
                    }
                }
                return DispatchOutcome::TransportFailed {
                    error: e.to_string(),
                };
            }
        };

        // 4. Record
        let throttle = self.throttle.clone();
        let record_number = number.clone();
        match run_blocking(move || throttle.record_send(&record_number, &message, at)).await {
            Ok(()) => {
                tracing::info!(
                    target: "autopromo::dispatch",
                    "[{}] Sent to {} ({} segment(s))",
                    attempt,
                    number,
                    segments
                );
                DispatchOutcome::Sent { segments }
            }
            Err(e) => {
                tracing::error!(
                    target: "autopromo::dispatch",
                    "[{}] Sent to {} but could not record it: {}",
                    attempt,
                    number,
                    e
                );
                DispatchOutcome::SentUnrecorded {
                    error: e.to_string(),
                }
            }
        }
    }
}

async fn run_blocking<T, F>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}
