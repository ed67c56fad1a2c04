// src/dispatch/tracker.rs — Call lifecycle state machine
//
// Turns the device's IDLE / RINGING / OFFHOOK notifications into at most one
// dispatch candidate per call. One session is tracked at a time; the platform
// serializes call states, so overlapping calls are not modelled.
//
//   Idle ──RINGING──▶ Ringing ──OFFHOOK──▶ OffHook
//     ▲                  │                    │
//     └──────IDLE────────┴────────IDLE────────┘
//
// Anything else (duplicates, OFFHOOK from Idle for outgoing calls, a second
// RINGING while off hook) leaves the session untouched.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::dispatch::config::TriggerPolicy;
use crate::telephony::{CallLogQuery, CallState, TelephonyEvent};

/// What the tracker remembers about the call in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSession {
    pub last_state: CallState,
    pub candidate_number: Option<String>,
    pub was_answered: bool,
    /// A fire / no-fire decision was already taken for this call.
    pub decided: bool,
}

impl Default for CallSession {
    fn default() -> Self {
        Self {
            last_state: CallState::Idle,
            candidate_number: None,
            was_answered: false,
            decided: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    /// The phone started ringing.
    Rang,
    /// An answered call hung up.
    AnsweredThenEnded,
    /// Submitted by an operator rather than a call.
    Manual,
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rang => "rang",
            Self::AnsweredThenEnded => "answered then ended",
            Self::Manual => "manual",
        })
    }
}

/// A request to consider sending to `number`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchCandidate {
    pub number: String,
    pub at: DateTime<Utc>,
    pub reason: TriggerReason,
}

impl DispatchCandidate {
    pub fn manual(number: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            number: number.into(),
            at,
            reason: TriggerReason::Manual,
        }
    }
}

pub struct CallStateTracker {
    session: CallSession,
    call_log: Option<Arc<dyn CallLogQuery>>,
}

impl CallStateTracker {
    /// `call_log` is consulted when the deciding event carried no number.
    pub fn new(call_log: Option<Arc<dyn CallLogQuery>>) -> Self {
        Self {
            session: CallSession::default(),
            call_log,
        }
    }

    pub fn session(&self) -> &CallSession {
        &self.session
    }

    /// Apply one event. Returns a candidate when this event completes the
    /// trigger condition for `policy`.
    pub async fn on_event(
        &mut self,
        event: &TelephonyEvent,
        policy: TriggerPolicy,
    ) -> Option<DispatchCandidate> {
        tracing::debug!(
            target: "autopromo::tracker",
            "{} -> {} (number: {}, policy: {})",
            self.session.last_state,
            event.state,
            event.number.as_deref().unwrap_or("-"),
            policy
        );

        match (self.session.last_state, event.state) {
            (CallState::Idle, CallState::Ringing) => {
                self.session = CallSession {
                    last_state: CallState::Ringing,
                    candidate_number: event.number.clone(),
                    was_answered: false,
                    decided: false,
                };

                if policy == TriggerPolicy::OnRing {
                    self.session.decided = true;
                    let number = self.session.candidate_number.take();
                    return self.resolve(number, event.observed_at, TriggerReason::Rang).await;
                }
                None
            }

            (CallState::Ringing, CallState::OffHook) => {
                self.session.last_state = CallState::OffHook;
                self.session.was_answered = true;
                None
            }

            (CallState::Ringing | CallState::OffHook, CallState::Idle) => {
                let ended = std::mem::take(&mut self.session);
                self.on_call_ended(ended, event, policy).await
            }

            (from, to) => {
                tracing::debug!(
                    target: "autopromo::tracker",
                    "Ignoring {} while {}",
                    to,
                    from
                );
                None
            }
        }
    }

    async fn on_call_ended(
        &self,
        ended: CallSession,
        event: &TelephonyEvent,
        policy: TriggerPolicy,
    ) -> Option<DispatchCandidate> {
        if ended.decided {
            tracing::debug!(target: "autopromo::tracker", "Call ended; already handled at ring");
            return None;
        }

        match policy {
            TriggerPolicy::OnAnswerEnd if ended.was_answered => {
                tracing::info!(target: "autopromo::tracker", "Answered call ended");
                self.resolve(
                    ended.candidate_number,
                    event.observed_at,
                    TriggerReason::AnsweredThenEnded,
                )
                .await
            }
            TriggerPolicy::OnAnswerEnd => {
                tracing::info!(
                    target: "autopromo::tracker",
                    "Call ended without being answered; nothing to send"
                );
                None
            }
            TriggerPolicy::OnRing => {
                // Policy changed while the call was ringing.
                tracing::info!(
                    target: "autopromo::tracker",
                    "Call ended; ring-time trigger was not active when it rang"
                );
                None
            }
        }
    }

    async fn resolve(
        &self,
        number: Option<String>,
        at: DateTime<Utc>,
        reason: TriggerReason,
    ) -> Option<DispatchCandidate> {
        let number = match number {
            Some(n) => Some(n),
            None => match &self.call_log {
                Some(log) => log.most_recent_incoming_number().await,
                None => None,
            },
        };

        match number {
            Some(number) => Some(DispatchCandidate { number, at, reason }),
            None => {
                tracing::info!(
                    target: "autopromo::tracker",
                    "No number available for call that {}; skipping",
                    reason
                );
                None
            }
        }
    }
}
