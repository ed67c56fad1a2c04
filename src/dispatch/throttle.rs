// src/dispatch/throttle.rs — Per-number send throttle and bounded send history
//
// Two persisted values, both JSON so other readers can display them:
//   last_send_times  {"+821012345678": 1760778000000, ...}
//   send_history     [{"phoneNumber": "...", "message": "...", "timestamp": 1760778000000}, ...]
//
// Both are rewritten together inside one store transaction, so a history entry
// exists exactly when the matching last-send time was written.
//
// A dispatch attempt first reserves the number: the window check and the
// last-send write happen in one IMMEDIATE transaction, so of two attempts
// racing for the same number (in this process or another one sharing the
// file) only the first passes. A failed send releases the reservation.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::dispatch::config::KEY_INTERVAL_DAYS;
use crate::store::{PrefsStore, PrefsTxn};

pub const KEY_LAST_SEND_TIMES: &str = "last_send_times";
pub const KEY_SEND_HISTORY: &str = "send_history";

pub const HISTORY_CAPACITY: usize = 100;
pub const DAY_MILLIS: i64 = 86_400_000;

/// phone number -> epoch millis of the last successful send.
pub type ThrottleRecords = BTreeMap<String, i64>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub phone_number: String,
    pub message: String,
    /// Epoch millis.
    pub timestamp: i64,
}

impl HistoryEntry {
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

/// Outcome of a throttle check, with enough detail to log it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// Throttling is off (`interval_days == 0`).
    Unthrottled { last_sent: Option<i64> },
    /// Never sent, or the window has passed.
    Allowed { last_sent: Option<i64> },
    /// Inside the window; eligible again at `until` (epoch millis).
    Blocked { last_sent: i64, until: i64 },
    /// The persisted state could not be read; treated as allowed.
    FailedOpen,
}

impl Eligibility {
    pub fn allows(&self) -> bool {
        !matches!(self, Eligibility::Blocked { .. })
    }
}

/// Pure window arithmetic: `interval_days == 0` never blocks.
pub fn evaluate(last_sent: Option<i64>, now_ms: i64, interval_days: u32) -> Eligibility {
    if interval_days == 0 {
        return Eligibility::Unthrottled { last_sent };
    }
    match last_sent {
        None => Eligibility::Allowed { last_sent: None },
        Some(at) => {
            let window = i64::from(interval_days) * DAY_MILLIS;
            if now_ms.saturating_sub(at) >= window {
                Eligibility::Allowed { last_sent: Some(at) }
            } else {
                Eligibility::Blocked {
                    last_sent: at,
                    until: at.saturating_add(window),
                }
            }
        }
    }
}

/// Result of [`ThrottleStore::reserve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The number's slot is taken at `at`. `previous` is put back by
    /// [`ThrottleStore::release`] if the send does not happen.
    Held { at: i64, previous: Option<i64> },
    /// Inside the window; eligible again at `until` (epoch millis).
    Blocked { last_sent: i64, until: i64 },
}

#[derive(Clone)]
pub struct ThrottleStore {
    prefs: Arc<PrefsStore>,
}

impl ThrottleStore {
    pub fn new(prefs: Arc<PrefsStore>) -> Self {
        Self { prefs }
    }

    /// `true` when a message may go to `number` at `now`.
    pub fn can_send(&self, number: &str, now: DateTime<Utc>) -> bool {
        self.check(number, now).allows()
    }

    /// Like [`can_send`](Self::can_send) but says why. Reads the interval from
    /// the current settings. Fails open on any read or decode fault.
    pub fn check(&self, number: &str, now: DateTime<Utc>) -> Eligibility {
        let interval_days = match self.prefs.get_json::<u32>(KEY_INTERVAL_DAYS) {
            Ok(days) => days.unwrap_or(0),
            Err(e) => {
                tracing::warn!(
                    target: "autopromo::throttle",
                    "Cannot read interval setting, not throttling: {}",
                    e
                );
                0
            }
        };

        let records = match self.prefs.get_json::<ThrottleRecords>(KEY_LAST_SEND_TIMES) {
            Ok(records) => records.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(
                    target: "autopromo::throttle",
                    "Last-send times unreadable, failing open for {}: {}",
                    number,
                    e
                );
                return Eligibility::FailedOpen;
            }
        };

        let last_sent = records.get(number).copied();
        let eligibility = evaluate(last_sent, now.timestamp_millis(), interval_days);

        if let Eligibility::Unthrottled { last_sent: Some(at) } = eligibility {
            tracing::debug!(
                target: "autopromo::throttle",
                "{} last sent at {} (throttling disabled)",
                number,
                at
            );
        }
        eligibility
    }

    /// Check the window and, when it allows a send, mark `number` as sent at
    /// `now`, all in one transaction. Corrupt throttle state fails open and is
    /// rewritten.
    pub fn reserve(&self, number: &str, now: DateTime<Utc>) -> anyhow::Result<Reservation> {
        let at = now.timestamp_millis();
        let reservation = self.prefs.update(|txn| {
            let interval_days = match txn.get_json::<u32>(KEY_INTERVAL_DAYS) {
                Ok(days) => days.unwrap_or(0),
                Err(e) => {
                    tracing::warn!(
                        target: "autopromo::throttle",
                        "Cannot read interval setting, not throttling: {}",
                        e
                    );
                    0
                }
            };
            let mut records: ThrottleRecords = read_or_reset(txn, KEY_LAST_SEND_TIMES)?;
            let previous = records.get(number).copied();

            if let Eligibility::Blocked { last_sent, until } = evaluate(previous, at, interval_days) {
                return Ok(Reservation::Blocked { last_sent, until });
            }

            records.insert(number.to_string(), at);
            txn.set_json(KEY_LAST_SEND_TIMES, &records)?;
            Ok(Reservation::Held { at, previous })
        })?;

        tracing::debug!(
            target: "autopromo::throttle",
            "Reserve {} at {}: {:?}",
            number,
            at,
            reservation
        );
        Ok(reservation)
    }

    /// Undo a [`Reservation::Held`] after a failed send. A newer write for the
    /// same number is left alone.
    pub fn release(&self, number: &str, reservation: Reservation) -> anyhow::Result<()> {
        let Reservation::Held { at, previous } = reservation else {
            return Ok(());
        };
        self.prefs.update(|txn| {
            let mut records: ThrottleRecords = read_or_reset(txn, KEY_LAST_SEND_TIMES)?;
            if records.get(number) != Some(&at) {
                return Ok(());
            }
            match previous {
                Some(prev) => records.insert(number.to_string(), prev),
                None => records.remove(number),
            };
            txn.set_json(KEY_LAST_SEND_TIMES, &records)
        })?;

        tracing::debug!(target: "autopromo::throttle", "Released reservation for {}", number);
        Ok(())
    }

    /// Record a successful send: set the last-send time, append to history,
    /// evict the oldest history entries beyond capacity. One transaction.
    pub fn record_send(&self, number: &str, message: &str, now: DateTime<Utc>) -> anyhow::Result<()> {
        let at = now.timestamp_millis();
        let evicted = self.prefs.update(|txn| {
            let mut records: ThrottleRecords = read_or_reset(txn, KEY_LAST_SEND_TIMES)?;
            let mut history: VecDeque<HistoryEntry> = read_or_reset(txn, KEY_SEND_HISTORY)?;

            records.insert(number.to_string(), at);
            history.push_back(HistoryEntry {
                phone_number: number.to_string(),
                message: message.to_string(),
                timestamp: at,
            });

            let mut evicted = 0;
            while history.len() > HISTORY_CAPACITY {
                history.pop_front();
                evicted += 1;
            }

            txn.set_json(KEY_LAST_SEND_TIMES, &records)?;
            txn.set_json(KEY_SEND_HISTORY, &history)?;
            Ok(evicted)
        })?;

        tracing::debug!(
            target: "autopromo::throttle",
            "Recorded send to {} at {} ({} history entr{} evicted)",
            number,
            at,
            evicted,
            if evicted == 1 { "y" } else { "ies" }
        );
        Ok(())
    }

    pub fn last_send_times(&self) -> anyhow::Result<ThrottleRecords> {
        Ok(self
            .prefs
            .get_json(KEY_LAST_SEND_TIMES)?
            .unwrap_or_default())
    }

    /// Oldest first.
    pub fn history(&self) -> anyhow::Result<Vec<HistoryEntry>> {
        Ok(self.prefs.get_json(KEY_SEND_HISTORY)?.unwrap_or_default())
    }
}

/// Read a value inside a transaction; an undecodable value is discarded
/// (and logged) so the write that follows repairs it.
fn read_or_reset<T>(txn: &PrefsTxn<'_>, key: &str) -> anyhow::Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(raw) = txn.get(key)? else {
        return Ok(T::default());
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::warn!(
                target: "autopromo::throttle",
                "Discarding corrupt '{}' ({}); starting from empty",
                key,
                e
            );
            Ok(T::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_interval_never_blocks() {
        assert!(evaluate(Some(1_000), 1_000, 0).allows());
        assert_eq!(
            evaluate(Some(1_000), 1_001, 0),
            Eligibility::Unthrottled { last_sent: Some(1_000) }
        );
    }

    #[test]
    fn test_window_boundaries() {
        let t0 = 1_760_778_000_000;
        assert_eq!(
            evaluate(Some(t0), t0, 1),
            Eligibility::Blocked {
                last_sent: t0,
                until: t0 + DAY_MILLIS
            }
        );
        assert!(!evaluate(Some(t0), t0 + DAY_MILLIS - 1, 1).allows());
        assert!(evaluate(Some(t0), t0 + DAY_MILLIS, 1).allows());
        assert!(!evaluate(Some(t0), t0 + 6 * DAY_MILLIS, 7).allows());
    }

    #[test]
    fn test_unknown_number_allowed() {
        assert_eq!(evaluate(None, 0, 30), Eligibility::Allowed { last_sent: None });
    }

    #[test]
    fn test_history_entry_json_shape() {
        let entry = HistoryEntry {
            phone_number: "+821012345678".into(),
            message: "Hi".into(),
            timestamp: 1_760_778_000_000,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(
            json,
            r#"{"phoneNumber":"+821012345678","message":"Hi","timestamp":1760778000000}"#
        );
        assert!(entry.sent_at().is_some());
    }
}
