// src/telephony/event.rs — Call state-change events and their line-oriented source
//
// The platform delivers one event per state change. On the wire (stdin or a
// replay file) each event is one JSON object per line:
//
//   {"state":"RINGING","number":"+821012345678","observed_at":"2026-10-18T09:00:00Z"}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CallState {
    Idle,
    Ringing,
    OffHook,
}

impl CallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Ringing => "RINGING",
            Self::OffHook => "OFFHOOK",
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IDLE" => Ok(Self::Idle),
            "RINGING" => Ok(Self::Ringing),
            "OFFHOOK" | "OFF_HOOK" => Ok(Self::OffHook),
            other => Err(format!("unknown call state '{other}'")),
        }
    }
}

impl TryFrom<String> for CallState {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CallState> for String {
    fn from(state: CallState) -> Self {
        state.as_str().to_string()
    }
}

/// One state change as reported by the device. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelephonyEvent {
    pub state: CallState,
    #[serde(default, alias = "incoming_number")]
    pub number: Option<String>,
    #[serde(default = "Utc::now", alias = "observedAt")]
    pub observed_at: DateTime<Utc>,
}

impl TelephonyEvent {
    pub fn new(state: CallState, number: Option<&str>, observed_at: DateTime<Utc>) -> Self {
        Self {
            state,
            number: number.map(str::to_string),
            observed_at,
        }
        .normalized()
    }

    /// Blank numbers are the platform's way of saying "withheld".
    pub fn normalized(mut self) -> Self {
        self.number = self
            .number
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        self
    }

    pub fn parse_line(line: &str) -> anyhow::Result<Self> {
        let event: TelephonyEvent = serde_json::from_str(line)?;
        Ok(event.normalized())
    }
}

/// Reads events from a line-oriented source, skipping lines that do not parse.
pub struct EventReader<R> {
    reader: R,
    buf: Vec<u8>,
    line_no: usize,
}

impl<R: AsyncBufRead + Unpin> EventReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line_no: 0,
        }
    }

    /// Next well-formed event, or `None` at end of input. Only a failing
    /// read is an error; undecodable lines are logged and skipped.
    pub async fn next_event(&mut self) -> anyhow::Result<Option<TelephonyEvent>> {
        loop {
            self.buf.clear();
            if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let line = match std::str::from_utf8(&self.buf) {
                Ok(line) => line.trim(),
                Err(e) => {
                    tracing::warn!(
                        target: "autopromo::source",
                        "Skipping non-UTF-8 event on line {}: {}",
                        self.line_no,
                        e
                    );
                    continue;
                }
            };
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match TelephonyEvent::parse_line(line) {
                Ok(event) => return Ok(Some(event)),
                Err(e) => {
                    tracing::warn!(
                        target: "autopromo::source",
                        "Skipping malformed event on line {}: {}",
                        self.line_no,
                        e
                    );
                }
            }
        }
    }

    /// The remaining events as a stream. An I/O error is yielded once and
    /// ends the stream.
    pub fn into_stream(self) -> impl Stream<Item = anyhow::Result<TelephonyEvent>> {
        futures::stream::unfold(Some(self), |reader| async move {
            let Some(mut reader) = reader else {
                return None;
            };
            match reader.next_event().await {
                Ok(Some(event)) => Some((Ok(event), Some(reader))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}
