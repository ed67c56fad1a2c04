// src/telephony/mod.rs — Boundaries to the device: call events, call log, outbound texts

pub mod call_log;
pub mod event;
pub mod transport;

use async_trait::async_trait;

pub use event::{CallState, EventReader, TelephonyEvent};

/// Result of one logical send, however many transport units it took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReceipt {
    pub segments: usize,
}

/// Outbound text capability. Splitting long text into carrier-sized units
/// is the implementation's job; callers see one success or one failure.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, number: &str, text: &str) -> anyhow::Result<SendReceipt>;
}

/// Fallback lookup for when a call event carried no number.
///
/// Never fails: permission problems or an empty log come back as `None`.
#[async_trait]
pub trait CallLogQuery: Send + Sync {
    async fn most_recent_incoming_number(&self) -> Option<String>;
}
