// src/dispatch/mod.rs — Call-triggered message dispatch

pub mod config;
pub mod coordinator;
pub mod service;
pub mod throttle;
pub mod tracker;

pub use config::{DispatchConfig, TriggerPolicy};
pub use coordinator::{DispatchCoordinator, DispatchOutcome, SkipReason};
pub use service::{DispatchReport, DispatchService, EventInlet, ServiceStats};
pub use throttle::{
    Eligibility, HistoryEntry, Reservation, ThrottleStore, DAY_MILLIS, HISTORY_CAPACITY,
};
pub use tracker::{CallSession, CallStateTracker, DispatchCandidate, TriggerReason};
