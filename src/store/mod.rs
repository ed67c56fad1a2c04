// src/store/mod.rs — Persisted state

pub mod prefs;
pub mod schema;

pub use prefs::{PrefsStore, PrefsTxn};
