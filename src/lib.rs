// src/lib.rs — Library root for autopromo

pub mod cli;
pub mod dispatch;
pub mod infra;
pub mod store;
pub mod telephony;
