// src/infra/errors.rs — Error types for autopromo

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutoPromoError {
    // Store errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown setting '{key}'")]
    UnknownSetting { key: String },

    #[error("Invalid value for '{key}': {message}")]
    InvalidSetting { key: String, message: String },

    // Outbound side
    #[error("Transport '{transport}' failed: {message}")]
    Transport { transport: String, message: String },

    // Infra
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
