//! Error types for AI Relay.

use std::path::PathBuf;

/// Top-level error type for the delivery core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send message on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Failed to edit message {message_id} on channel {name}: {reason}")]
    EditFailed {
        name: String,
        message_id: String,
        reason: String,
    },

    #[error("Failed to start typing indicator on channel {name}: {reason}")]
    TypingFailed { name: String, reason: String },
}

/// Media store errors.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Media file not found: {}: {}", path.display(), source)]
    FileNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown media ref: {reference}")]
    UnknownRef { reference: String },
}

/// Result type alias for the delivery core.
pub type Result<T> = std::result::Result<T, Error>;
