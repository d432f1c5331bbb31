//! Error types for the WhatsApp watcher.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for the watcher.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse vocabulary file {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Messaging-session errors (transport level).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Transport {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Authentication failed: {reason}")]
    AuthFailed { reason: String },

    #[error("Transport {name} disconnected: {reason}")]
    Disconnected { name: String, reason: String },

    #[error("Transport {name} failed to shut down: {reason}")]
    ShutdownFailed { name: String, reason: String },
}

/// Attachment download, decode, or write failures.
///
/// Always recovered locally: the message continues without media.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Message flagged with media but no source was attached")]
    MissingSource,

    #[error("Media download failed: {0}")]
    Download(String),

    #[error("Media decode failed: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Failed to write media to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures talking to the external processor.
#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    #[error("Failed to spawn processor {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Processor I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Processor failed (exit code {code:?}): {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("Failed to parse processor output: {raw}")]
    InvalidOutput { raw: String },

    #[error("Processor timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure writing a fallback file. There is no further tier below this.
#[derive(Debug, thiserror::Error)]
pub enum FallbackError {
    #[error("Failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write fallback file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Pipeline-related errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Event lost: handoff failed ({handoff}) and fallback failed ({fallback})")]
    EventLost {
        handoff: HandoffError,
        fallback: FallbackError,
    },
}

/// Vault filesystem errors.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the watcher.
pub type Result<T> = std::result::Result<T, Error>;
