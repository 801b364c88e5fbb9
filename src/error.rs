//! Error types for qr-reply.

use std::path::PathBuf;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Blob store errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Invalid object key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Storage IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// QR rendering errors.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Could not encode {url}: {reason}")]
    Encode { url: String, reason: String },

    #[error("Could not load background {}: {reason}", path.display())]
    Background { path: PathBuf, reason: String },

    #[error("Could not write {}: {reason}", path.display())]
    Output { path: PathBuf, reason: String },

    #[error("Render task failed: {0}")]
    Task(String),
}

/// Outbound mail errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("Failed to send email: {0}")]
    SendFailed(String),
}

/// Failure of a single attachment unit. Reported in the reply, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    #[error("{0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Render(#[from] RenderError),

    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cancelled")]
    Cancelled,
}

/// Fatal-to-run pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Couldn't fetch raw message: {0}")]
    Fetch(#[source] StorageError),

    #[error("Couldn't read email: {0}")]
    Parse(String),

    #[error("Missing receipt.recipients from message {message_id}")]
    MissingRecipients { message_id: String },

    #[error("Couldn't prepare work directory {}: {source}", path.display())]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Couldn't write background image {}: {source}", path.display())]
    Background {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Couldn't send reply: {0}")]
    Reply(#[from] MailError),

    #[error("Run cancelled")]
    Cancelled,
}
