//! Error types for mail-retag.

use std::path::PathBuf;

/// Top-level error type for a retag run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors. All of these abort before any mutation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Cannot read rule file {path}: {source}")]
    RulesUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed rule record #{index}: {source}")]
    MalformedRule {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Message store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open store: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Message not found: {id}")]
    NotFound { id: String },

    #[error("Store handle is read-only, refusing to {operation}")]
    ReadOnly { operation: String },
}

/// Errors raised while classifying and tagging messages.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Cannot read mail file {path}: {source}")]
    MailUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse mail file {path}")]
    MailUnparsable { path: PathBuf },

    #[error("Malformed Message-ID {message_id:?} in {path}")]
    MalformedMessageId { message_id: String, path: PathBuf },

    #[error("Can't find Message-ID {message_id} for mail {path}")]
    MessageNotInStore { message_id: String, path: PathBuf },

    #[error("Task {task} failed: {reason}")]
    TaskFailed { task: String, reason: String },

    #[error("Result channel closed with {remaining} worker(s) still running")]
    ChannelClosed { remaining: usize },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias for mail-retag.
pub type Result<T> = std::result::Result<T, Error>;
