//! Error types for the reply drafter.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    Missing { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("Failed to read configuration: {0}")]
    Source(String),
}

/// Mailbox provider errors (search, draft, label).
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Search failed: {0}")]
    SearchFailed(String),

    #[error("Draft creation failed: {0}")]
    DraftFailed(String),

    #[error("Label '{name}' does not exist in the mailbox")]
    LabelNotFound { name: String },

    #[error("Labeling failed: {0}")]
    LabelFailed(String),

    #[error("Failed to parse message {id}: {reason}")]
    InvalidMessage { id: String, reason: String },

    #[error("IMAP command '{command}' failed: {response}")]
    Command { command: String, response: String },

    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Completion endpoint errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} returned status {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Workbook (table storage) errors.
#[derive(Debug, thiserror::Error)]
pub enum SheetError {
    #[error("Failed to open workbook: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    #[error("Invalid cell reference: {0}")]
    InvalidCell(String),
}

/// Pipeline errors. Every variant aborts the whole batch.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Configuration missing: {0}")]
    Config(#[from] ConfigError),

    #[error("Mailbox provider failure: {0}")]
    Provider(#[from] MailboxError),

    #[error("Completion failure: {0}")]
    Completion(#[from] LlmError),

    #[error("Sheet write failed: {0}")]
    Sheet(#[from] SheetError),
}
