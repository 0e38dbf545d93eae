//! Error types for the resume scanner.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mailbox collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Mailbox authentication failed: {0}")]
    AuthFailed(String),

    #[error("Mailbox request {operation} failed: {reason}")]
    RequestFailed { operation: String, reason: String },

    #[error("Mailbox returned status {status} for {operation}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("Message {id} not found")]
    MessageNotFound { id: String },

    #[error("Attachment {attachment_id} not found on message {message_id}")]
    AttachmentNotFound {
        message_id: String,
        attachment_id: String,
    },

    #[error("Invalid mailbox payload: {0}")]
    InvalidPayload(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited (429), retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Pipeline-related errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Mailbox is unavailable, cannot start scan")]
    MailboxUnavailable,

    #[error("Rule production failed: {0}")]
    Rules(String),

    #[error("Classification failed: {0}")]
    Classification(String),

    #[error("PDF text extraction failed: {0}")]
    Extraction(String),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),
}
