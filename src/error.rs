//! Error types for inbox-triage.

use std::time::Duration;

/// Top-level error type for a triage run.
///
/// Configuration problems are reported by the binary before a run starts,
/// and classification failures are absorbed by the rule fallback, so
/// neither appears here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Mailbox error: {0}")]
    Mail(#[from] MailError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox (IMAP) errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// The server rejected the credentials.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Socket, TLS or timeout failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Malformed server output or an unsolicited BYE.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server answered a command with NO or BAD.
    #[error("{command} rejected by server: {reason}")]
    Rejected { command: String, reason: String },

    #[error("Failed to decode message {id}: {reason}")]
    Decode { id: String, reason: String },

    #[error("Invalid session state: {0}")]
    InvalidState(String),
}

impl MailError {
    /// Whether this error means the connection itself can no longer be trusted.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Protocol(_))
    }
}

impl From<std::io::Error> for MailError {
    fn from(e: std::io::Error) -> Self {
        Self::Network(e.to_string())
    }
}

impl From<rustls::Error> for MailError {
    fn from(e: rustls::Error) -> Self {
        Self::Network(format!("TLS: {e}"))
    }
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
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

/// Batch classification errors. Every variant sends the batch to the rule fallback.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    /// `truncated` is set when the model stopped at the token limit.
    #[error("Response covered {parsed} of {expected} emails{}", truncation_note(.truncated))]
    CountMismatch {
        expected: usize,
        parsed: usize,
        truncated: bool,
    },
}

fn truncation_note(truncated: &bool) -> &'static str {
    if *truncated { " (cut off at token limit)" } else { "" }
}

/// Result type alias for inbox-triage.
pub type Result<T> = std::result::Result<T, Error>;
