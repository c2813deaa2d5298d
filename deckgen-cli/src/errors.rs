use deckgen_pipeline::generation::{ErrorPayload, GenerationError};
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the `deckgen` command line.
#[derive(Debug, Error)]
pub enum CliError {
    /// The generation pipeline failed.
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No stored deck has the requested ID.
    #[error("Deck {0} not found")]
    NotFound(Uuid),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File-system failure with the path that caused it.
    #[error("Storage error: {0:#}")]
    Anyhow(#[from] anyhow::Error),
}

impl CliError {
    /// Builds the caller-facing payload printed on failure.
    #[must_use]
    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            Self::Generation(err) => err.to_payload(),
            Self::NotFound(_) => ErrorPayload {
                code: "NOT_FOUND".to_string(),
                message: self.to_string(),
                retryable: false,
                details: None,
                recovery_action: Some("Check the deck ID and try again.".to_string()),
            },
            Self::Config(_) => ErrorPayload {
                code: "CONFIGURATION_ERROR".to_string(),
                message: self.to_string(),
                retryable: false,
                details: None,
                recovery_action: Some(format!(
                    "Set {} and try again.",
                    crate::config::API_KEY_ENV_VAR
                )),
            },
            Self::Io(_) | Self::Json(_) | Self::Anyhow(_) => ErrorPayload {
                code: "INTERNAL_ERROR".to_string(),
                message: self.to_string(),
                retryable: true,
                details: None,
                recovery_action: Some("Retry the request.".to_string()),
            },
        }
    }
}
