//! Error taxonomy for deck generation, with attempt history and caller-facing payloads.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::metrics::TokenUsage;

/// A request that failed normalization or validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// Topic is empty after whitespace normalization.
    #[error("topic must not be empty")]
    EmptyTopic,

    /// A text field exceeds its character limit.
    #[error("{field} must be at most {max} characters (got {len})")]
    TooLong {
        /// Offending field.
        field: &'static str,
        /// Allowed maximum.
        max: usize,
        /// Actual length after normalization.
        len: usize,
    },

    /// `max_concepts` outside 3..=7.
    #[error("max_concepts must be between 3 and 7 (got {0})")]
    MaxConceptsOutOfRange(u32),

    /// Difficulty is not one of beginner, intermediate or advanced.
    #[error("unknown difficulty level '{0}' (expected beginner, intermediate or advanced)")]
    UnknownDifficulty(String),
}

impl InputError {
    /// Name of the request field the error refers to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyTopic => "topic",
            Self::TooLong { field, .. } => field,
            Self::MaxConceptsOutOfRange(_) => "max_concepts",
            Self::UnknownDifficulty(_) => "difficulty_level",
        }
    }
}

/// Failure surfaced by the LLM capability itself, as opposed to bad output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// The call (or the caller's deadline) ran out of time.
    #[error("LLM request timed out after {0:?}")]
    Timeout(Duration),

    /// Network or HTTP transport failure.
    #[error("LLM transport error: {0}")]
    Transport(String),

    /// Credentials were missing or rejected.
    #[error("LLM authentication failed: {0}")]
    Auth(String),

    /// The provider throttled the request.
    #[error("LLM rate limit exceeded: {0}")]
    RateLimited(String),

    /// Any other provider-reported failure.
    #[error("LLM provider error: {0}")]
    Provider(String),
}

impl CapabilityError {
    /// Whether a low-level retry of the same call may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Transport(_) | Self::RateLimited(_)
        )
    }
}

/// One entry of `validation_errors` in error details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field the error refers to.
    pub field: String,
    /// Human-readable message.
    pub message: String,
    /// Machine error kind.
    #[serde(rename = "type")]
    pub kind: String,
}

/// Structured details attached to a schema validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationDetails {
    /// Field-level errors.
    pub validation_errors: Vec<FieldError>,
    /// Error text of the primary attempt.
    pub parsing_error: String,
    /// Error text of the repair attempt.
    pub repair_error: String,
}

impl ValidationDetails {
    /// Details for an output that stayed invalid after the repair pass.
    #[must_use]
    pub fn after_repair(parsing_error: impl Into<String>, repair_error: impl Into<String>) -> Self {
        Self {
            validation_errors: vec![FieldError {
                field: "response".to_string(),
                message: "Deck output failed schema validation after repair attempt.".to_string(),
                kind: "schema_validation_failed".to_string(),
            }],
            parsing_error: parsing_error.into(),
            repair_error: repair_error.into(),
        }
    }
}

/// Record of a single failed structured call.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// The attempt number (1 = primary, 2 = repair).
    pub attempt_number: usize,
    /// Raw model output text.
    pub raw_output: String,
    /// Parse or validation error text.
    pub error: String,
    /// Tokens billed for this call.
    pub tokens: TokenUsage,
    /// Elapsed time since the run started.
    pub elapsed: Duration,
}

/// Everything known about a run whose output never validated.
#[derive(Debug, Clone)]
pub struct SchemaFailure {
    /// Caller-facing diagnostics.
    pub details: ValidationDetails,
    /// Both failed attempts, in order.
    pub history: Vec<AttemptRecord>,
    /// Tokens billed across both attempts.
    pub tokens: TokenUsage,
}

/// Errors returned by [`GenerationOrchestrator::generate`](super::GenerationOrchestrator::generate).
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The request was rejected before any LLM call.
    #[error("Invalid generation request: {0}")]
    InputInvalid(#[from] InputError),

    /// Primary and repair outputs both failed to parse or validate.
    #[error("Deck output failed schema validation.")]
    SchemaValidationFailed(Box<SchemaFailure>),

    /// The LLM capability failed (transport, auth, rate limit, timeout).
    #[error("Failed to generate deck: {0}")]
    ProviderFailure(#[from] CapabilityError),
}

/// Caller-facing error body, suitable for any transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Stable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Whether resubmitting the same request may succeed.
    pub retryable: bool,
    /// Structured diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Suggested next step for the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_action: Option<String>,
}

impl GenerationError {
    /// Stable error code for the failure class.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InputInvalid(_) => "INVALID_INPUT",
            Self::SchemaValidationFailed(_) => "SCHEMA_VALIDATION_FAILED",
            Self::ProviderFailure(_) => "LLM_PROVIDER_ERROR",
        }
    }

    /// Only provider failures are worth resubmitting unchanged.
    #[must_use]
    pub const fn retryable(&self) -> bool {
        matches!(self, Self::ProviderFailure(_))
    }

    /// Suggested next step for the caller.
    #[must_use]
    pub const fn recovery_action(&self) -> &'static str {
        match self {
            Self::InputInvalid(_) => "Fix invalid fields and try again.",
            Self::SchemaValidationFailed(_) => "Try a narrower topic and regenerate the deck.",
            Self::ProviderFailure(_) => "Retry in a few seconds.",
        }
    }

    /// Validation details, when the output never validated.
    #[must_use]
    pub fn details(&self) -> Option<&ValidationDetails> {
        match self {
            Self::SchemaValidationFailed(failure) => Some(&failure.details),
            _ => None,
        }
    }

    /// Builds the caller-facing payload.
    #[must_use]
    pub fn to_payload(&self) -> ErrorPayload {
        let (message, details) = match self {
            Self::InputInvalid(err) => (
                "Request validation failed.".to_string(),
                Some(serde_json::json!({
                    "validation_errors": [FieldError {
                        field: err.field().to_string(),
                        message: err.to_string(),
                        kind: "value_error".to_string(),
                    }]
                })),
            ),
            Self::SchemaValidationFailed(failure) => (
                self.to_string(),
                serde_json::to_value(&failure.details).ok(),
            ),
            Self::ProviderFailure(_) => ("Failed to generate deck".to_string(), None),
        };

        ErrorPayload {
            code: self.code().to_string(),
            message,
            retryable: self.retryable(),
            details,
            recovery_action: Some(self.recovery_action().to_string()),
        }
    }
}
