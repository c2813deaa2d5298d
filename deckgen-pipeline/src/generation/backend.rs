//! The LLM capability consumed by the pipeline.
//!
//! A [`CompletionBackend`] sends an ordered list of role-tagged messages to a
//! model, asking for output matching a JSON schema, and hands back whatever the
//! model said. It owns its own low-level transient retries and timeouts; the
//! pipeline only sees the final raw response or a [`CapabilityError`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::CapabilityError;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction.
    System,
    /// User instruction.
    User,
}

/// A role-tagged chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who the message is from.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Usage counters as reported by a provider. Any of them may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetadata {
    /// Prompt tokens.
    pub input_tokens: Option<u64>,
    /// Completion tokens.
    pub output_tokens: Option<u64>,
    /// Total tokens.
    pub total_tokens: Option<u64>,
}

impl UsageMetadata {
    /// Usage with all three counters present.
    #[must_use]
    pub const fn new(input_tokens: u64, output_tokens: u64, total_tokens: u64) -> Self {
        Self {
            input_tokens: Some(input_tokens),
            output_tokens: Some(output_tokens),
            total_tokens: Some(total_tokens),
        }
    }
}

/// What the model returned for one call, before any parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResponse {
    /// Text content of the reply.
    pub content: String,
    /// Usage metadata, when the provider reported it.
    pub usage: Option<UsageMetadata>,
}

impl RawResponse {
    /// A response with the given text and no usage metadata.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
        }
    }

    /// Attaches usage metadata.
    #[must_use]
    pub const fn with_usage(mut self, usage: UsageMetadata) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// A single structured-output call.
#[derive(Debug, Clone, Copy)]
pub struct StructuredRequest<'a> {
    /// Ordered conversation, system messages first.
    pub messages: &'a [ChatMessage],
    /// JSON schema the reply must conform to.
    pub schema: &'a Value,
    /// Name for the schema, for providers that require one.
    pub schema_name: &'a str,
}

/// An LLM provider capable of schema-directed completions.
///
/// Implementations must be safe to share across concurrent generation runs.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Identifier of the model this backend calls.
    fn model_name(&self) -> &str;

    /// Sends the request and returns the model's raw reply.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError`] for transport, authentication, rate-limit,
    /// or timeout failures that survived the backend's own retries.
    async fn complete(&self, request: StructuredRequest<'_>)
        -> Result<RawResponse, CapabilityError>;
}

#[async_trait]
impl<T> CompletionBackend for Arc<T>
where
    T: CompletionBackend + ?Sized,
{
    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    async fn complete(
        &self,
        request: StructuredRequest<'_>,
    ) -> Result<RawResponse, CapabilityError> {
        (**self).complete(request).await
    }
}
