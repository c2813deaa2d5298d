//! Rig-backed implementation of the generation capability.
//!
//! [`RigBackend`] adapts any Rig [`CompletionModel`] to the pipeline's
//! [`CompletionBackend`] trait. It owns the low-level concerns the pipeline
//! leaves to the capability: a per-call timeout, a bounded retry on transient
//! failures, and mapping Rig errors into [`CapabilityError`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use deckgen_pipeline::generation::{
    CapabilityError, CompletionBackend, RawResponse, Role, StructuredRequest, UsageMetadata,
};
use rig::OneOrMany;
use rig::completion::{message::AssistantContent, CompletionError, CompletionModel, Usage};
use serde_json::{json, Value};

use crate::config::ClientConfig;

/// A Rig completion model wrapped as a [`CompletionBackend`].
pub struct RigBackend<M> {
    model: M,
    config: ClientConfig,
}

impl<M> RigBackend<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    /// Wraps `model`; `config.model` is the name reported in metadata.
    #[must_use]
    pub const fn new(model: M, config: ClientConfig) -> Self {
        Self { model, config }
    }

    async fn attempt(
        &self,
        preamble: &str,
        prompt: &str,
        params: Option<&Value>,
    ) -> Result<RawResponse, CapabilityError> {
        let mut builder = self
            .model
            .completion_request(prompt.to_string())
            .preamble(preamble.to_string())
            .temperature(self.config.temperature);
        if let Some(params) = params {
            builder = builder.additional_params(params.clone());
        }

        let response = tokio::time::timeout(self.config.timeout, builder.send())
            .await
            .map_err(|_| CapabilityError::Timeout(self.config.timeout))?
            .map_err(|e| classify_completion_error(&e))?;

        Ok(RawResponse {
            content: response_text(&response.choice),
            usage: Some(usage_metadata(&response.usage)),
        })
    }

    fn request_params(&self, request: &StructuredRequest<'_>) -> Option<Value> {
        let mut params = self
            .config
            .native_structured_output
            .then(|| structured_output_params(request));
        if let Some(extra) = &self.config.additional_params {
            merge_params(params.get_or_insert_with(|| json!({})), extra);
        }
        params
    }
}

#[async_trait]
impl<M> CompletionBackend for RigBackend<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn complete(
        &self,
        request: StructuredRequest<'_>,
    ) -> Result<RawResponse, CapabilityError> {
        let (preamble, prompt) = split_messages(&request);
        let params = self.request_params(&request);
        let (preamble, prompt, params) = (preamble.as_str(), prompt.as_str(), params.as_ref());
        let this = self;

        retry_transient(self.config.max_retries, self.config.retry_backoff, move || {
            this.attempt(preamble, prompt, params)
        })
        .await
    }
}

/// Runs `call` until it succeeds, fails with a non-transient error, or has
/// been retried `max_retries` times. The n-th retry waits `backoff * n`.
pub async fn retry_transient<T, F, Fut>(
    max_retries: u32,
    backoff: Duration,
    mut call: F,
) -> Result<T, CapabilityError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CapabilityError>>,
{
    let mut retry = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && retry < max_retries => {
                retry += 1;
                let delay = backoff * retry;
                tracing::warn!(
                    target: "deckgen",
                    error = %err,
                    retry,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Transient provider failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Provider parameters asking for native JSON-schema structured output.
///
/// Uses the chat-completions `response_format` shape. Strict mode stays off
/// because the derived schema carries length bounds strict mode rejects.
#[must_use]
pub fn structured_output_params(request: &StructuredRequest<'_>) -> Value {
    json!({
        "response_format": {
            "type": "json_schema",
            "json_schema": {
                "name": request.schema_name,
                "schema": request.schema,
                "strict": false
            }
        }
    })
}

/// Shallow-merges the keys of `extra` into `base`; `extra` wins.
fn merge_params(base: &mut Value, extra: &Value) {
    match (base.as_object_mut(), extra.as_object()) {
        (Some(base), Some(extra)) => {
            base.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        _ => *base = extra.clone(),
    }
}

/// Flattens a structured request into a Rig preamble and prompt.
///
/// System messages are joined into the preamble, followed by the schema
/// instruction, so providers without native structured output still see it.
#[must_use]
pub fn split_messages(request: &StructuredRequest<'_>) -> (String, String) {
    let join = |role: Role| {
        request
            .messages
            .iter()
            .filter(|m| m.role == role)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    let schema =
        serde_json::to_string(request.schema).unwrap_or_else(|_| request.schema.to_string());
    let mut preamble = join(Role::System);
    if !preamble.is_empty() {
        preamble.push_str("\n\n");
    }
    preamble.push_str(&format!(
        "Respond with a single JSON object named `{}` that conforms to this JSON schema:\n{schema}",
        request.schema_name
    ));

    (preamble, join(Role::User))
}

/// Concatenates the text parts of a Rig response.
#[must_use]
pub fn response_text(choice: &OneOrMany<AssistantContent>) -> String {
    choice
        .iter()
        .filter_map(|content| match content {
            AssistantContent::Text(text) => Some(text.text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

/// Converts Rig usage into pipeline usage metadata.
///
/// Rig reports zeros when a provider omits usage; zeros are kept as-is since
/// the token accountant treats missing and zero the same way.
#[must_use]
pub const fn usage_metadata(usage: &Usage) -> UsageMetadata {
    UsageMetadata::new(usage.input_tokens, usage.output_tokens, usage.total_tokens)
}

fn classify_completion_error(error: &CompletionError) -> CapabilityError {
    classify_error_message(
        matches!(error, CompletionError::HttpError(_)),
        &error.to_string(),
    )
}

/// Maps a provider error message onto a [`CapabilityError`] class.
///
/// Authentication and rate-limit failures are recognised by status code or
/// wording; remaining transport errors stay transient, anything else is a
/// plain provider error.
#[must_use]
pub fn classify_error_message(is_transport: bool, message: &str) -> CapabilityError {
    let lower = message.to_lowercase();
    if lower.contains("401") || lower.contains("unauthorized") || lower.contains("api key") {
        CapabilityError::Auth(message.to_string())
    } else if lower.contains("429") || lower.contains("rate limit") {
        CapabilityError::RateLimited(message.to_string())
    } else if is_transport {
        CapabilityError::Transport(message.to_string())
    } else {
        CapabilityError::Provider(message.to_string())
    }
}
