//! Single structured call: send prompts, parse, validate, report all three outcomes.

use std::sync::LazyLock;

use jsonschema::Validator;
use serde_json::Value;

use super::backend::{ChatMessage, CompletionBackend, RawResponse, StructuredRequest};
use super::error::CapabilityError;
use super::metrics::TokenUsage;
use crate::schema::{GenerationOutput, output_schema};

/// Name under which the output schema is sent to the provider.
pub const OUTPUT_SCHEMA_NAME: &str = "generation_output";

static VALIDATOR: LazyLock<Result<Validator, String>> =
    LazyLock::new(|| Validator::new(output_schema()).map_err(|e| e.to_string()));

/// Outcome of one structured call.
///
/// A failed parse still carries the raw reply, so its token usage can be billed
/// and its text handed to the repair pass.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Validated output, when parsing succeeded.
    pub parsed: Option<GenerationOutput>,
    /// The model's raw reply.
    pub raw: RawResponse,
    /// Parse or validation error text, when parsing failed.
    pub error: Option<String>,
}

impl Invocation {
    /// Whether the call produced a usable output.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.parsed.is_some() && self.error.is_none()
    }

    /// Tokens billed for this call.
    #[must_use]
    pub fn tokens(&self) -> TokenUsage {
        TokenUsage::extract(&self.raw)
    }

    fn from_raw(raw: RawResponse) -> Self {
        match parse_output(&raw.content) {
            Ok(output) => Self {
                parsed: Some(output),
                raw,
                error: None,
            },
            Err(error) => Self {
                parsed: None,
                raw,
                error: Some(error),
            },
        }
    }
}

/// Wraps a [`CompletionBackend`] to request and check [`GenerationOutput`].
pub struct StructuredInvoker<B> {
    backend: B,
}

impl<B: CompletionBackend> StructuredInvoker<B> {
    /// Creates an invoker over the given backend.
    #[must_use]
    pub const fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Model identifier of the underlying backend.
    #[must_use]
    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    /// Sends the prompt pair and parses the reply.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError`] only when the backend itself fails. Bad
    /// output is reported through [`Invocation::error`].
    pub async fn invoke(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<Invocation, CapabilityError> {
        let messages = [
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_prompt),
        ];
        let raw = self
            .backend
            .complete(StructuredRequest {
                messages: &messages,
                schema: output_schema(),
                schema_name: OUTPUT_SCHEMA_NAME,
            })
            .await?;

        Ok(Invocation::from_raw(raw))
    }
}

/// Strips a BOM and any markdown code fence around a JSON payload.
#[must_use]
pub fn extract_json_payload(text: &str) -> &str {
    let trimmed = text.trim().trim_start_matches('\u{feff}').trim();
    let Some(fenced) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line. A fence with no
    // line break keeps its payload on that same line.
    let body = match fenced.split_once('\n') {
        Some((_, rest)) => rest,
        None => fenced.strip_prefix("json").unwrap_or(fenced),
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Collects every JSON schema violation, each prefixed with its instance path.
#[must_use]
pub fn collect_validation_errors(instance: &Value) -> Vec<String> {
    match VALIDATOR.as_ref() {
        Ok(validator) => validator
            .iter_errors(instance)
            .map(|error| format!("At path '{}': {}", error.instance_path, error))
            .collect(),
        Err(e) => vec![format!("Schema compilation error: {e}")],
    }
}

/// Parses model text into a fully validated [`GenerationOutput`].
///
/// # Errors
///
/// Returns a human-readable description of the first stage that failed: JSON
/// syntax, schema conformance (all violations), or deck rules.
pub fn parse_output(text: &str) -> Result<GenerationOutput, String> {
    let payload = extract_json_payload(text);
    let value: Value =
        serde_json::from_str(payload).map_err(|e| format!("JSON parse error: {e}"))?;

    let errors = collect_validation_errors(&value);
    if !errors.is_empty() {
        return Err(format!("JSON validation failed: {}", errors.join("; ")));
    }

    let output: GenerationOutput = serde_json::from_value(value)
        .map_err(|e| format!("Deserialization to GenerationOutput failed: {e}"))?;
    output
        .validate()
        .map_err(|errors| format!("JSON validation failed: {}", errors.join("; ")))?;
    Ok(output)
}
