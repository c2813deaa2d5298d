//! Top-level generation run: invoke, repair once on bad output, account, assemble.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use uuid::Uuid;

use super::backend::CompletionBackend;
use super::config::GenerationConfig;
use super::error::{
    AttemptRecord, CapabilityError, GenerationError, SchemaFailure, ValidationDetails,
};
use super::invoker::{Invocation, StructuredInvoker};
use super::metrics::TokenUsage;
use super::repair::{RepairCoordinator, truncate_chars};
use crate::prompts::{DeckPromptsV1, PromptProvider};
use crate::schema::{GenerationMetadata, GenerationRequest, GenerationResult};

const EMPTY_OUTPUT_ERROR: &str = "Structured output was empty";

/// Turns a [`GenerationRequest`] into a schema-valid [`GenerationResult`].
///
/// A run makes one structured call and, only if that output fails to parse or
/// validate, exactly one repair call. Backend failures are never repaired;
/// they propagate as [`GenerationError::ProviderFailure`]. The orchestrator
/// holds no mutable state, so one instance can serve concurrent runs.
pub struct GenerationOrchestrator<B> {
    invoker: StructuredInvoker<B>,
    prompts: Arc<dyn PromptProvider>,
    config: GenerationConfig,
}

impl<B: CompletionBackend> GenerationOrchestrator<B> {
    /// Creates an orchestrator with the v1 deck prompts and default configuration.
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, GenerationConfig::default())
    }

    /// Creates an orchestrator with the v1 deck prompts and the given configuration.
    #[must_use]
    pub fn with_config(backend: B, config: GenerationConfig) -> Self {
        Self {
            invoker: StructuredInvoker::new(backend),
            prompts: Arc::new(DeckPromptsV1),
            config,
        }
    }

    /// Replaces the prompt provider (fluent builder pattern).
    #[must_use]
    pub fn prompts(mut self, prompts: impl PromptProvider + 'static) -> Self {
        self.prompts = Arc::new(prompts);
        self
    }

    /// Model identifier recorded in the metadata.
    #[must_use]
    pub fn model_name(&self) -> &str {
        self.invoker.model_name()
    }

    /// Runs the pipeline, honouring the configured deadline if any.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::SchemaValidationFailed`] when both the primary
    /// and repair outputs are invalid, and [`GenerationError::ProviderFailure`]
    /// when the backend fails or the deadline expires.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        deck_id: Uuid,
    ) -> Result<GenerationResult, GenerationError> {
        match self.config.deadline {
            Some(deadline) => self.generate_within(request, deck_id, deadline).await,
            None => self.run(request, deck_id).await,
        }
    }

    /// Runs the pipeline under a caller-supplied deadline.
    ///
    /// Expiry cancels whichever call is in flight and is reported as a
    /// provider timeout; it never triggers a repair.
    ///
    /// # Errors
    ///
    /// Same as [`GenerationOrchestrator::generate`].
    pub async fn generate_within(
        &self,
        request: &GenerationRequest,
        deck_id: Uuid,
        deadline: Duration,
    ) -> Result<GenerationResult, GenerationError> {
        if let Ok(result) = tokio::time::timeout(deadline, self.run(request, deck_id)).await {
            result
        } else {
            tracing::error!(
                target: "deckgen",
                deck_id = %deck_id,
                deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                "llm_call_failed: deadline exceeded"
            );
            Err(CapabilityError::Timeout(deadline).into())
        }
    }

    async fn run(
        &self,
        request: &GenerationRequest,
        deck_id: Uuid,
    ) -> Result<GenerationResult, GenerationError> {
        let prompts = self.prompts.render(request);
        let max_chars = self.config.max_diagnostic_chars;

        tracing::info!(
            target: "deckgen",
            model = %self.model_name(),
            deck_id = %deck_id,
            topic = %request.topic(),
            difficulty = %request.difficulty_level(),
            "llm_call_started"
        );

        let timestamp = Utc::now();
        let start = Instant::now();

        let Invocation { parsed, raw, error } = self
            .invoker
            .invoke(&prompts.system, &prompts.user)
            .await
            .inspect_err(|e| log_provider_failure(e, 1))?;
        let mut tokens = TokenUsage::extract(&raw);
        let mut attempts = 1;

        let output = match (parsed, error) {
            (Some(output), None) => output,
            (_, error) => {
                let parsing_error =
                    truncate_chars(error.as_deref().unwrap_or(EMPTY_OUTPUT_ERROR), max_chars);
                let raw_output = truncate_chars(&raw.content, max_chars);

                tracing::warn!(
                    target: "deckgen",
                    parsing_error = %parsing_error,
                    has_raw_response = !raw.content.is_empty(),
                    "llm_output_needs_repair"
                );

                let mut history = vec![AttemptRecord {
                    attempt_number: 1,
                    raw_output: raw_output.clone(),
                    error: parsing_error.clone(),
                    tokens,
                    elapsed: start.elapsed(),
                }];

                attempts += 1;
                let repaired = RepairCoordinator::new(&self.invoker)
                    .repair(&prompts, &raw_output, &parsing_error)
                    .await
                    .inspect_err(|e| log_provider_failure(e, 2))?;
                let repair_tokens = repaired.tokens();
                tokens = tokens.combine(repair_tokens);

                match (repaired.parsed, repaired.error) {
                    (Some(output), None) => {
                        tracing::info!(target: "deckgen", "llm_output_repair_succeeded");
                        output
                    }
                    (_, repair_error) => {
                        let repair_error = truncate_chars(
                            repair_error.as_deref().unwrap_or(EMPTY_OUTPUT_ERROR),
                            max_chars,
                        );
                        history.push(AttemptRecord {
                            attempt_number: 2,
                            raw_output: truncate_chars(&repaired.raw.content, max_chars),
                            error: repair_error.clone(),
                            tokens: repair_tokens,
                            elapsed: start.elapsed(),
                        });

                        let details = ValidationDetails::after_repair(parsing_error, repair_error);
                        tracing::error!(
                            target: "deckgen",
                            parsing_error = %details.parsing_error,
                            repair_error = %details.repair_error,
                            tokens_total = tokens.total,
                            "llm_output_validation_failed_after_repair"
                        );
                        return Err(GenerationError::SchemaValidationFailed(Box::new(
                            SchemaFailure {
                                details,
                                history,
                                tokens,
                            },
                        )));
                    }
                }
            }
        };

        let metadata = GenerationMetadata {
            model: self.model_name().to_string(),
            prompt_version: self.prompts.version().to_string(),
            tokens,
            timestamp,
            rag_used: false,
        };
        let result = GenerationResult::assemble(request, deck_id, output, metadata);

        tracing::info!(
            target: "deckgen",
            model = %self.model_name(),
            deck_id = %deck_id,
            concepts_count = result.concepts().len(),
            attempts,
            tokens_prompt = tokens.prompt,
            tokens_completion = tokens.completion,
            tokens_total = tokens.total,
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "llm_call_completed"
        );

        Ok(result)
    }
}

fn log_provider_failure(error: &CapabilityError, attempt: usize) {
    tracing::error!(
        target: "deckgen",
        error = %error,
        attempt,
        transient = error.is_transient(),
        "llm_call_failed"
    );
}
