//! Flashcard deck generation over an unreliable LLM.
//!
//! This crate turns a free-text model call into a schema-guaranteed result:
//! the output is validated against a JSON schema derived from the data model,
//! repaired at most once, and every billed token is accounted for.

pub mod generation;
pub mod prompts;
pub mod schema;

/// Common traits and types for ergonomic usage of the generation pipeline.
pub mod prelude {
    pub use crate::generation::{
        CapabilityError, ChatMessage, CompletionBackend, GenerationConfig, GenerationError,
        GenerationOrchestrator, RawResponse, StructuredRequest, TokenUsage, UsageMetadata,
    };
    pub use crate::prompts::{DeckPromptsV1, PromptPair, PromptProvider};
    pub use crate::schema::{
        Concept, DifficultyLevel, GenerationMetadata, GenerationOutput, GenerationRequest,
        GenerationResult, RawConcept,
    };
}
