//! Structured generation with a single schema-repair pass.
//!
//! This module provides the pieces of a generation run:
//!
//! - [`GenerationOrchestrator`] - Entry point sequencing invoke, repair, and assembly
//! - [`StructuredInvoker`] - One schema-directed call with a tri-state outcome
//! - [`RepairCoordinator`] - The single repair call on invalid output
//! - [`TokenUsage`] - Token accounting across both calls
//! - [`CompletionBackend`] - The LLM capability the pipeline consumes
//! - [`GenerationError`] - Typed failures with validation details

pub mod backend;
pub mod config;
pub mod error;
pub mod invoker;
pub mod metrics;
pub mod orchestrator;
pub mod repair;

pub use backend::{
    ChatMessage, CompletionBackend, RawResponse, Role, StructuredRequest, UsageMetadata,
};
pub use config::GenerationConfig;
pub use error::{
    AttemptRecord, CapabilityError, ErrorPayload, FieldError, GenerationError, InputError,
    SchemaFailure, ValidationDetails,
};
pub use invoker::{Invocation, StructuredInvoker, parse_output};
pub use metrics::TokenUsage;
pub use orchestrator::GenerationOrchestrator;
pub use repair::{RepairCoordinator, build_repair_prompts};
