//! Versioned prompt templates for deck generation.

use crate::schema::{DifficultyLevel, GenerationRequest};

const DECK_SYSTEM_PROMPT_V1: &str = "You are an expert educational content creator.
Your task is to create a set of flashcard concepts for learning.

Rules:
1. Generate between 3-7 concept cards based on the topic.
2. Each concept must have exactly 5 bullet points.
3. Bullets should progress from basic to more nuanced understanding.
4. Set example_possible to true only if a concrete example would help.
5. If example_possible is true, provide a brief example_hint.
6. Keep bullet points concise (under 100 characters each).
7. Ensure concepts are distinct and don't overlap.
8. Match content difficulty to the specified level.

Output valid JSON only. No markdown, no code blocks.";

/// Version tags of every template in the registry, keyed by template name.
pub const PROMPT_VERSIONS: &[(&str, &str)] = &[("deck_system", "v1"), ("deck_user", "v1")];

/// Looks up the version tag of a named template.
#[must_use]
pub fn prompt_version(name: &str) -> Option<&'static str> {
    PROMPT_VERSIONS
        .iter()
        .find(|(template, _)| *template == name)
        .map(|(_, version)| *version)
}

/// A rendered system/user prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    /// System instruction.
    pub system: String,
    /// User instruction.
    pub user: String,
}

/// Renders prompts from generation parameters.
///
/// Implementations must be pure: the same request always renders the same pair.
pub trait PromptProvider: Send + Sync {
    /// Version tag recorded in the generation metadata.
    fn version(&self) -> &str;

    /// Renders the prompt pair for a request.
    fn render(&self, request: &GenerationRequest) -> PromptPair;
}

/// The v1 deck templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeckPromptsV1;

impl PromptProvider for DeckPromptsV1 {
    fn version(&self) -> &str {
        prompt_version("deck_system").unwrap_or("v1")
    }

    fn render(&self, request: &GenerationRequest) -> PromptPair {
        render_deck_prompts(
            request.topic(),
            request.difficulty_level(),
            request.max_concepts(),
            request.scope(),
        )
    }
}

/// Renders the v1 deck prompts.
///
/// The `Scope:` line is only present when a scope is given.
#[must_use]
pub fn render_deck_prompts(
    topic: &str,
    difficulty_level: DifficultyLevel,
    max_concepts: u32,
    scope: Option<&str>,
) -> PromptPair {
    let scope_line = scope.map(|s| format!("Scope: {s}")).unwrap_or_default();
    let user = format!(
        "Create flashcard concepts for:\n\n\
         Topic: {topic}\n\
         Difficulty: {difficulty_level}\n\
         Number of concepts: {max_concepts}\n\
         {scope_line}\n\n\
         Generate educational flashcard concepts following the schema exactly."
    );

    PromptPair {
        system: DECK_SYSTEM_PROMPT_V1.to_string(),
        user,
    }
}
