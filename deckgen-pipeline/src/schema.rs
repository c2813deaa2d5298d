//! Data model for deck generation: requests, LLM output, and the ID-bearing result.
//!
//! Two shapes exist for a concept. [`RawConcept`] is what the model produces and
//! carries no identity; [`Concept`] is the promoted form with a card identifier
//! assigned by the pipeline. The JSON schema sent to the model is derived from
//! [`GenerationOutput`] with `schemars`.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::generation::error::InputError;
use crate::generation::metrics::TokenUsage;

/// Version marker carried by every [`GenerationResult`].
pub const SCHEMA_VERSION: &str = "1.0";

/// Maximum length (in characters) of a topic or scope after normalization.
pub const MAX_TOPIC_CHARS: usize = 200;
/// Smallest number of concepts a deck may hold.
pub const MIN_CONCEPTS: usize = 3;
/// Largest number of concepts a deck may hold.
pub const MAX_CONCEPTS: usize = 7;
/// Exact number of bullets every concept carries.
pub const BULLETS_PER_CONCEPT: usize = 5;
/// Maximum length (in characters) of a single bullet.
pub const MAX_BULLET_CHARS: usize = 300;
/// Maximum length (in characters) of a concept title.
pub const MAX_TITLE_CHARS: usize = 100;

const DEFAULT_MAX_CONCEPTS: u32 = 5;

/// Collapses runs of whitespace into single spaces and trims both ends.
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Target difficulty of the generated deck.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
    /// Introductory material.
    #[default]
    Beginner,
    /// Assumes working familiarity with the basics.
    Intermediate,
    /// Nuanced, expert-leaning material.
    Advanced,
}

impl DifficultyLevel {
    /// Returns the lowercase wire name of the level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

impl fmt::Display for DifficultyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DifficultyLevel {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            _ => Err(InputError::UnknownDifficulty(s.to_string())),
        }
    }
}

/// A validated, normalized request to generate a deck.
///
/// Instances can only be obtained through [`GenerationRequest::new`],
/// [`GenerationRequest::for_topic`] or deserialization, all of which normalize
/// and validate, so a value in hand always satisfies the request invariants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GenerationRequestInput")]
pub struct GenerationRequest {
    topic: String,
    difficulty_level: DifficultyLevel,
    max_concepts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
}

/// Wire form of a request before normalization.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GenerationRequestInput {
    topic: String,
    #[serde(default)]
    difficulty_level: DifficultyLevel,
    #[serde(default = "default_max_concepts")]
    max_concepts: u32,
    #[serde(default)]
    scope: Option<String>,
}

const fn default_max_concepts() -> u32 {
    DEFAULT_MAX_CONCEPTS
}

impl TryFrom<GenerationRequestInput> for GenerationRequest {
    type Error = InputError;

    fn try_from(input: GenerationRequestInput) -> Result<Self, Self::Error> {
        Self::new(
            input.topic,
            input.difficulty_level,
            input.max_concepts,
            input.scope,
        )
    }
}

impl GenerationRequest {
    /// Normalizes and validates a request.
    ///
    /// Topic and scope have internal whitespace collapsed and edges trimmed
    /// before length checks. A scope that normalizes to nothing is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`InputError`] if the topic is empty, the topic or scope is
    /// longer than [`MAX_TOPIC_CHARS`], or `max_concepts` is outside
    /// [`MIN_CONCEPTS`]..=[`MAX_CONCEPTS`].
    pub fn new(
        topic: impl Into<String>,
        difficulty_level: DifficultyLevel,
        max_concepts: u32,
        scope: Option<String>,
    ) -> Result<Self, InputError> {
        let topic = normalize_whitespace(&topic.into());
        if topic.is_empty() {
            return Err(InputError::EmptyTopic);
        }
        check_length("topic", &topic, MAX_TOPIC_CHARS)?;

        let scope = scope
            .map(|s| normalize_whitespace(&s))
            .filter(|s| !s.is_empty());
        if let Some(scope) = &scope {
            check_length("scope", scope, MAX_TOPIC_CHARS)?;
        }

        let count = usize::try_from(max_concepts).unwrap_or(usize::MAX);
        if !(MIN_CONCEPTS..=MAX_CONCEPTS).contains(&count) {
            return Err(InputError::MaxConceptsOutOfRange(max_concepts));
        }

        Ok(Self {
            topic,
            difficulty_level,
            max_concepts,
            scope,
        })
    }

    /// Builds a request for `topic` with the default difficulty and concept count.
    ///
    /// # Errors
    ///
    /// Same as [`GenerationRequest::new`].
    pub fn for_topic(topic: impl Into<String>) -> Result<Self, InputError> {
        Self::new(
            topic,
            DifficultyLevel::default(),
            DEFAULT_MAX_CONCEPTS,
            None,
        )
    }

    /// The normalized topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The requested difficulty.
    #[must_use]
    pub const fn difficulty_level(&self) -> DifficultyLevel {
        self.difficulty_level
    }

    /// How many concepts the model is asked for.
    #[must_use]
    pub const fn max_concepts(&self) -> u32 {
        self.max_concepts
    }

    /// The normalized scope, if any.
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }
}

fn check_length(field: &'static str, value: &str, max: usize) -> Result<(), InputError> {
    let len = value.chars().count();
    if len > max {
        return Err(InputError::TooLong { field, max, len });
    }
    Ok(())
}

/// A concept as produced by the model, before it is given an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RawConcept {
    /// Short title of the card.
    #[schemars(length(min = 1, max = 100))]
    pub title: String,
    /// Exactly five bullets, progressing from basic to nuanced.
    #[schemars(length(min = 5, max = 5))]
    #[schemars(inner(length(min = 1, max = 300)))]
    pub bullets: Vec<String>,
    /// Whether a concrete example would help the learner.
    pub example_possible: bool,
    /// Brief pointer to a useful example.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example_hint: Option<String>,
}

impl RawConcept {
    /// Checks the rules the JSON schema cannot express precisely (blank text
    /// and character counts), returning one message per violation.
    fn violations(&self, index: usize) -> Vec<String> {
        let mut errors = Vec::new();
        let at = format!("/concepts/{index}");

        if self.title.trim().is_empty() {
            errors.push(format!("At path '{at}/title': title must not be blank"));
        } else if self.title.chars().count() > MAX_TITLE_CHARS {
            errors.push(format!(
                "At path '{at}/title': title exceeds {MAX_TITLE_CHARS} characters"
            ));
        }

        if self.bullets.len() != BULLETS_PER_CONCEPT {
            errors.push(format!(
                "At path '{at}/bullets': expected exactly {BULLETS_PER_CONCEPT} bullets, got {}",
                self.bullets.len()
            ));
        }
        for (i, bullet) in self.bullets.iter().enumerate() {
            if bullet.trim().is_empty() {
                errors.push(format!("At path '{at}/bullets/{i}': bullet must not be blank"));
            } else if bullet.chars().count() > MAX_BULLET_CHARS {
                errors.push(format!(
                    "At path '{at}/bullets/{i}': bullet exceeds {MAX_BULLET_CHARS} characters"
                ));
            }
        }
        errors
    }
}

/// The container the model is asked to produce.
///
/// Only the global 3..=7 range is enforced here. The request's `max_concepts`
/// is a hint to the model, not a constraint on the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GenerationOutput {
    /// Ordered flashcard concepts.
    #[schemars(length(min = 3, max = 7))]
    pub concepts: Vec<RawConcept>,
}

impl GenerationOutput {
    /// Validates the output against every deck rule.
    ///
    /// # Errors
    ///
    /// Returns all violations found, each prefixed with the offending path.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let count = self.concepts.len();
        if !(MIN_CONCEPTS..=MAX_CONCEPTS).contains(&count) {
            errors.push(format!(
                "At path '/concepts': expected between {MIN_CONCEPTS} and {MAX_CONCEPTS} concepts, got {count}"
            ));
        }
        for (index, concept) in self.concepts.iter().enumerate() {
            errors.extend(concept.violations(index));
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

static OUTPUT_SCHEMA: LazyLock<Value> = LazyLock::new(|| json!(schema_for!(GenerationOutput)));

/// JSON schema of [`GenerationOutput`], as requested from the model.
#[must_use]
pub fn output_schema() -> &'static Value {
    &OUTPUT_SCHEMA
}

/// A concept promoted into the response form, carrying its card identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    /// Identifier assigned at promotion time.
    pub card_id: Uuid,
    /// Short title of the card.
    pub title: String,
    /// Exactly five bullets.
    pub bullets: Vec<String>,
    /// Whether a concrete example would help the learner.
    pub example_possible: bool,
    /// Brief pointer to a useful example.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example_hint: Option<String>,
}

impl Concept {
    /// Promotes a raw concept under a fresh random identifier.
    #[must_use]
    pub fn promote(raw: RawConcept) -> Self {
        Self::with_id(raw, Uuid::new_v4())
    }

    /// Promotes a raw concept under the given identifier.
    #[must_use]
    pub fn with_id(raw: RawConcept, card_id: Uuid) -> Self {
        Self {
            card_id,
            title: raw.title,
            bullets: raw.bullets,
            example_possible: raw.example_possible,
            example_hint: raw.example_hint,
        }
    }
}

impl From<RawConcept> for Concept {
    fn from(raw: RawConcept) -> Self {
        Self::promote(raw)
    }
}

/// Provenance of a generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    /// Model identifier used for the calls.
    pub model: String,
    /// Prompt-template version tag.
    pub prompt_version: String,
    /// Tokens billed across every call in the run, failed attempts included.
    pub tokens: TokenUsage,
    /// When the run started.
    pub timestamp: DateTime<Utc>,
    /// Whether retrieval augmentation contributed. Always `false` here.
    pub rag_used: bool,
}

/// The final, immutable product of a successful run.
///
/// Deserialization re-checks the deck rules, so a stored result that was
/// edited or truncated is rejected rather than trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredResult")]
pub struct GenerationResult {
    schema_version: String,
    deck_id: Uuid,
    topic: String,
    difficulty_level: DifficultyLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    concepts: Vec<Concept>,
    generation_metadata: GenerationMetadata,
}

/// Wire form of a result before the deck rules are re-checked.
#[derive(Deserialize)]
struct StoredResult {
    schema_version: String,
    deck_id: Uuid,
    topic: String,
    difficulty_level: DifficultyLevel,
    #[serde(default)]
    scope: Option<String>,
    concepts: Vec<Concept>,
    generation_metadata: GenerationMetadata,
}

impl TryFrom<StoredResult> for GenerationResult {
    type Error = String;

    fn try_from(stored: StoredResult) -> Result<Self, Self::Error> {
        if stored.schema_version != SCHEMA_VERSION {
            return Err(format!(
                "unsupported schema_version '{}', expected '{SCHEMA_VERSION}'",
                stored.schema_version
            ));
        }

        let output = GenerationOutput {
            concepts: stored.concepts.iter().map(RawConcept::from).collect(),
        };
        output.validate().map_err(|errors| errors.join("; "))?;

        Ok(Self {
            schema_version: stored.schema_version,
            deck_id: stored.deck_id,
            topic: stored.topic,
            difficulty_level: stored.difficulty_level,
            scope: stored.scope,
            concepts: stored.concepts,
            generation_metadata: stored.generation_metadata,
        })
    }
}

impl From<&Concept> for RawConcept {
    fn from(concept: &Concept) -> Self {
        Self {
            title: concept.title.clone(),
            bullets: concept.bullets.clone(),
            example_possible: concept.example_possible,
            example_hint: concept.example_hint.clone(),
        }
    }
}

impl GenerationResult {
    /// Assembles a result from an accepted output, promoting every concept.
    pub(crate) fn assemble(
        request: &GenerationRequest,
        deck_id: Uuid,
        output: GenerationOutput,
        generation_metadata: GenerationMetadata,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            deck_id,
            topic: request.topic().to_string(),
            difficulty_level: request.difficulty_level(),
            scope: request.scope().map(str::to_string),
            concepts: output.concepts.into_iter().map(Concept::promote).collect(),
            generation_metadata,
        }
    }

    /// Schema version marker, always [`SCHEMA_VERSION`].
    #[must_use]
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Caller-supplied deck identifier.
    #[must_use]
    pub const fn deck_id(&self) -> Uuid {
        self.deck_id
    }

    /// Echoed topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Echoed difficulty.
    #[must_use]
    pub const fn difficulty_level(&self) -> DifficultyLevel {
        self.difficulty_level
    }

    /// Echoed scope.
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Promoted concepts in model order.
    #[must_use]
    pub fn concepts(&self) -> &[Concept] {
        &self.concepts
    }

    /// Run provenance.
    #[must_use]
    pub const fn generation_metadata(&self) -> &GenerationMetadata {
        &self.generation_metadata
    }
}
