//! Persistence of generated decks as JSON files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use deckgen_pipeline::schema::{DifficultyLevel, GenerationResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CliError;

/// One stored card, keyed by the concept's card ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardRecord {
    /// Card identifier assigned at promotion.
    pub card_id: Uuid,
    /// Owning deck.
    pub deck_id: Uuid,
    /// Concept title.
    pub title: String,
    /// The serialized concept.
    pub payload: serde_json::Value,
}

/// A stored deck: the full result plus summary columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckRecord {
    /// Deck identifier.
    pub deck_id: Uuid,
    /// Topic the deck covers.
    pub topic: String,
    /// Requested difficulty.
    pub difficulty_level: DifficultyLevel,
    /// Optional scope restriction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// The complete generation result.
    pub payload: serde_json::Value,
    /// Total tokens billed for the run.
    pub tokens_used: u64,
    /// Wall-clock time of the run.
    pub generation_time_ms: u64,
    /// When the record was written.
    pub created_at: DateTime<Utc>,
    /// Cards, one per concept.
    pub cards: Vec<CardRecord>,
}

impl DeckRecord {
    /// Builds a record from a successful result.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Json`] if the result cannot be serialized.
    pub fn from_result(
        result: &GenerationResult,
        generation_time_ms: u64,
    ) -> Result<Self, CliError> {
        let cards = result
            .concepts()
            .iter()
            .map(|concept| {
                Ok(CardRecord {
                    card_id: concept.card_id,
                    deck_id: result.deck_id(),
                    title: concept.title.clone(),
                    payload: serde_json::to_value(concept)?,
                })
            })
            .collect::<Result<Vec<_>, serde_json::Error>>()?;

        Ok(Self {
            deck_id: result.deck_id(),
            topic: result.topic().to_string(),
            difficulty_level: result.difficulty_level(),
            scope: result.scope().map(str::to_string),
            payload: serde_json::to_value(result)?,
            tokens_used: result.generation_metadata().tokens.total,
            generation_time_ms,
            created_at: Utc::now(),
            cards,
        })
    }

    /// Reconstructs the generation result from the stored payload.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Json`] if the payload is not a valid result.
    pub fn result(&self) -> Result<GenerationResult, CliError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Stores each deck as `{deck_id}.json` under a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Anyhow`] if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CliError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create deck store at {}", root.display()))?;
        Ok(Self { root })
    }

    /// Directory holding the deck files.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, deck_id: Uuid) -> PathBuf {
        self.root.join(format!("{deck_id}.json"))
    }

    /// Writes a deck record, replacing any previous one with the same ID.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Json`] if the record cannot be serialized and
    /// [`CliError::Anyhow`] if the file cannot be written.
    pub fn save(&self, record: &DeckRecord) -> Result<PathBuf, CliError> {
        let path = self.path_for(record.deck_id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(record)?)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to move deck into {}", path.display()))?;

        tracing::debug!(deck_id = %record.deck_id, path = %path.display(), "Deck saved");
        Ok(path)
    }

    /// Loads a deck record.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::NotFound`] if no deck with that ID exists.
    pub fn load(&self, deck_id: Uuid) -> Result<DeckRecord, CliError> {
        let path = self.path_for(deck_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CliError::NotFound(deck_id));
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to read {}", path.display()))
                    .into());
            }
        };
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckgen_pipeline::generation::{
        CapabilityError, CompletionBackend, GenerationOrchestrator, RawResponse, StructuredRequest,
        UsageMetadata,
    };
    use deckgen_pipeline::schema::GenerationRequest;
    use serde_json::json;

    struct FixedBackend;

    #[async_trait::async_trait]
    impl CompletionBackend for FixedBackend {
        fn model_name(&self) -> &str {
            "fixed-model"
        }

        async fn complete(
            &self,
            _request: StructuredRequest<'_>,
        ) -> Result<RawResponse, CapabilityError> {
            let concepts: Vec<_> = (1..=3)
                .map(|i| {
                    json!({
                        "title": format!("Concept {i}"),
                        "bullets": ["a", "b", "c", "d", "e"],
                        "example_possible": false
                    })
                })
                .collect();
            Ok(RawResponse::new(json!({ "concepts": concepts }).to_string())
                .with_usage(UsageMetadata::new(10, 20, 30)))
        }
    }

    async fn generated() -> GenerationResult {
        let request = GenerationRequest::for_topic("Binary Search Trees").unwrap();
        GenerationOrchestrator::new(FixedBackend)
            .generate(&request, Uuid::new_v4())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_record_from_result() {
        let result = generated().await;
        let record = DeckRecord::from_result(&result, 1234).unwrap();

        assert_eq!(record.deck_id, result.deck_id());
        assert_eq!(record.tokens_used, 30);
        assert_eq!(record.generation_time_ms, 1234);
        assert_eq!(record.cards.len(), 3);
        assert_eq!(record.cards[0].card_id, result.concepts()[0].card_id);
        assert_eq!(record.cards[0].title, "Concept 1");
        assert_eq!(record.result().unwrap(), result);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("decks")).unwrap();
        let record = DeckRecord::from_result(&generated().await, 5).unwrap();

        let path = store.save(&record).unwrap();
        assert!(path.ends_with(format!("{}.json", record.deck_id)));

        let loaded = store.load(record.deck_id).unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn test_open_reports_path_on_failure() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = JsonFileStore::open(file.path().join("decks")).unwrap_err();

        assert!(matches!(err, CliError::Anyhow(_)));
        assert!(err.to_string().contains("Failed to create deck store"));
        assert_eq!(err.to_payload().code, "INTERNAL_ERROR");
    }

    #[tokio::test]
    async fn test_tampered_payload_is_rejected() {
        let mut record = DeckRecord::from_result(&generated().await, 5).unwrap();
        record.payload["concepts"][0]["bullets"] = json!(["only one"]);
        assert!(matches!(record.result(), Err(CliError::Json(_))));
    }

    #[test]
    fn test_load_missing_deck() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        let id = Uuid::new_v4();
        assert!(matches!(store.load(id), Err(CliError::NotFound(missing)) if missing == id));
    }
}
