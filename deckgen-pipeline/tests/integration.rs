use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use deckgen_pipeline::generation::repair::REPAIR_SYSTEM_PROMPT;
use deckgen_pipeline::prelude::*;
use deckgen_pipeline::prompts::render_deck_prompts;
use serde_json::{Value, json};
use uuid::Uuid;

/// Backend replaying canned replies in order and recording every request.
#[derive(Default)]
struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<RawResponse, CapabilityError>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    fn new(replies: Vec<Result<RawResponse, CapabilityError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(vec![Ok(reply(&deck(5), (1, 1, 2)))])
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, index: usize) -> Vec<ChatMessage> {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn model_name(&self) -> &str {
        "gpt-4o-mini"
    }

    async fn complete(
        &self,
        request: StructuredRequest<'_>,
    ) -> Result<RawResponse, CapabilityError> {
        self.requests.lock().unwrap().push(request.messages.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CapabilityError::Provider("no scripted reply left".into())))
    }
}

fn concept(i: usize) -> Value {
    json!({
        "title": format!("Concept {i}"),
        "bullets": (1..=5).map(|j| format!("Bullet {j} for concept {i}")).collect::<Vec<_>>(),
        "example_possible": i % 2 == 0,
        "example_hint": format!("Example hint {i}")
    })
}

fn deck(n: usize) -> String {
    json!({ "concepts": (1..=n).map(concept).collect::<Vec<_>>() }).to_string()
}

fn reply(content: &str, (prompt, completion, total): (u64, u64, u64)) -> RawResponse {
    RawResponse::new(content).with_usage(UsageMetadata::new(prompt, completion, total))
}

fn bst_request() -> GenerationRequest {
    GenerationRequest::new("Binary Search Trees", DifficultyLevel::Beginner, 5, None).unwrap()
}

#[tokio::test]
async fn test_valid_primary_output_skips_repair() {
    let backend = Arc::new(ScriptedBackend::new(vec![Ok(reply(&deck(5), (100, 200, 300)))]));
    let orchestrator = GenerationOrchestrator::new(backend.clone());
    let deck_id = Uuid::new_v4();

    let result = orchestrator.generate(&bst_request(), deck_id).await.unwrap();

    assert_eq!(backend.calls(), 1);
    assert_eq!(result.deck_id(), deck_id);
    assert_eq!(result.schema_version(), "1.0");
    assert_eq!(result.topic(), "Binary Search Trees");
    assert_eq!(result.difficulty_level(), DifficultyLevel::Beginner);
    assert!(result.scope().is_none());
    assert_eq!(result.concepts().len(), 5);

    let metadata = result.generation_metadata();
    assert!(!metadata.rag_used);
    assert_eq!(metadata.model, "gpt-4o-mini");
    assert_eq!(metadata.prompt_version, "v1");
    assert_eq!(metadata.tokens, TokenUsage::new(100, 200, 300));
}

#[tokio::test]
async fn test_primary_call_uses_rendered_prompts() {
    let backend = Arc::new(ScriptedBackend::new(vec![Ok(reply(&deck(3), (1, 1, 2)))]));
    let orchestrator = GenerationOrchestrator::new(backend.clone());
    let request = GenerationRequest::new(
        "  Newton's   laws ",
        DifficultyLevel::Intermediate,
        3,
        Some("Classical mechanics".into()),
    )
    .unwrap();

    orchestrator.generate(&request, Uuid::new_v4()).await.unwrap();

    let expected = render_deck_prompts(
        "Newton's laws",
        DifficultyLevel::Intermediate,
        3,
        Some("Classical mechanics"),
    );
    let sent = backend.request(0);
    assert_eq!(sent, vec![ChatMessage::system(expected.system), ChatMessage::user(expected.user)]);
}

#[tokio::test]
async fn test_repair_after_malformed_json_sums_tokens() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        Ok(reply("{bad json}", (10, 20, 30))),
        Ok(reply(&deck(3), (5, 7, 12))),
    ]));
    let orchestrator = GenerationOrchestrator::new(backend.clone());
    let request =
        GenerationRequest::new("BST", DifficultyLevel::Beginner, 3, None).unwrap();

    let result = orchestrator.generate(&request, Uuid::new_v4()).await.unwrap();

    assert_eq!(backend.calls(), 2);
    assert_eq!(result.concepts().len(), 3);
    assert_eq!(result.generation_metadata().tokens, TokenUsage::new(15, 27, 42));
    assert_eq!(result.generation_metadata().tokens.total, 42);

    let repair = backend.request(1);
    assert_eq!(repair[0].content, REPAIR_SYSTEM_PROMPT);
    assert!(repair[1].content.contains("{bad json}"));
    assert!(repair[1].content.contains("JSON parse error"));
    assert!(repair[1].content.contains("Topic: BST"));
}

#[tokio::test]
async fn test_schema_violation_triggers_repair() {
    let four_bullets = json!({
        "concepts": [concept(1), concept(2), {
            "title": "Short",
            "bullets": ["a", "b", "c", "d"],
            "example_possible": false
        }]
    })
    .to_string();
    let backend = Arc::new(ScriptedBackend::new(vec![
        Ok(reply(&four_bullets, (3, 4, 7))),
        Ok(reply(&deck(4), (1, 2, 3))),
    ]));
    let orchestrator = GenerationOrchestrator::new(backend.clone());

    let result = orchestrator.generate(&bst_request(), Uuid::new_v4()).await.unwrap();

    assert_eq!(backend.calls(), 2);
    assert_eq!(result.concepts().len(), 4);
    assert!(backend.request(1)[1].content.contains("/concepts/2/bullets"));
}

#[tokio::test]
async fn test_failed_repair_raises_schema_validation_failed() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        Ok(reply("{bad json}", (10, 20, 30))),
        Ok(reply("{still bad json}", (5, 7, 12))),
    ]));
    let orchestrator = GenerationOrchestrator::new(backend.clone());

    let err = orchestrator
        .generate(&bst_request(), Uuid::new_v4())
        .await
        .unwrap_err();

    assert_eq!(backend.calls(), 2);
    assert_eq!(err.code(), "SCHEMA_VALIDATION_FAILED");
    let GenerationError::SchemaValidationFailed(failure) = err else {
        panic!("expected schema validation failure");
    };
    assert!(failure.details.parsing_error.starts_with("JSON parse error"));
    assert!(failure.details.repair_error.starts_with("JSON parse error"));
    assert_eq!(failure.details.validation_errors[0].field, "response");
    assert_eq!(failure.details.validation_errors[0].kind, "schema_validation_failed");
    assert_eq!(failure.tokens, TokenUsage::new(15, 27, 42));
    assert_eq!(failure.history.len(), 2);
    assert_eq!(failure.history[0].raw_output, "{bad json}");
    assert_eq!(failure.history[1].raw_output, "{still bad json}");
    assert_eq!(failure.history[1].tokens, TokenUsage::new(5, 7, 12));
}

#[tokio::test]
async fn test_empty_reply_without_usage_counts_zero() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        Ok(RawResponse::default()),
        Ok(reply(&deck(3), (5, 7, 12))),
    ]));
    let orchestrator = GenerationOrchestrator::new(backend.clone());

    let result = orchestrator.generate(&bst_request(), Uuid::new_v4()).await.unwrap();

    assert_eq!(result.generation_metadata().tokens, TokenUsage::new(5, 7, 12));
}

#[tokio::test]
async fn test_provider_failure_is_not_repaired() {
    let backend = Arc::new(ScriptedBackend::new(vec![Err(CapabilityError::Auth(
        "invalid api key".into(),
    ))]));
    let orchestrator = GenerationOrchestrator::new(backend.clone());

    let err = orchestrator
        .generate(&bst_request(), Uuid::new_v4())
        .await
        .unwrap_err();

    assert_eq!(backend.calls(), 1);
    assert!(matches!(
        err,
        GenerationError::ProviderFailure(CapabilityError::Auth(_))
    ));
    assert!(err.retryable());
}

#[tokio::test]
async fn test_provider_failure_during_repair_propagates() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        Ok(reply("not json", (1, 1, 2))),
        Err(CapabilityError::Transport("connection reset".into())),
    ]));
    let orchestrator = GenerationOrchestrator::new(backend.clone());

    let err = orchestrator
        .generate(&bst_request(), Uuid::new_v4())
        .await
        .unwrap_err();

    assert_eq!(backend.calls(), 2);
    assert!(matches!(
        err,
        GenerationError::ProviderFailure(CapabilityError::Transport(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_surfaces_as_provider_timeout() {
    let backend = Arc::new(ScriptedBackend::slow(Duration::from_secs(120)));
    let orchestrator = GenerationOrchestrator::new(backend.clone());

    let err = orchestrator
        .generate_within(&bst_request(), Uuid::new_v4(), Duration::from_secs(30))
        .await
        .unwrap_err();

    assert_eq!(backend.calls(), 1);
    assert!(matches!(
        err,
        GenerationError::ProviderFailure(CapabilityError::Timeout(d)) if d == Duration::from_secs(30)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_configured_deadline_applies_to_generate() {
    let backend = Arc::new(ScriptedBackend::slow(Duration::from_secs(120)));
    let config = GenerationConfig::default().with_deadline(Duration::from_secs(5));
    let orchestrator = GenerationOrchestrator::with_config(backend, config);

    let err = orchestrator
        .generate(&bst_request(), Uuid::new_v4())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "LLM_PROVIDER_ERROR");
}

#[tokio::test]
async fn test_card_ids_are_unique() {
    let backend = ScriptedBackend::new(vec![Ok(reply(&deck(7), (1, 1, 2)))]);
    let orchestrator = GenerationOrchestrator::new(backend);

    let result = orchestrator.generate(&bst_request(), Uuid::new_v4()).await.unwrap();

    let ids: HashSet<Uuid> = result.concepts().iter().map(|c| c.card_id).collect();
    assert_eq!(ids.len(), 7);
    assert_eq!(result.concepts()[0].title, "Concept 1");
    assert_eq!(result.concepts()[6].title, "Concept 7");
}

#[tokio::test]
async fn test_concurrent_runs_share_backend() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        Ok(reply(&deck(3), (1, 1, 2))),
        Ok(reply(&deck(3), (1, 1, 2))),
    ]));
    let orchestrator = GenerationOrchestrator::new(backend.clone());
    let request = bst_request();

    let (a, b) = tokio::join!(
        orchestrator.generate(&request, Uuid::new_v4()),
        orchestrator.generate(&request, Uuid::new_v4())
    );

    assert!(a.is_ok() && b.is_ok());
    assert_eq!(backend.calls(), 2);
}

struct TaggedPrompts;

impl PromptProvider for TaggedPrompts {
    fn version(&self) -> &str {
        "v2-test"
    }

    fn render(&self, request: &GenerationRequest) -> PromptPair {
        PromptPair {
            system: "system".to_string(),
            user: format!("deck about {}", request.topic()),
        }
    }
}

#[tokio::test]
async fn test_custom_prompt_provider_version_recorded() {
    let backend = Arc::new(ScriptedBackend::new(vec![Ok(reply(&deck(3), (1, 1, 2)))]));
    let orchestrator = GenerationOrchestrator::new(backend.clone()).prompts(TaggedPrompts);

    let result = orchestrator.generate(&bst_request(), Uuid::new_v4()).await.unwrap();

    assert_eq!(result.generation_metadata().prompt_version, "v2-test");
    assert_eq!(backend.request(0)[1].content, "deck about Binary Search Trees");
}

#[tokio::test]
async fn test_result_serializes_with_schema_version() {
    let backend = ScriptedBackend::new(vec![Ok(reply(&deck(5), (1, 1, 2)))]);
    let orchestrator = GenerationOrchestrator::new(backend);

    let result = orchestrator.generate(&bst_request(), Uuid::new_v4()).await.unwrap();
    let value = serde_json::to_value(&result).unwrap();

    assert_eq!(value["schema_version"], "1.0");
    assert_eq!(value["generation_metadata"]["rag_used"], false);
    assert!(value.get("scope").is_none());

    let restored: GenerationResult = serde_json::from_value(value).unwrap();
    assert_eq!(restored, result);
}
