//! The single schema-repair pass.

use serde_json::Value;

use super::backend::CompletionBackend;
use super::error::CapabilityError;
use super::invoker::{Invocation, StructuredInvoker};
use crate::prompts::PromptPair;
use crate::schema::output_schema;

/// Fixed system instruction for the repair call.
pub const REPAIR_SYSTEM_PROMPT: &str = "You repair invalid JSON payloads to exactly match a schema. \
     Return JSON only. Do not add markdown or explanations.";

/// Truncates text to at most `max_chars` characters, on a char boundary.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

/// Builds the repair prompt pair.
///
/// The user instruction embeds, in order, the original system prompt, the
/// original user prompt, the error text, the compact schema, and the invalid
/// output.
#[must_use]
pub fn build_repair_prompts(
    original: &PromptPair,
    raw_output: &str,
    parsing_error: &str,
    schema: &Value,
) -> PromptPair {
    let schema_json = serde_json::to_string(schema).unwrap_or_else(|_| schema.to_string());
    let user = format!(
        "Repair the following invalid LLM output.\n\n\
         Original system prompt:\n{}\n\n\
         Original user prompt:\n{}\n\n\
         Validation/parsing error:\n{parsing_error}\n\n\
         Required schema:\n{schema_json}\n\n\
         Invalid output to repair:\n{raw_output}",
        original.system, original.user,
    );

    PromptPair {
        system: REPAIR_SYSTEM_PROMPT.to_string(),
        user,
    }
}

/// Performs exactly one repair call through a [`StructuredInvoker`].
pub struct RepairCoordinator<'a, B> {
    invoker: &'a StructuredInvoker<B>,
}

impl<'a, B: CompletionBackend> RepairCoordinator<'a, B> {
    /// Creates a coordinator borrowing the invoker used for the primary call.
    #[must_use]
    pub const fn new(invoker: &'a StructuredInvoker<B>) -> Self {
        Self { invoker }
    }

    /// Asks the model to repair `raw_output` so it satisfies the schema.
    ///
    /// The result is final: a failed repair is never repaired again.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError`] if the backend fails.
    pub async fn repair(
        &self,
        original: &PromptPair,
        raw_output: &str,
        parsing_error: &str,
    ) -> Result<Invocation, CapabilityError> {
        let prompts = build_repair_prompts(original, raw_output, parsing_error, output_schema());
        self.invoker.invoke(&prompts.system, &prompts.user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn original() -> PromptPair {
        PromptPair {
            system: "SYSTEM-RULES".to_string(),
            user: "USER-TOPIC".to_string(),
        }
    }

    #[test]
    fn test_repair_prompt_embeds_everything_in_order() {
        let schema = json!({"required": ["concepts"]});
        let prompts = build_repair_prompts(&original(), "{bad json}", "invalid json", &schema);

        assert_eq!(prompts.system, REPAIR_SYSTEM_PROMPT);
        let user = &prompts.user;
        let positions: Vec<usize> = [
            "SYSTEM-RULES",
            "USER-TOPIC",
            "invalid json",
            r#"{"required":["concepts"]}"#,
            "{bad json}",
        ]
        .iter()
        .map(|needle| user.find(needle).unwrap())
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(user.starts_with("Repair the following invalid LLM output."));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 5), "");
    }

    #[test]
    fn test_truncate_chars_respects_utf8() {
        let text = "你好世界".repeat(500);
        let cut = truncate_chars(&text, 1600);
        assert_eq!(cut.chars().count(), 1600);
    }
}
