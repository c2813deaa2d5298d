//! Provider client configuration.

use std::time::Duration;

use serde_json::Value;

/// Model used when neither a flag nor `OPENAI_MODEL` names one.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Sampling temperature for deck generation.
pub const DEFAULT_TEMPERATURE: f64 = 0.3;
/// Per-call request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Transient-failure retries per call, on top of the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Environment variable holding the `OpenAI` API key.
pub const API_KEY_ENV_VAR: &str = "OPENAI_API_KEY";
/// Environment variable overriding the model.
pub const MODEL_ENV_VAR: &str = "OPENAI_MODEL";

/// Configuration shared by every call a backend makes.
///
/// The API key is deliberately not part of this struct; the Rig client reads
/// it from the environment.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Model identifier.
    ///
    /// Default: `gpt-4o-mini`, or `$OPENAI_MODEL` when loaded from the environment.
    pub model: String,

    /// Sampling temperature. Default: 0.3
    pub temperature: f64,

    /// Maximum time for a single provider call. Default: 60 seconds
    pub timeout: Duration,

    /// How many times a transient failure (transport, timeout, rate limit)
    /// is retried before it is reported. Default: 2
    pub max_retries: u32,

    /// Base delay between retries, multiplied by the retry number.
    /// Default: 500 milliseconds
    pub retry_backoff: Duration,

    /// Ask the provider for native JSON-schema output (`response_format`)
    /// in addition to the schema instruction in the preamble. Default: true
    pub native_structured_output: bool,

    /// Provider-specific request parameters merged into every call, taking
    /// precedence over the structured-output parameters.
    pub additional_params: Option<Value>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: Duration::from_millis(500),
            native_structured_output: true,
            additional_params: None,
        }
    }
}

impl ClientConfig {
    /// Create a new `ClientConfig` with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads settings from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings through an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(model) = lookup(MODEL_ENV_VAR).filter(|m| !m.trim().is_empty()) {
            config.model = model.trim().to_string();
        }
        config
    }

    /// Set the model identifier.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the sampling temperature.
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the per-call timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the transient retry budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Enable or disable native structured output.
    #[must_use]
    pub const fn with_native_structured_output(mut self, enabled: bool) -> Self {
        self.native_structured_output = enabled;
        self
    }

    /// Set provider-specific request parameters.
    #[must_use]
    pub fn with_additional_params(mut self, params: Value) -> Self {
        self.additional_params = Some(params);
        self
    }
}

/// Reads a required API key through `lookup`, treating blank values as missing.
///
/// Returns `None` when the key is absent.
#[must_use]
pub fn api_key(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    lookup(API_KEY_ENV_VAR).filter(|key| !key.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.model, "gpt-4o-mini");
        assert!((config.temperature - 0.3).abs() < f64::EPSILON);
        assert_eq!(config.timeout.as_secs(), 60);
        assert_eq!(config.max_retries, 2);
        assert!(config.native_structured_output);
        assert!(config.additional_params.is_none());
    }

    #[test]
    fn test_model_from_environment() {
        let config = ClientConfig::from_lookup(lookup_from(&[("OPENAI_MODEL", " gpt-4o ")]));
        assert_eq!(config.model, "gpt-4o");

        let blank = ClientConfig::from_lookup(lookup_from(&[("OPENAI_MODEL", "  ")]));
        assert_eq!(blank.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_builders_override() {
        let config = ClientConfig::new()
            .with_model("gpt-4.1")
            .with_temperature(0.0)
            .with_timeout(Duration::from_secs(5))
            .with_max_retries(0);
        assert_eq!(config.model, "gpt-4.1");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn test_api_key_lookup() {
        assert_eq!(
            api_key(lookup_from(&[("OPENAI_API_KEY", "sk-test")])).as_deref(),
            Some("sk-test")
        );
        assert!(api_key(lookup_from(&[("OPENAI_API_KEY", "   ")])).is_none());
        assert!(api_key(lookup_from(&[])).is_none());
    }
}
