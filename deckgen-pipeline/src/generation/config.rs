//! Configuration for generation runs.

use std::time::Duration;

/// Default cap on diagnostic text carried into repair prompts and error details.
pub const DEFAULT_MAX_DIAGNOSTIC_CHARS: usize = 1600;

/// Configuration for the generation orchestrator.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Overall deadline for a run, covering both calls (default: none).
    pub deadline: Option<Duration>,
    /// Maximum characters of raw output and error text kept for diagnostics
    /// (default: 1600).
    pub max_diagnostic_chars: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            deadline: None,
            max_diagnostic_chars: DEFAULT_MAX_DIAGNOSTIC_CHARS,
        }
    }
}

impl GenerationConfig {
    /// Bound every run by an overall deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set the diagnostic text cap.
    #[must_use]
    pub const fn with_max_diagnostic_chars(mut self, max: usize) -> Self {
        self.max_diagnostic_chars = max;
        self
    }
}
