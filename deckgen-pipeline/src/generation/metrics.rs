//! Token accounting across the primary and repair calls.

use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use super::backend::RawResponse;

/// Token counters reported by the provider for one or more calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input (prompt) tokens.
    pub prompt: u64,
    /// Output (completion) tokens.
    pub completion: u64,
    /// Total tokens as reported by the provider.
    pub total: u64,
}

impl TokenUsage {
    /// Creates a usage record from explicit counters.
    #[must_use]
    pub const fn new(prompt: u64, completion: u64, total: u64) -> Self {
        Self {
            prompt,
            completion,
            total,
        }
    }

    /// Reads the usage counters of a raw response.
    ///
    /// Missing usage metadata, or any missing counter within it, counts as zero.
    #[must_use]
    pub fn extract(raw: &RawResponse) -> Self {
        raw.usage.as_ref().map_or_else(Self::default, |usage| Self {
            prompt: usage.input_tokens.unwrap_or(0),
            completion: usage.output_tokens.unwrap_or(0),
            total: usage.total_tokens.unwrap_or(0),
        })
    }

    /// Field-wise sum of two usage records.
    #[must_use]
    pub const fn combine(self, other: Self) -> Self {
        Self {
            prompt: self.prompt.saturating_add(other.prompt),
            completion: self.completion.saturating_add(other.completion),
            total: self.total.saturating_add(other.total),
        }
    }
}

impl Add for TokenUsage {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.combine(rhs)
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        *self = self.combine(rhs);
    }
}

impl Sum for TokenUsage {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Self::combine)
    }
}
