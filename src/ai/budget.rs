//! Token Budget
//!
//! Prompt-size limits derived from a model's context window.
//!
//! ```text
//! max_allowed = total_max_tokens - max_output_tokens - SAFETY_MARGIN
//! ```
//!
//! A prompt longer than the whole window is rejected for its example. A prompt
//! that fits but leaves less than `max_output_tokens` of room only warns:
//! generation proceeds and may be truncated by the provider.

use tracing::warn;

use crate::constants::generation::SAFETY_MARGIN_TOKENS;
use crate::types::{AllmError, Result};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BudgetError {
    /// No room left to generate anything
    PromptTooLong {
        id: String,
        prompt_tokens: usize,
        total_max_tokens: usize,
    },
}

impl std::fmt::Display for BudgetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PromptTooLong {
                id,
                prompt_tokens,
                total_max_tokens,
            } => write!(
                f,
                "Prompt for example {id} has {prompt_tokens} tokens, model window is {total_max_tokens}"
            ),
        }
    }
}

impl std::error::Error for BudgetError {}

/// Outcome of a successful budget check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetCheck {
    /// Prompt and the full output budget fit the window
    Fits,
    /// Prompt fits but the output may be cut short
    MayTruncate,
}

/// Maximum prompt tokens allowed before generation
pub fn max_allowed_tokens(total_max_tokens: usize, max_output_tokens: usize) -> usize {
    total_max_tokens
        .saturating_sub(max_output_tokens)
        .saturating_sub(SAFETY_MARGIN_TOKENS)
}

// =============================================================================
// Token Budget
// =============================================================================

/// Context-window budget of one model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    total_max_tokens: usize,
    max_output_tokens: usize,
}

impl TokenBudget {
    /// Fails unless `max_output_tokens < total_max_tokens`
    pub fn new(total_max_tokens: usize, max_output_tokens: usize) -> Result<Self> {
        if max_output_tokens >= total_max_tokens {
            return Err(AllmError::Config(format!(
                "max_output_tokens ({}) has to be lower than total_max_tokens ({})",
                max_output_tokens, total_max_tokens
            )));
        }
        Ok(Self {
            total_max_tokens,
            max_output_tokens,
        })
    }

    pub fn total_max_tokens(&self) -> usize {
        self.total_max_tokens
    }

    pub fn max_output_tokens(&self) -> usize {
        self.max_output_tokens
    }

    /// Prompt tokens allowed before the long-text path kicks in
    pub fn max_allowed_tokens(&self) -> usize {
        max_allowed_tokens(self.total_max_tokens, self.max_output_tokens)
    }

    pub fn exceeds_allowed(&self, prompt_tokens: usize) -> bool {
        prompt_tokens > self.max_allowed_tokens()
    }

    /// Validate one example's prompt size
    pub fn validate(
        &self,
        prompt_tokens: usize,
        example_id: &str,
    ) -> std::result::Result<BudgetCheck, BudgetError> {
        if prompt_tokens > self.total_max_tokens {
            return Err(BudgetError::PromptTooLong {
                id: example_id.to_string(),
                prompt_tokens,
                total_max_tokens: self.total_max_tokens,
            });
        }

        if prompt_tokens + self.max_output_tokens > self.total_max_tokens {
            warn!(
                example_id,
                prompt_tokens,
                max_output_tokens = self.max_output_tokens,
                total_max_tokens = self.total_max_tokens,
                "Number of prompt tokens plus generated tokens may exceed the max allowed number \
                 of tokens of the model. Consider lowering max_output_tokens or truncating the input"
            );
            return Ok(BudgetCheck::MayTruncate);
        }

        Ok(BudgetCheck::Fits)
    }
}
