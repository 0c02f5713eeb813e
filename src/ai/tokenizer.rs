//! Token Counting
//!
//! Every budget decision is expressed against a [`TokenCount`] capability that
//! the backend supplies, so no tokenizer is hardcoded in the core.
//!
//! ## Counters
//! - [`TiktokenCounter`]: exact BPE counts for OpenAI-family models
//! - [`TokenCounter`]: heuristic estimation for backends without a public tokenizer

use tiktoken_rs::CoreBPE;

use crate::types::{AllmError, Result};

/// Token-counting capability (string → token count)
pub trait TokenCount: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

impl<F> TokenCount for F
where
    F: Fn(&str) -> usize + Send + Sync,
{
    fn count_tokens(&self, text: &str) -> usize {
        self(text)
    }
}

/// Token estimation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenEstimator {
    /// One token per whitespace-delimited word
    Words,
    /// Punctuation-aware estimation (accounts for JSON and code syntax)
    #[default]
    PunctuationAware,
}

/// Heuristic token counter
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCounter {
    estimator: TokenEstimator,
}

impl TokenCounter {
    pub fn new(estimator: TokenEstimator) -> Self {
        Self { estimator }
    }

    /// Estimate token count for a string
    pub fn count(&self, text: &str) -> usize {
        match self.estimator {
            TokenEstimator::Words => text.split_whitespace().count(),
            TokenEstimator::PunctuationAware => self.count_punctuation_aware(text),
        }
    }

    /// Punctuation and operators are individual tokens, words are split by length
    fn count_punctuation_aware(&self, text: &str) -> usize {
        let mut tokens = 0;
        let mut current_word_len = 0;

        for ch in text.chars() {
            match ch {
                '(' | ')' | '{' | '}' | '[' | ']' | ';' | ':' | ',' | '.' | '+' | '-' | '*'
                | '/' | '=' | '<' | '>' | '!' | '&' | '|' | '@' | '#' | '$' | '%' | '^' | '~'
                | '?' | '\\' | '"' | '\'' => {
                    tokens += estimate_word_tokens(current_word_len);
                    current_word_len = 0;
                    tokens += 1;
                }
                c if c.is_whitespace() => {
                    tokens += estimate_word_tokens(current_word_len);
                    current_word_len = 0;
                }
                _ => current_word_len += ch.len_utf8(),
            }
        }
        tokens += estimate_word_tokens(current_word_len);

        tokens
    }
}

impl TokenCount for TokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        self.count(text)
    }
}

/// Estimate tokens for a single word of `len` bytes
fn estimate_word_tokens(len: usize) -> usize {
    match len {
        0 => 0,
        1..=4 => 1,
        5..=8 => 2,
        _ => len.div_ceil(4),
    }
}

/// Exact BPE counter (`cl100k_base`) for OpenAI-family models
pub struct TiktokenCounter {
    bpe: CoreBPE,
}

impl std::fmt::Debug for TiktokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiktokenCounter")
            .field("encoding", &"cl100k_base")
            .finish()
    }
}

impl TiktokenCounter {
    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| AllmError::Config(format!("Failed to load cl100k_base: {}", e)))?;
        Ok(Self { bpe })
    }
}

impl TokenCount for TiktokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}
