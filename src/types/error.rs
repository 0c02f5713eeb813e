//! Unified Error Type System
//!
//! Centralized error types for the entire crate.
//!
//! ## Error Layers
//!
//! - **Validation** (`ValidationError`): pre-flight checks over the whole batch.
//!   Raised to the caller before any network call.
//! - **Provider** (`LlmError`): failures of a single provider call, classified
//!   into an `ErrorCategory` that drives the retry decision. Captured into the
//!   example's `ResponseData::error`, never raised out of a batch.
//! - **Crate** (`AllmError`): everything that can escape a public entry point.

use std::time::Duration;
use thiserror::Error;

use crate::ai::budget::BudgetError;
use crate::constants::labels;

// =============================================================================
// Error Categories
// =============================================================================

/// Provider error categories for retry decisions and per-example reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rate limited - wait then retry
    RateLimit,
    /// Request or connection timed out - retry with backoff
    Timeout,
    /// Connectivity issues - retry with backoff
    Network,
    /// Temporary server issues (5xx, overloaded) - retry
    Transient,
    /// Provider refused the content - never retry
    ContentFilter,
    /// Malformed or invalid request - never retry
    BadRequest,
    /// Authentication failed - never retry
    Auth,
    /// Context window exceeded on the provider side - never retry
    TokenLimit,
    /// Unknown error - not retried
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::Network => write!(f, "NETWORK"),
            Self::Transient => write!(f, "TRANSIENT"),
            Self::ContentFilter => write!(f, "CONTENT_FILTER"),
            Self::BadRequest => write!(f, "BAD_REQUEST"),
            Self::Auth => write!(f, "AUTH"),
            Self::TokenLimit => write!(f, "TOKEN_LIMIT"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl ErrorCategory {
    /// Check if this category is worth another attempt against the same provider
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::Timeout | Self::Network | Self::Transient
        )
    }

    /// Human-readable prefix used in `ResponseData::error`
    pub fn label(&self) -> &'static str {
        match self {
            Self::RateLimit => labels::RATE_LIMIT,
            Self::Timeout => labels::TIMEOUT_ERROR,
            Self::Network => labels::CONNECTION_ERROR,
            Self::Transient => labels::SERVICE_UNAVAILABLE,
            Self::ContentFilter => labels::CONTENT_FILTER,
            Self::BadRequest => labels::INVALID_ARGUMENT,
            Self::Auth => labels::AUTH_ERROR,
            Self::TokenLimit | Self::Unknown => labels::RESPONSE_ERROR,
        }
    }
}

// =============================================================================
// LLM Error
// =============================================================================

/// Provider call failure with category, context, and retry hints
#[derive(Debug, Clone, PartialEq)]
pub struct LlmError {
    /// Error category for routing decisions
    pub category: ErrorCategory,
    /// Detailed error message
    pub message: String,
    /// Provider that produced the error
    pub provider: Option<String>,
    /// Suggested wait time before retry (if applicable)
    pub retry_after: Option<Duration>,
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}:{}] {}", provider, self.category, self.message)
        } else {
            write!(f, "[{}] {}", self.category, self.message)
        }
    }
}

impl std::error::Error for LlmError {}

impl LlmError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            provider: None,
            retry_after: None,
        }
    }

    pub fn with_provider(
        category: ErrorCategory,
        message: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            provider: Some(provider.into()),
            retry_after: None,
        }
    }

    /// Add suggested retry delay
    pub fn retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    /// Timeout of a single request attempt
    pub fn timeout(duration: Duration) -> Self {
        Self::new(
            ErrorCategory::Timeout,
            format!("Request timed out after {:?}", duration),
        )
    }

    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }

    /// Categorized message stored in `ResponseData::error`
    pub fn to_example_error(&self) -> String {
        format!("{}: {}", self.category.label(), self.message)
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Maps provider messages and HTTP statuses onto error categories
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify an error message from any provider
    pub fn classify(message: &str, provider: &str) -> LlmError {
        let lower = message.to_lowercase();

        if lower.contains("content_filter")
            || lower.contains("content filter")
            || lower.contains("content management policy")
            || lower.contains("safety")
        {
            return LlmError::with_provider(ErrorCategory::ContentFilter, message, provider);
        }

        if lower.contains("rate limit")
            || mentions_status(&lower, &[429])
            || lower.contains("too many requests")
            || lower.contains("quota exceeded")
            || lower.contains("resource exhausted")
        {
            return LlmError::with_provider(ErrorCategory::RateLimit, message, provider);
        }

        if lower.contains("context length")
            || lower.contains("maximum context")
            || (lower.contains("token") && lower.contains("exceed"))
        {
            return LlmError::with_provider(ErrorCategory::TokenLimit, message, provider);
        }

        if mentions_status(&lower, &[401, 403])
            || lower.contains("unauthorized")
            || lower.contains("api key")
            || lower.contains("permission denied")
        {
            return LlmError::with_provider(ErrorCategory::Auth, message, provider);
        }

        if lower.contains("timeout") || lower.contains("timed out") {
            return LlmError::with_provider(ErrorCategory::Timeout, message, provider);
        }

        if lower.contains("connection")
            || lower.contains("network")
            || lower.contains("dns")
            || lower.contains("unreachable")
        {
            return LlmError::with_provider(ErrorCategory::Network, message, provider);
        }

        if mentions_status(&lower, &[500, 502, 503])
            || lower.contains("service unavailable")
            || lower.contains("overloaded")
            || lower.contains("internal error")
            || lower.contains("server error")
        {
            return LlmError::with_provider(ErrorCategory::Transient, message, provider);
        }

        if mentions_status(&lower, &[400])
            || lower.contains("bad request")
            || lower.contains("invalid")
            || lower.contains("malformed")
        {
            return LlmError::with_provider(ErrorCategory::BadRequest, message, provider);
        }

        LlmError::with_provider(ErrorCategory::Unknown, message, provider)
    }

    /// Classify HTTP status code directly (more accurate than string matching)
    pub fn classify_http_status(status: u16, body: &str, provider: &str) -> LlmError {
        let message = format!("HTTP {}: {}", status, body);
        match status {
            429 => {
                let err = LlmError::with_provider(ErrorCategory::RateLimit, message, provider);
                match parse_retry_after(body) {
                    Some(delay) => err.retry_after(delay),
                    None => err,
                }
            }
            401 | 403 => LlmError::with_provider(ErrorCategory::Auth, message, provider),
            400 | 422 => {
                // Content-filter and context-length rejections both arrive as 400s
                let classified = Self::classify(body, provider);
                match classified.category {
                    ErrorCategory::ContentFilter | ErrorCategory::TokenLimit => {
                        LlmError::with_provider(classified.category, message, provider)
                    }
                    _ => LlmError::with_provider(ErrorCategory::BadRequest, message, provider),
                }
            }
            408 | 504 => LlmError::with_provider(ErrorCategory::Timeout, message, provider),
            500 | 502 | 503 => LlmError::with_provider(ErrorCategory::Transient, message, provider),
            404 => LlmError::with_provider(ErrorCategory::BadRequest, message, provider),
            _ => LlmError::with_provider(ErrorCategory::Unknown, message, provider),
        }
    }

    /// Classify a transport-level reqwest failure
    pub fn classify_reqwest(err: &reqwest::Error, provider: &str) -> LlmError {
        if err.is_timeout() {
            LlmError::with_provider(ErrorCategory::Timeout, err.to_string(), provider)
        } else if err.is_connect() || err.is_request() {
            LlmError::with_provider(ErrorCategory::Network, err.to_string(), provider)
        } else if err.is_decode() || err.is_body() {
            LlmError::with_provider(ErrorCategory::Transient, err.to_string(), provider)
        } else {
            Self::classify(&err.to_string(), provider)
        }
    }
}

/// Whether `message` contains one of `codes` as a standalone number
fn mentions_status(message: &str, codes: &[u16]) -> bool {
    message
        .split(|c: char| !c.is_ascii_digit())
        .filter(|digits| digits.len() == 3)
        .filter_map(|digits| digits.parse::<u16>().ok())
        .any(|code| codes.contains(&code))
}

/// Extract a retry-after hint ("retry after N seconds") from a provider message
fn parse_retry_after(message: &str) -> Option<Duration> {
    let lower = message.to_lowercase();
    let idx = lower.find("retry")?;
    lower[idx..]
        .split(|c: char| !c.is_ascii_digit())
        .find(|part| !part.is_empty())
        .and_then(|digits| digits.parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs.min(300)))
}

// =============================================================================
// Validation Error
// =============================================================================

/// Pre-flight validation failures; any of these aborts the whole batch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("When no input_data is provided prompt cannot contain any input_key.")]
    MissingInputData,

    #[error("Missing input_keys in the prompt. Error occurred for id={id}")]
    MissingKeysInPrompt { id: String },

    #[error("Missing input_keys in the input data. Error occurred for id={id}")]
    MissingKeysInInputData { id: String },

    #[error(
        "Number of input keys in input_data and prompt are different. If your intention is to \
         instruct the model to output a JSON, make sure you are using double curly brackets. \
         Please make sure the input_keys are consistent. Error has occurred for id={id}"
    )]
    KeyCountMismatch { id: String },

    #[error(
        "Input variables in the prompt and in the input_data are different. Please make sure \
         the input_keys are consistent. If your intention is to instruct the model to output a \
         JSON, make sure you are using double curly brackets. Error has occurred for id={id}"
    )]
    KeySetMismatch { id: String },

    #[error(
        "System prompt cannot contain any input variables. Please fix your system message and try again."
    )]
    SystemPromptHasVariables,

    #[error("{backend} models don't support the system_prompt parameter.")]
    SystemPromptUnsupportedByBackend { backend: String },

    #[error(
        "Prompt instruction (without the actual text) is longer than the allowed model input \
         length: {overhead} tokens of fixed overhead for a budget of {budget} tokens"
    )]
    PromptInstructionTooLong { overhead: usize, budget: usize },
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum AllmError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Generation Errors
    // -------------------------------------------------------------------------
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Provider failure that escaped the per-example boundary (long-text reduce step)
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error(
        "Prompt is too long. Entire prompt has {prompt_tokens} tokens, where the max allowed \
         number of tokens of the model is {total_max_tokens}. This leaves no space for the model \
         to generate a response and will lead to errors. Example id: {id}"
    )]
    PromptTooLong {
        id: String,
        prompt_tokens: usize,
        total_max_tokens: usize,
    },

    /// A single word that cannot fit the prompt budget on its own
    #[error("Text cannot be split further: a single word needs {tokens} tokens of a {budget} token budget")]
    Unsplittable { tokens: usize, budget: usize },

    #[error("Template error: {0}")]
    Template(String),

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    #[error("Config error: {0}")]
    Config(String),

    #[error("Input data error in {path}: {message}")]
    InputData { path: String, message: String },
}

impl From<BudgetError> for AllmError {
    fn from(err: BudgetError) -> Self {
        match err {
            BudgetError::PromptTooLong {
                id,
                prompt_tokens,
                total_max_tokens,
            } => AllmError::PromptTooLong {
                id,
                prompt_tokens,
                total_max_tokens,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, AllmError>;

impl AllmError {
    /// Categorized message stored in `ResponseData::error`
    pub fn to_example_error(&self) -> String {
        match self {
            Self::Llm(e) => e.to_example_error(),
            Self::PromptTooLong { .. } | Self::Unsplittable { .. } | Self::Validation(_) => {
                format!("{}: {}", labels::VALUE_ERROR, self)
            }
            _ => format!("{}: {}", labels::RESPONSE_ERROR, self),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
