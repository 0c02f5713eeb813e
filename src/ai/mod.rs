//! AI Integration Layer
//!
//! Batch generation over LLM backends: token budgets, prompt templates,
//! validation, chunking for long inputs, retries and timeouts, and the
//! provider adapters themselves.

pub mod budget;
pub mod chunker;
pub mod long_text;
pub mod metrics;
pub mod model;
pub mod prompt;
pub mod provider;
pub mod retry;
pub mod schema;
pub mod timeout;
pub mod tokenizer;
pub mod validation;

pub use budget::{BudgetCheck, TokenBudget, max_allowed_tokens};
pub use chunker::TextChunker;
pub use long_text::{AggregationStrategy, LongTextSettings, LongTextTask};
pub use metrics::{BatchMetrics, MetricsSummary, SharedMetrics};
pub use model::{LlmModel, ModelConfig};
pub use prompt::{ChatPrompt, PromptTemplate, extract_placeholders};
pub use provider::{
    BackendCapabilities, ChatBackend, ChatRequest, SamplingParams, SharedBackend, create_backend,
};
pub use retry::RetryPolicy;
pub use schema::{
    AggregateOutput, ChunkOutput, KeywordsOutput, OutputSchema, SummaryOutput, format_instructions,
};
pub use timeout::{TimeoutConfig, with_timeout};
pub use tokenizer::{TiktokenCounter, TokenCount, TokenCounter, TokenEstimator};
pub use validation::{ResponseParser, validate_input, validate_system_prompt};
