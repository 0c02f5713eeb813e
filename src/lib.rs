//! allm - Batch Prompting over LLM Backends
//!
//! Runs one prompt template over a batch of examples against a hosted or
//! self-deployed model and returns one result per example.
//!
//! ## Core Features
//!
//! - **Bounded concurrency**: one semaphore gates every provider call
//! - **Token budgets**: per-example prompt checks against the model window
//! - **Retries and timeouts**: exponential backoff on transient failures
//! - **Structured output**: schema format instructions plus tolerant JSON parsing
//! - **Long inputs**: split into chunks, map concurrently, reduce
//!
//! ## Quick Start
//!
//! ```ignore
//! use allm::{ConfigLoader, InputData, KeywordsOutput, LlmModel, create_backend};
//!
//! let config = ConfigLoader::load()?;
//! let model = LlmModel::new(create_backend(&config.model)?, config.model_config()?)?;
//! let input = vec![InputData::from_pairs("1", [("text", "Rust is fast and safe")])];
//! let results = model
//!     .generate_structured::<KeywordsOutput>("Extract keywords: {text}", Some(input.as_slice()), None)
//!     .await?;
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: batch core, prompts, validation, chunking, backends
//! - [`config`]: layered configuration
//! - [`io`]: input data and credential loaders
//! - [`types`]: input/output records and errors

pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod io;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader, ModelKind, ModelSettings};

// Data and Errors
pub use types::{AllmError, ErrorCategory, InputData, LlmError, ResponseData, Result, ValidationError};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{
    AggregationStrategy, BackendCapabilities, ChatBackend, KeywordsOutput, LlmModel,
    LongTextSettings, LongTextTask, ModelConfig, OutputSchema, RetryPolicy, SummaryOutput,
    TokenBudget, create_backend,
};
