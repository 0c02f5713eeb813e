//! Global Constants
//!
//! Centralized defaults for generation, retries, chunking and backends.
//! All magic numbers should be defined here with documentation.

/// Batch generation defaults
pub mod generation {
    /// Maximum number of provider calls in flight per model instance
    pub const MAX_CONCURRENCY: usize = 1000;

    /// Tokens reserved for BOS/EOS and other special tokens
    pub const SAFETY_MARGIN_TOKENS: usize = 50;

    /// Id of the synthetic example used when no input data is supplied
    pub const DEFAULT_ID: &str = "DEFAULT_ID";

    /// Separator placed between the user prompt and schema format instructions
    pub const FORMAT_INSTRUCTIONS_SEPARATOR: &str = "\n\n";
}

/// Retry policy defaults
pub mod retry {
    /// Total attempts per provider call (first attempt included)
    pub const MAX_ATTEMPTS: usize = 8;

    /// Lower bound for the exponential backoff (seconds)
    pub const MIN_DELAY_SECS: u64 = 4;

    /// Upper bound for the exponential backoff (seconds)
    pub const MAX_DELAY_SECS: u64 = 10;

    /// Backoff multiplier
    pub const BACKOFF_FACTOR: f32 = 2.0;
}

/// Long-text chain defaults
pub mod long_text {
    /// Words shared between neighbouring chunks
    pub const OVERLAP_SIZE: usize = 50;

    /// Placeholder that receives each chunk
    pub const TEXT_KEY: &str = "text";

    /// Joiner for concatenated chunk summaries
    pub const SUMMARY_SEPARATOR: &str = " ";

    /// Reduction prompt; `{output_data_model}` is pre-filled with format instructions
    pub const AGGREGATION_PROMPT: &str = "You're an AI agent that combines product summaries. Write a summary of the provided summaries. Keep the most important information and discard
redundant information. The input is a JSON object.

{output_data_model}

{text}
";

    /// Placeholder in [`AGGREGATION_PROMPT`] that receives format instructions
    pub const OUTPUT_DATA_MODEL_KEY: &str = "output_data_model";
}

/// Per-example error labels
pub mod labels {
    pub const VALUE_ERROR: &str = "Value Error has occurred";
    pub const RESPONSE_ERROR: &str = "Response error";
    pub const CONTENT_FILTER: &str = "Content Filter Message";
    pub const TIMEOUT_ERROR: &str = "Timeout Error";
    pub const INVALID_ARGUMENT: &str = "Invalid Argument Exception";
    pub const RATE_LIMIT: &str = "Rate Limit Error";
    pub const CONNECTION_ERROR: &str = "Connection Error";
    pub const SERVICE_UNAVAILABLE: &str = "Service Unavailable";
    pub const AUTH_ERROR: &str = "Authentication Error";
}

/// Text returned in place of a completion the provider refused on safety grounds
pub const RESPONSE_BLOCKED: &str = "Response blocked by the provider's safety filters";

/// Network constants
pub mod network {
    /// Default request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

    /// Connection timeout (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 30;
}

/// Per-backend model defaults
pub mod models {
    pub mod openai {
        pub const MODEL_NAME: &str = "gpt-3.5-turbo";
        pub const API_BASE: &str = "https://api.openai.com/v1";
        pub const AZURE_API_VERSION: &str = "2023-05-15";
        pub const TOTAL_MAX_TOKENS: usize = 4096;
        pub const MAX_OUTPUT_TOKENS: usize = 512;
        pub const TEMPERATURE: f32 = 0.0;
    }

    pub mod azure_llama2 {
        pub const TOTAL_MAX_TOKENS: usize = 4096;
        pub const MAX_OUTPUT_TOKENS: usize = 512;
        pub const TEMPERATURE: f32 = 0.0;
        pub const TOP_P: f32 = 1.0;
    }

    pub mod azure_mistral {
        pub const TOTAL_MAX_TOKENS: usize = 8192;
        pub const MAX_OUTPUT_TOKENS: usize = 1024;
        pub const TEMPERATURE: f32 = 0.0;
        pub const TOP_P: f32 = 1.0;
    }

    pub mod vertex {
        pub const LOCATION: &str = "us-central1";
        pub const TEMPERATURE: f32 = 0.0;
        pub const TOP_P: f32 = 0.95;
        pub const TOP_K: u32 = 40;

        pub const PALM_MODEL_NAME: &str = "text-bison@001";
        pub const PALM_TOTAL_MAX_TOKENS: usize = 8192;
        pub const PALM_MAX_OUTPUT_TOKENS: usize = 1024;

        pub const GEMINI_MODEL_NAME: &str = "gemini-pro";
        pub const GEMINI_TOTAL_MAX_TOKENS: usize = 30720;
        pub const GEMINI_MAX_OUTPUT_TOKENS: usize = 2048;

        pub const GEMMA_MODEL_NAME: &str = "gemma";
        pub const GEMMA_TOTAL_MAX_TOKENS: usize = 8192;
        pub const GEMMA_MAX_OUTPUT_TOKENS: usize = 1024;
    }
}
