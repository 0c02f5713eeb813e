//! Chat Backend Abstraction
//!
//! Defines the [`ChatBackend`] trait every model adapter implements: count
//! tokens and complete one single-turn chat request. Differences between
//! models (system-prompt support, format-instruction injection, how safety
//! blocks surface) are configuration flags, not trait overrides.
//!
//! ## Adapters
//!
//! - `openai`: OpenAI and Azure OpenAI chat completions
//! - `azure_ml`: self-deployed Llama 2 / Mistral online endpoints
//! - `vertex`: Vertex AI Gemini / PaLM and Model Garden Gemma

mod azure_ml;
mod openai;
mod vertex;

pub use azure_ml::{AzureMlBackend, AzureMlFamily};
pub use openai::{OpenAiBackend, OpenAiEndpoint};
pub use vertex::{BlockedPolicy, VertexBackend, VertexEndpoint};

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::ai::timeout::TimeoutConfig;
use crate::ai::tokenizer::TokenCount;
use crate::config::{ModelKind, ModelSettings};
use crate::types::{AllmError, ErrorCategory, ErrorClassifier, LlmError, Result};

// =============================================================================
// Request Types
// =============================================================================

/// Sampling parameters sent with every request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub max_output_tokens: usize,
}

/// One single-turn chat request
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system_prompt: Option<String>,
    pub prompt: String,
    pub params: SamplingParams,
}

/// What a model accepts beyond a plain user message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendCapabilities {
    pub supports_system_prompt: bool,
    /// Whether schema format instructions are appended to the prompt
    pub injects_format_instructions: bool,
}

impl Default for BackendCapabilities {
    fn default() -> Self {
        Self {
            supports_system_prompt: true,
            injects_format_instructions: true,
        }
    }
}

// =============================================================================
// Chat Backend Trait
// =============================================================================

/// A model endpoint: token counting plus asynchronous chat completion
#[async_trait]
pub trait ChatBackend: TokenCount + Send + Sync {
    /// Complete one request; failures carry a category for retry decisions
    async fn complete(&self, request: &ChatRequest) -> std::result::Result<String, LlmError>;

    /// Backend name for logging and error messages
    fn name(&self) -> &str;
}

/// Shared backend type for concurrent example tasks
pub type SharedBackend = Arc<dyn ChatBackend>;

/// Create a backend from model settings
pub fn create_backend(settings: &ModelSettings) -> Result<SharedBackend> {
    let timeouts = TimeoutConfig::default().with_request(settings.request_timeout());

    match settings.kind {
        ModelKind::Openai | ModelKind::AzureOpenai => {
            Ok(Arc::new(OpenAiBackend::from_settings(settings, &timeouts)?))
        }
        ModelKind::AzureLlama2 | ModelKind::AzureMistral => {
            Ok(Arc::new(AzureMlBackend::from_settings(settings, &timeouts)?))
        }
        ModelKind::VertexPalm | ModelKind::VertexGemini | ModelKind::VertexGemma => {
            Ok(Arc::new(VertexBackend::from_settings(settings, &timeouts)?))
        }
    }
}

// =============================================================================
// HTTP Helpers
// =============================================================================

/// HTTP client with connection timeout; request deadlines are applied per attempt
pub(crate) fn http_client(timeouts: &TimeoutConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(timeouts.connection)
        .build()
        .map_err(|e| AllmError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Send a JSON request and decode a JSON response, classifying every failure
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    provider: &str,
) -> std::result::Result<T, LlmError> {
    let response = request
        .send()
        .await
        .map_err(|e| ErrorClassifier::classify_reqwest(&e, provider))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ErrorClassifier::classify_http_status(
            status.as_u16(),
            &body,
            provider,
        ));
    }

    let body = response
        .text()
        .await
        .map_err(|e| ErrorClassifier::classify_reqwest(&e, provider))?;

    serde_json::from_str(&body).map_err(|e| {
        LlmError::with_provider(
            ErrorCategory::Unknown,
            format!("Failed to parse response body: {}", e),
            provider,
        )
    })
}

// =============================================================================
// Test Backend
// =============================================================================


#[cfg(test)]
mod tests {
    use super::mock::MockBackend;
    use super::*;

    fn request(prompt: &str) -> ChatRequest {
        ChatRequest {
            system_prompt: None,
            prompt: prompt.to_string(),
            params: SamplingParams {
                temperature: 0.0,
                top_p: None,
                top_k: None,
                max_output_tokens: 16,
            },
        }
    }

    #[test]
    fn test_default_capabilities() {
        let caps = BackendCapabilities::default();
        assert!(caps.supports_system_prompt);
        assert!(caps.injects_format_instructions);
    }

    #[tokio::test]
    async fn test_mock_backend_records_requests() {
        let backend = MockBackend::new(|req, call| Ok(format!("{}#{}", req.prompt, call)));
        assert_eq!(backend.complete(&request("a")).await.unwrap(), "a#0");
        assert_eq!(backend.complete(&request("b")).await.unwrap(), "b#1");
        assert_eq!(backend.calls(), 2);
        assert_eq!(backend.requests()[1].prompt, "b");
        assert_eq!(backend.count_tokens("three word text"), 3);
    }

    #[test]
    fn test_create_backend_requires_credentials() {
        let settings = ModelSettings {
            kind: ModelKind::AzureOpenai,
            endpoint: Some("https://example.openai.azure.com".to_string()),
            deployment: Some("gpt".to_string()),
            ..ModelSettings::default()
        };
        // Without api_key, credentials_file, or AZURE_OPENAI_API_KEY
        if std::env::var("AZURE_OPENAI_API_KEY").is_err() {
            assert!(create_backend(&settings).is_err());
        }
    }
}
