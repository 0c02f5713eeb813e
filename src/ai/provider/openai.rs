//! OpenAI Chat Completions Backend
//!
//! Serves both api.openai.com (bearer token) and Azure OpenAI deployments
//! (`api-key` header plus `api-version` query). Token counts use the
//! `cl100k_base` encoding.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatBackend, ChatRequest, http_client, send_json};
use crate::ai::timeout::TimeoutConfig;
use crate::ai::tokenizer::{TiktokenCounter, TokenCount};
use crate::config::{ModelKind, ModelSettings};
use crate::constants::models::openai as openai_defaults;
use crate::types::{AllmError, ErrorCategory, LlmError, Result};

/// Where chat completions are sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenAiEndpoint {
    OpenAi {
        api_base: String,
    },
    Azure {
        endpoint: String,
        deployment: String,
        api_version: String,
    },
}

impl OpenAiEndpoint {
    fn url(&self) -> String {
        match self {
            Self::OpenAi { api_base } => {
                format!("{}/chat/completions", api_base.trim_end_matches('/'))
            }
            Self::Azure {
                endpoint,
                deployment,
                api_version,
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint.trim_end_matches('/'),
                deployment,
                api_version
            ),
        }
    }
}

/// OpenAI-compatible backend with secure API key handling
pub struct OpenAiBackend {
    /// API key stored securely - never exposed in logs or debug output
    api_key: SecretString,
    endpoint: OpenAiEndpoint,
    model: String,
    client: reqwest::Client,
    counter: TiktokenCounter,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("api_key", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiBackend {
    pub fn new(
        api_key: SecretString,
        endpoint: OpenAiEndpoint,
        model: impl Into<String>,
        timeouts: &TimeoutConfig,
    ) -> Result<Self> {
        Ok(Self {
            api_key,
            endpoint,
            model: model.into(),
            client: http_client(timeouts)?,
            counter: TiktokenCounter::cl100k()?,
        })
    }

    pub fn from_settings(settings: &ModelSettings, timeouts: &TimeoutConfig) -> Result<Self> {
        let (endpoint, env_var) = match settings.kind {
            ModelKind::AzureOpenai => {
                let endpoint = settings.endpoint.clone().ok_or_else(|| {
                    AllmError::Config("Azure OpenAI requires model.endpoint".to_string())
                })?;
                let deployment = settings.deployment.clone().ok_or_else(|| {
                    AllmError::Config("Azure OpenAI requires model.deployment".to_string())
                })?;
                let api_version = settings
                    .api_version
                    .clone()
                    .unwrap_or_else(|| openai_defaults::AZURE_API_VERSION.to_string());
                (
                    OpenAiEndpoint::Azure {
                        endpoint,
                        deployment,
                        api_version,
                    },
                    "AZURE_OPENAI_API_KEY",
                )
            }
            _ => (
                OpenAiEndpoint::OpenAi {
                    api_base: settings
                        .endpoint
                        .clone()
                        .unwrap_or_else(|| openai_defaults::API_BASE.to_string()),
                },
                "OPENAI_API_KEY",
            ),
        };

        let api_key = settings.resolve_api_key(env_var)?.ok_or_else(|| {
            AllmError::Config(format!(
                "API key not found. Set {} or provide model.api_key / model.credentials_file",
                env_var
            ))
        })?;

        Self::new(api_key, endpoint, settings.model_name(), timeouts)
    }

    fn build_request(&self, request: &ChatRequest) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_prompt {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: request.params.temperature,
            top_p: request.params.top_p,
            max_tokens: Some(request.params.max_output_tokens),
        }
    }
}

impl TokenCount for OpenAiBackend {
    fn count_tokens(&self, text: &str) -> usize {
        self.counter.count_tokens(text)
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    async fn complete(&self, request: &ChatRequest) -> std::result::Result<String, LlmError> {
        let body = self.build_request(request);
        let http = self.client.post(self.endpoint.url()).json(&body);
        let http = match &self.endpoint {
            OpenAiEndpoint::OpenAi { .. } => http.bearer_auth(self.api_key.expose_secret()),
            OpenAiEndpoint::Azure { .. } => http.header("api-key", self.api_key.expose_secret()),
        };

        debug!(model = %self.model, "Sending chat completion request");
        let response: ChatCompletionResponse = send_json(http, self.name()).await?;
        extract_content(response, self.name())
    }

    fn name(&self) -> &str {
        match self.endpoint {
            OpenAiEndpoint::OpenAi { .. } => "openai",
            OpenAiEndpoint::Azure { .. } => "azure_openai",
        }
    }
}

fn extract_content(
    response: ChatCompletionResponse,
    provider: &str,
) -> std::result::Result<String, LlmError> {
    let choice = response.choices.into_iter().next().ok_or_else(|| {
        LlmError::with_provider(ErrorCategory::Unknown, "No choices in response", provider)
    })?;

    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(LlmError::with_provider(
            ErrorCategory::ContentFilter,
            "The response was filtered due to the prompt triggering content management policy",
            provider,
        ));
    }

    choice.message.content.ok_or_else(|| {
        LlmError::with_provider(ErrorCategory::Unknown, "No content in response", provider)
    })
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
