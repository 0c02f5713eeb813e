//! Azure ML Online Endpoint Backend
//!
//! Self-deployed Llama 2 and Mistral models behind an Azure ML realtime
//! endpoint. The payload wraps chat messages and sampling parameters in an
//! `input_data` envelope; the endpoint answers with `{"output": "..."}`.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatBackend, ChatRequest, http_client, send_json};
use crate::ai::timeout::TimeoutConfig;
use crate::ai::tokenizer::{TokenCount, TokenCounter};
use crate::config::{ModelKind, ModelSettings};
use crate::types::{AllmError, LlmError, Result};

/// Which model family is deployed, which decides a few payload fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AzureMlFamily {
    Llama2,
    Mistral,
}

/// Azure ML endpoint backend with secure API key handling
pub struct AzureMlBackend {
    api_key: SecretString,
    endpoint_url: String,
    deployment: Option<String>,
    family: AzureMlFamily,
    client: reqwest::Client,
    counter: TokenCounter,
}

impl std::fmt::Debug for AzureMlBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureMlBackend")
            .field("api_key", &"[REDACTED]")
            .field("endpoint_url", &self.endpoint_url)
            .field("deployment", &self.deployment)
            .field("family", &self.family)
            .finish()
    }
}

impl AzureMlBackend {
    pub fn new(
        api_key: SecretString,
        endpoint_url: impl Into<String>,
        deployment: Option<String>,
        family: AzureMlFamily,
        timeouts: &TimeoutConfig,
    ) -> Result<Self> {
        Ok(Self {
            api_key,
            endpoint_url: endpoint_url.into(),
            deployment,
            family,
            client: http_client(timeouts)?,
            counter: TokenCounter::default(),
        })
    }

    pub fn from_settings(settings: &ModelSettings, timeouts: &TimeoutConfig) -> Result<Self> {
        let family = match settings.kind {
            ModelKind::AzureMistral => AzureMlFamily::Mistral,
            _ => AzureMlFamily::Llama2,
        };
        let endpoint_url = settings.endpoint.clone().ok_or_else(|| {
            AllmError::Config("Azure ML endpoints require model.endpoint".to_string())
        })?;
        let api_key = settings
            .resolve_api_key("AZURE_ML_API_KEY")?
            .ok_or_else(|| {
                AllmError::Config(
                    "API key not found. Set AZURE_ML_API_KEY or provide model.api_key / model.credentials_file"
                        .to_string(),
                )
            })?;

        Self::new(
            api_key,
            endpoint_url,
            settings.deployment.clone(),
            family,
            timeouts,
        )
    }

    fn build_payload(&self, request: &ChatRequest) -> AzureMlRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: request.prompt.clone(),
        });

        let params = &request.params;
        let sampling = params.temperature > 0.0;
        AzureMlRequest {
            input_data: InputEnvelope {
                input_string: messages,
                parameters: Parameters {
                    max_new_tokens: params.max_output_tokens,
                    top_p: params.top_p,
                    do_sample: sampling,
                    temperature: sampling.then_some(params.temperature),
                    return_full_text: match self.family {
                        AzureMlFamily::Mistral => Some(false),
                        AzureMlFamily::Llama2 => None,
                    },
                },
            },
        }
    }
}

impl TokenCount for AzureMlBackend {
    fn count_tokens(&self, text: &str) -> usize {
        self.counter.count(text)
    }
}

#[async_trait]
impl ChatBackend for AzureMlBackend {
    async fn complete(&self, request: &ChatRequest) -> std::result::Result<String, LlmError> {
        let payload = self.build_payload(request);
        let mut http = self
            .client
            .post(&self.endpoint_url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&payload);
        if let Some(deployment) = &self.deployment {
            http = http.header("azureml-model-deployment", deployment);
        }

        debug!(endpoint = %self.endpoint_url, "Sending Azure ML request");
        let response: AzureMlResponse = send_json(http, self.name()).await?;
        Ok(response.output)
    }

    fn name(&self) -> &str {
        match self.family {
            AzureMlFamily::Llama2 => "azure_llama2",
            AzureMlFamily::Mistral => "azure_mistral",
        }
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct AzureMlRequest {
    input_data: InputEnvelope,
}

#[derive(Debug, Serialize)]
struct InputEnvelope {
    input_string: Vec<ChatMessage>,
    parameters: Parameters,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct Parameters {
    max_new_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    do_sample: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    return_full_text: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct AzureMlResponse {
    output: String,
}
