//! Vertex AI Backend
//!
//! Three Google endpoints behind one adapter:
//! - Gemini via `generateContent`
//! - PaLM (`text-bison`) via the publisher model `predict` endpoint
//! - Gemma via a Model Garden endpoint `predict`
//!
//! ## Safety blocks
//!
//! Vertex refuses some completions on safety grounds without failing the
//! request. [`BlockedPolicy`] decides whether that surfaces as the
//! [`RESPONSE_BLOCKED`] text or as a `ContentFilter` error.
//!
//! ## Gemma output
//!
//! Model Garden deployments echo the request as `Prompt:\n{prompt}\nOutput:\n`
//! before the completion; the echo is stripped.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{ChatBackend, ChatRequest, http_client, send_json};
use crate::ai::timeout::TimeoutConfig;
use crate::ai::tokenizer::{TokenCount, TokenCounter};
use crate::config::{ModelKind, ModelSettings};
use crate::constants::RESPONSE_BLOCKED;
use crate::constants::models::vertex as vertex_defaults;
use crate::types::{AllmError, ErrorCategory, LlmError, Result};

/// Which Vertex API serves the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VertexEndpoint {
    Gemini { model: String },
    Palm { model: String },
    Gemma { endpoint_id: String },
}

/// How a safety-blocked completion is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockedPolicy {
    /// Successful response whose text is [`RESPONSE_BLOCKED`]
    #[default]
    Sentinel,
    /// `ContentFilter` error for the example
    Error,
}

/// Vertex AI backend authenticated with an OAuth access token
pub struct VertexBackend {
    access_token: SecretString,
    project: String,
    location: String,
    endpoint: VertexEndpoint,
    blocked: BlockedPolicy,
    client: reqwest::Client,
    counter: TokenCounter,
}

impl std::fmt::Debug for VertexBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexBackend")
            .field("access_token", &"[REDACTED]")
            .field("project", &self.project)
            .field("location", &self.location)
            .field("endpoint", &self.endpoint)
            .field("blocked", &self.blocked)
            .finish()
    }
}

impl VertexBackend {
    pub fn new(
        access_token: SecretString,
        project: impl Into<String>,
        location: impl Into<String>,
        endpoint: VertexEndpoint,
        blocked: BlockedPolicy,
        timeouts: &TimeoutConfig,
    ) -> Result<Self> {
        Ok(Self {
            access_token,
            project: project.into(),
            location: location.into(),
            endpoint,
            blocked,
            client: http_client(timeouts)?,
            counter: TokenCounter::default(),
        })
    }

    pub fn from_settings(settings: &ModelSettings, timeouts: &TimeoutConfig) -> Result<Self> {
        let endpoint = match settings.kind {
            ModelKind::VertexGemini => VertexEndpoint::Gemini {
                model: settings.model_name(),
            },
            ModelKind::VertexPalm => VertexEndpoint::Palm {
                model: settings.model_name(),
            },
            _ => VertexEndpoint::Gemma {
                endpoint_id: settings.endpoint_id.clone().ok_or_else(|| {
                    AllmError::Config("Gemma requires model.endpoint_id".to_string())
                })?,
            },
        };
        let project = settings
            .project
            .clone()
            .ok_or_else(|| AllmError::Config("Vertex AI requires model.project".to_string()))?;
        let location = settings
            .location
            .clone()
            .unwrap_or_else(|| vertex_defaults::LOCATION.to_string());
        let access_token = settings
            .resolve_api_key("VERTEX_ACCESS_TOKEN")?
            .ok_or_else(|| {
                AllmError::Config(
                    "Access token not found. Set VERTEX_ACCESS_TOKEN or provide model.api_key / model.credentials_file"
                        .to_string(),
                )
            })?;
        let blocked = if settings.blocked_as_error {
            BlockedPolicy::Error
        } else {
            BlockedPolicy::Sentinel
        };

        Self::new(access_token, project, location, endpoint, blocked, timeouts)
    }

    fn url(&self) -> String {
        let base = format!(
            "https://{loc}-aiplatform.googleapis.com/v1/projects/{project}/locations/{loc}",
            loc = self.location,
            project = self.project
        );
        match &self.endpoint {
            VertexEndpoint::Gemini { model } => {
                format!("{}/publishers/google/models/{}:generateContent", base, model)
            }
            VertexEndpoint::Palm { model } => {
                format!("{}/publishers/google/models/{}:predict", base, model)
            }
            VertexEndpoint::Gemma { endpoint_id } => {
                format!("{}/endpoints/{}:predict", base, endpoint_id)
            }
        }
    }

    /// Prompt text for completion-style endpoints, which take no system role
    fn flat_prompt(request: &ChatRequest) -> String {
        match &request.system_prompt {
            Some(system) => format!("System: {}\nHuman: {}", system, request.prompt),
            None => request.prompt.clone(),
        }
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        let params = &request.params;
        match &self.endpoint {
            VertexEndpoint::Gemini { .. } => {
                let mut body = json!({
                    "contents": [{"role": "user", "parts": [{"text": request.prompt}]}],
                    "generationConfig": {
                        "temperature": params.temperature,
                        "topP": params.top_p,
                        "topK": params.top_k,
                        "maxOutputTokens": params.max_output_tokens,
                    },
                });
                if let Some(system) = &request.system_prompt {
                    body["systemInstruction"] = json!({"parts": [{"text": system}]});
                }
                body
            }
            VertexEndpoint::Palm { .. } => json!({
                "instances": [{"prompt": Self::flat_prompt(request)}],
                "parameters": {
                    "temperature": params.temperature,
                    "topP": params.top_p,
                    "topK": params.top_k,
                    "maxOutputTokens": params.max_output_tokens,
                },
            }),
            VertexEndpoint::Gemma { .. } => json!({
                "instances": [{
                    "prompt": Self::flat_prompt(request),
                    "max_tokens": params.max_output_tokens,
                    "temperature": params.temperature,
                    "top_p": params.top_p,
                    "top_k": params.top_k,
                    "n": 1,
                }],
            }),
        }
    }

    fn blocked_response(&self) -> std::result::Result<String, LlmError> {
        match self.blocked {
            BlockedPolicy::Sentinel => Ok(RESPONSE_BLOCKED.to_string()),
            BlockedPolicy::Error => Err(LlmError::with_provider(
                ErrorCategory::ContentFilter,
                "Response blocked by safety filters",
                self.name(),
            )),
        }
    }

    fn parse_gemini(&self, response: GenerateContentResponse) -> std::result::Result<String, LlmError> {
        if response
            .prompt_feedback
            .as_ref()
            .is_some_and(|f| f.block_reason.is_some())
        {
            return self.blocked_response();
        }

        let candidate = response.candidates.into_iter().next().ok_or_else(|| {
            LlmError::with_provider(ErrorCategory::Unknown, "No candidates in response", self.name())
        })?;

        if matches!(
            candidate.finish_reason.as_deref(),
            Some("SAFETY" | "BLOCKLIST" | "PROHIBITED_CONTENT")
        ) {
            return self.blocked_response();
        }

        Ok(candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<String>())
            .unwrap_or_default())
    }

    fn parse_palm(&self, response: PredictResponse) -> std::result::Result<String, LlmError> {
        let prediction = response.predictions.into_iter().next().ok_or_else(|| {
            LlmError::with_provider(ErrorCategory::Unknown, "No predictions in response", self.name())
        })?;

        let blocked = prediction
            .get("safetyAttributes")
            .and_then(|s| s.get("blocked"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if blocked {
            return self.blocked_response();
        }

        Ok(prediction
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    fn parse_gemma(
        &self,
        response: PredictResponse,
        prompt: &str,
    ) -> std::result::Result<String, LlmError> {
        let prediction = response.predictions.into_iter().next().ok_or_else(|| {
            LlmError::with_provider(ErrorCategory::Unknown, "No predictions in response", self.name())
        })?;
        let text = match &prediction {
            Value::String(text) => text.as_str(),
            Value::Array(items) => items.first().and_then(Value::as_str).unwrap_or_default(),
            _ => "",
        };

        strip_prompt_echo(text, prompt).ok_or_else(|| {
            LlmError::with_provider(
                ErrorCategory::Unknown,
                "Output returned from the model doesn't follow the expected format.",
                self.name(),
            )
        })
    }
}

/// Completion text after the last `Prompt:\n{prompt}\nOutput:\n` echo
fn strip_prompt_echo(text: &str, prompt: &str) -> Option<String> {
    let echo = format!("Prompt:\n{}\nOutput:\n", prompt);
    text.rsplit_once(&echo).map(|(_, output)| output.to_string())
}

impl TokenCount for VertexBackend {
    fn count_tokens(&self, text: &str) -> usize {
        self.counter.count(text)
    }
}

#[async_trait]
impl ChatBackend for VertexBackend {
    async fn complete(&self, request: &ChatRequest) -> std::result::Result<String, LlmError> {
        let http = self
            .client
            .post(self.url())
            .bearer_auth(self.access_token.expose_secret())
            .json(&self.build_body(request));

        debug!(endpoint = ?self.endpoint, "Sending Vertex AI request");
        match &self.endpoint {
            VertexEndpoint::Gemini { .. } => self.parse_gemini(send_json(http, self.name()).await?),
            VertexEndpoint::Palm { .. } => self.parse_palm(send_json(http, self.name()).await?),
            VertexEndpoint::Gemma { .. } => {
                let prompt = Self::flat_prompt(request);
                self.parse_gemma(send_json(http, self.name()).await?, &prompt)
            }
        }
    }

    fn name(&self) -> &str {
        match self.endpoint {
            VertexEndpoint::Gemini { .. } => "vertex_gemini",
            VertexEndpoint::Palm { .. } => "vertex_palm",
            VertexEndpoint::Gemma { .. } => "vertex_gemma",
        }
    }
}

// Response types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::SamplingParams;

    fn backend(endpoint: VertexEndpoint, blocked: BlockedPolicy) -> VertexBackend {
        VertexBackend::new(
            SecretString::from("token".to_string()),
            "proj",
            "us-central1",
            endpoint,
            blocked,
            &TimeoutConfig::default(),
        )
        .unwrap()
    }

    fn gemini(blocked: BlockedPolicy) -> VertexBackend {
        backend(
            VertexEndpoint::Gemini {
                model: "gemini-pro".to_string(),
            },
            blocked,
        )
    }

    fn request(system: Option<&str>) -> ChatRequest {
        ChatRequest {
            system_prompt: system.map(str::to_string),
            prompt: "Hi".to_string(),
            params: SamplingParams {
                temperature: 0.0,
                top_p: Some(0.95),
                top_k: Some(40),
                max_output_tokens: 2048,
            },
        }
    }

    #[test]
    fn test_urls() {
        assert_eq!(
            gemini(BlockedPolicy::Sentinel).url(),
            "https://us-central1-aiplatform.googleapis.com/v1/projects/proj/locations/us-central1/publishers/google/models/gemini-pro:generateContent"
        );
        let gemma = backend(
            VertexEndpoint::Gemma {
                endpoint_id: "123".to_string(),
            },
            BlockedPolicy::Sentinel,
        );
        assert!(gemma.url().ends_with("/endpoints/123:predict"));
    }

    #[test]
    fn test_gemini_body() {
        let body = gemini(BlockedPolicy::Sentinel).build_body(&request(Some("Be brief")));
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Hi");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be brief");
        assert_eq!(body["generationConfig"]["topK"], 40);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 2048);
    }

    #[test]
    fn test_gemini_text_is_joined() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "a"}, {"text": "b"}]}, "finishReason": "STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(gemini(BlockedPolicy::Sentinel).parse_gemini(response).unwrap(), "ab");
    }

    #[test]
    fn test_blocked_policy() {
        let blocked = r#"{"candidates": [{"finishReason": "SAFETY"}]}"#;

        let response: GenerateContentResponse = serde_json::from_str(blocked).unwrap();
        assert_eq!(
            gemini(BlockedPolicy::Sentinel).parse_gemini(response).unwrap(),
            RESPONSE_BLOCKED
        );

        let response: GenerateContentResponse = serde_json::from_str(blocked).unwrap();
        let err = gemini(BlockedPolicy::Error).parse_gemini(response).unwrap_err();
        assert_eq!(err.category, ErrorCategory::ContentFilter);
    }

    #[test]
    fn test_prompt_feedback_block() {
        let response: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap();
        assert_eq!(
            gemini(BlockedPolicy::Sentinel).parse_gemini(response).unwrap(),
            RESPONSE_BLOCKED
        );
    }

    #[test]
    fn test_palm_blocked_prediction() {
        let palm = backend(
            VertexEndpoint::Palm {
                model: "text-bison@001".to_string(),
            },
            BlockedPolicy::Sentinel,
        );
        let response: PredictResponse = serde_json::from_str(
            r#"{"predictions": [{"content": "", "safetyAttributes": {"blocked": true}}]}"#,
        )
        .unwrap();
        assert_eq!(palm.parse_palm(response).unwrap(), RESPONSE_BLOCKED);
    }

    #[test]
    fn test_strip_prompt_echo() {
        let text = "Prompt:\nHi\nOutput:\nHello there";
        assert_eq!(strip_prompt_echo(text, "Hi").as_deref(), Some("Hello there"));
        assert_eq!(strip_prompt_echo("Hello there", "Hi"), None);
    }

    #[test]
    fn test_gemma_unexpected_format() {
        let gemma = backend(
            VertexEndpoint::Gemma {
                endpoint_id: "1".to_string(),
            },
            BlockedPolicy::Sentinel,
        );
        let response: PredictResponse =
            serde_json::from_str(r#"{"predictions": ["no echo"]}"#).unwrap();
        let err = gemma.parse_gemma(response, "Hi").unwrap_err();
        assert!(err.message.contains("expected format"));
    }
}
