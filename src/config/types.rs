//! Configuration Types
//!
//! All configuration structures with sensible defaults. Numeric model
//! settings left unset fall back to the defaults of the selected
//! [`ModelKind`].

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};

use crate::ai::budget::TokenBudget;
use crate::ai::long_text::LongTextSettings;
use crate::ai::model::ModelConfig;
use crate::ai::provider::{BackendCapabilities, SamplingParams};
use crate::ai::retry::RetryPolicy;
use crate::constants::{generation, models, network, retry as retry_defaults};
use crate::types::{AllmError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Backend selection, credentials and sampling
    pub model: ModelSettings,

    /// Map-reduce handling of over-long inputs
    pub long_text: LongTextSettings,

    /// Backoff for transient provider failures
    pub retry: RetrySettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            model: ModelSettings::default(),
            long_text: LongTextSettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `AllmError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        let temperature = self.model.temperature();
        if !(0.0..=2.0).contains(&temperature) {
            return Err(AllmError::Config(format!(
                "Model temperature must be between 0.0 and 2.0, got {}",
                temperature
            )));
        }

        if self.model.request_timeout_secs == 0 {
            return Err(AllmError::Config(
                "Model request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.model.max_concurrency == 0 {
            return Err(AllmError::Config(
                "Model max_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(AllmError::Config(
                "Retry max_attempts must be greater than 0".to_string(),
            ));
        }

        self.model.budget()?;
        Ok(())
    }

    /// Model configuration for the batch core
    pub fn model_config(&self) -> Result<ModelConfig> {
        self.model.model_config(&self.long_text, &self.retry)
    }
}

// =============================================================================
// Model Kind
// =============================================================================

/// Supported backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    AzureOpenai,
    #[default]
    Openai,
    AzureLlama2,
    AzureMistral,
    VertexPalm,
    VertexGemini,
    VertexGemma,
}

impl ModelKind {
    pub const ALL: [ModelKind; 7] = [
        ModelKind::AzureOpenai,
        ModelKind::Openai,
        ModelKind::AzureLlama2,
        ModelKind::AzureMistral,
        ModelKind::VertexPalm,
        ModelKind::VertexGemini,
        ModelKind::VertexGemma,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::AzureOpenai => "azure_openai",
            ModelKind::Openai => "openai",
            ModelKind::AzureLlama2 => "azure_llama2",
            ModelKind::AzureMistral => "azure_mistral",
            ModelKind::VertexPalm => "vertex_palm",
            ModelKind::VertexGemini => "vertex_gemini",
            ModelKind::VertexGemma => "vertex_gemma",
        }
    }

    pub fn default_model_name(&self) -> &'static str {
        match self {
            ModelKind::AzureOpenai | ModelKind::Openai => models::openai::MODEL_NAME,
            ModelKind::AzureLlama2 => "llama-2-7b-chat",
            ModelKind::AzureMistral => "mistral-7b-instruct",
            ModelKind::VertexPalm => models::vertex::PALM_MODEL_NAME,
            ModelKind::VertexGemini => models::vertex::GEMINI_MODEL_NAME,
            ModelKind::VertexGemma => models::vertex::GEMMA_MODEL_NAME,
        }
    }

    /// Context window (prompt plus output)
    pub fn default_total_max_tokens(&self) -> usize {
        match self {
            ModelKind::AzureOpenai | ModelKind::Openai => models::openai::TOTAL_MAX_TOKENS,
            ModelKind::AzureLlama2 => models::azure_llama2::TOTAL_MAX_TOKENS,
            ModelKind::AzureMistral => models::azure_mistral::TOTAL_MAX_TOKENS,
            ModelKind::VertexPalm => models::vertex::PALM_TOTAL_MAX_TOKENS,
            ModelKind::VertexGemini => models::vertex::GEMINI_TOTAL_MAX_TOKENS,
            ModelKind::VertexGemma => models::vertex::GEMMA_TOTAL_MAX_TOKENS,
        }
    }

    pub fn default_max_output_tokens(&self) -> usize {
        match self {
            ModelKind::AzureOpenai | ModelKind::Openai => models::openai::MAX_OUTPUT_TOKENS,
            ModelKind::AzureLlama2 => models::azure_llama2::MAX_OUTPUT_TOKENS,
            ModelKind::AzureMistral => models::azure_mistral::MAX_OUTPUT_TOKENS,
            ModelKind::VertexPalm => models::vertex::PALM_MAX_OUTPUT_TOKENS,
            ModelKind::VertexGemini => models::vertex::GEMINI_MAX_OUTPUT_TOKENS,
            ModelKind::VertexGemma => models::vertex::GEMMA_MAX_OUTPUT_TOKENS,
        }
    }

    pub fn default_temperature(&self) -> f32 {
        match self {
            ModelKind::AzureOpenai | ModelKind::Openai => models::openai::TEMPERATURE,
            ModelKind::AzureLlama2 => models::azure_llama2::TEMPERATURE,
            ModelKind::AzureMistral => models::azure_mistral::TEMPERATURE,
            ModelKind::VertexPalm | ModelKind::VertexGemini | ModelKind::VertexGemma => {
                models::vertex::TEMPERATURE
            }
        }
    }

    pub fn default_top_p(&self) -> Option<f32> {
        match self {
            ModelKind::AzureOpenai | ModelKind::Openai => None,
            ModelKind::AzureLlama2 => Some(models::azure_llama2::TOP_P),
            ModelKind::AzureMistral => Some(models::azure_mistral::TOP_P),
            ModelKind::VertexPalm | ModelKind::VertexGemini | ModelKind::VertexGemma => {
                Some(models::vertex::TOP_P)
            }
        }
    }

    pub fn default_top_k(&self) -> Option<u32> {
        match self {
            ModelKind::VertexPalm | ModelKind::VertexGemini | ModelKind::VertexGemma => {
                Some(models::vertex::TOP_K)
            }
            _ => None,
        }
    }

    /// What the backend accepts beyond a plain user message
    pub fn capabilities(&self) -> BackendCapabilities {
        match self {
            ModelKind::AzureLlama2 | ModelKind::VertexGemma => BackendCapabilities {
                supports_system_prompt: true,
                injects_format_instructions: false,
            },
            ModelKind::AzureMistral => BackendCapabilities {
                supports_system_prompt: false,
                injects_format_instructions: true,
            },
            _ => BackendCapabilities::default(),
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.to_lowercase().replace('-', "_");
        ModelKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "Unknown model kind: {}. Use one of: {}",
                    s,
                    ModelKind::ALL.map(|k| k.as_str()).join(", ")
                )
            })
    }
}

// =============================================================================
// Model Settings
// =============================================================================

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub kind: ModelKind,

    /// Model or deployment name (defaults per kind)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,

    /// API base URL (OpenAI), resource endpoint (Azure OpenAI) or scoring URL (Azure ML)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Google Cloud project (Vertex AI)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Model Garden endpoint id (Gemma)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_id: Option<String>,

    /// Inline credential; never written back out
    #[serde(skip_serializing, deserialize_with = "deserialize_secret")]
    pub api_key: Option<SecretString>,

    /// File whose first line is the credential
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_file: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_max_tokens: Option<usize>,

    /// Deadline per request attempt in seconds
    pub request_timeout_secs: u64,

    /// Provider calls in flight at once
    pub max_concurrency: usize,

    /// Report safety-blocked completions as errors instead of sentinel text
    pub blocked_as_error: bool,
}

impl std::fmt::Debug for ModelSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSettings")
            .field("kind", &self.kind)
            .field("model_name", &self.model_name)
            .field("endpoint", &self.endpoint)
            .field("deployment", &self.deployment)
            .field("project", &self.project)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("credentials_file", &self.credentials_file)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("total_max_tokens", &self.total_max_tokens)
            .finish_non_exhaustive()
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            kind: ModelKind::default(),
            model_name: None,
            endpoint: None,
            deployment: None,
            api_version: None,
            project: None,
            location: None,
            endpoint_id: None,
            api_key: None,
            credentials_file: None,
            temperature: None,
            top_p: None,
            top_k: None,
            max_output_tokens: None,
            total_max_tokens: None,
            request_timeout_secs: network::DEFAULT_TIMEOUT_SECS,
            max_concurrency: generation::MAX_CONCURRENCY,
            blocked_as_error: false,
        }
    }
}

impl ModelSettings {
    pub fn model_name(&self) -> String {
        self.model_name
            .clone()
            .unwrap_or_else(|| self.kind.default_model_name().to_string())
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
            .unwrap_or_else(|| self.kind.default_temperature())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature(),
            top_p: self.top_p.or_else(|| self.kind.default_top_p()),
            top_k: self.top_k.or_else(|| self.kind.default_top_k()),
            max_output_tokens: self
                .max_output_tokens
                .unwrap_or_else(|| self.kind.default_max_output_tokens()),
        }
    }

    pub fn budget(&self) -> Result<TokenBudget> {
        TokenBudget::new(
            self.total_max_tokens
                .unwrap_or_else(|| self.kind.default_total_max_tokens()),
            self.max_output_tokens
                .unwrap_or_else(|| self.kind.default_max_output_tokens()),
        )
    }

    pub fn capabilities(&self) -> BackendCapabilities {
        self.kind.capabilities()
    }

    /// Credential lookup: inline key, then credentials file, then `env_var`
    pub fn resolve_api_key(&self, env_var: &str) -> Result<Option<SecretString>> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.expose_secret().is_empty()) {
            return Ok(Some(key.clone()));
        }
        if let Some(path) = &self.credentials_file {
            return crate::io::load_credentials(path).map(Some);
        }
        Ok(std::env::var(env_var)
            .ok()
            .filter(|k| !k.is_empty())
            .map(SecretString::from))
    }

    pub fn model_config(
        &self,
        long_text: &LongTextSettings,
        retry: &RetrySettings,
    ) -> Result<ModelConfig> {
        Ok(ModelConfig::new(self.budget()?, self.sampling())
            .with_capabilities(self.capabilities())
            .with_max_concurrency(self.max_concurrency)
            .with_retry(RetryPolicy::from(retry))
            .with_request_timeout(self.request_timeout())
            .with_long_text(long_text.clone()))
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

// =============================================================================
// Retry Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts, first call included
    pub max_attempts: usize,
    pub min_delay_secs: u64,
    pub max_delay_secs: u64,
    pub factor: f32,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: retry_defaults::MAX_ATTEMPTS,
            min_delay_secs: retry_defaults::MIN_DELAY_SECS,
            max_delay_secs: retry_defaults::MAX_DELAY_SECS,
            factor: retry_defaults::BACKOFF_FACTOR,
            jitter: true,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        RetryPolicy {
            max_attempts: settings.max_attempts,
            min_delay: Duration::from_secs(settings.min_delay_secs),
            max_delay: Duration::from_secs(settings.max_delay_secs),
            factor: settings.factor,
            jitter: settings.jitter,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.model.kind, ModelKind::Openai);
        assert!(!config.long_text.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_model_kind_parsing() {
        assert_eq!("azure-openai".parse::<ModelKind>().unwrap(), ModelKind::AzureOpenai);
        assert_eq!("vertex_gemma".parse::<ModelKind>().unwrap(), ModelKind::VertexGemma);
        assert!("claude".parse::<ModelKind>().is_err());
        assert_eq!(ModelKind::AzureMistral.to_string(), "azure_mistral");
    }

    #[test]
    fn test_per_kind_defaults() {
        let settings = ModelSettings {
            kind: ModelKind::VertexGemini,
            ..ModelSettings::default()
        };
        let budget = settings.budget().unwrap();
        assert_eq!(budget.total_max_tokens(), 30720);
        assert_eq!(budget.max_output_tokens(), 2048);

        let sampling = settings.sampling();
        assert_eq!(sampling.top_k, Some(40));
        assert_eq!(sampling.top_p, Some(0.95));
        assert_eq!(settings.model_name(), "gemini-pro");
    }

    #[test]
    fn test_capabilities_per_kind() {
        assert!(!ModelKind::AzureMistral.capabilities().supports_system_prompt);
        assert!(!ModelKind::AzureLlama2.capabilities().injects_format_instructions);
        assert!(!ModelKind::VertexGemma.capabilities().injects_format_instructions);
        assert_eq!(
            ModelKind::Openai.capabilities(),
            BackendCapabilities::default()
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.model.temperature = Some(3.0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.model.max_output_tokens = Some(4096);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.model.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_key_precedence_and_redaction() {
        let settings = ModelSettings {
            api_key: Some(SecretString::from("inline-secret")),
            ..ModelSettings::default()
        };
        let key = settings.resolve_api_key("ALLM_TEST_UNSET_KEY").unwrap().unwrap();
        assert_eq!(key.expose_secret(), "inline-secret");

        let debug = format!("{:?}", settings);
        assert!(!debug.contains("inline-secret"));

        let serialized = toml::to_string(&settings).unwrap();
        assert!(!serialized.contains("inline-secret"));
    }

    #[test]
    fn test_api_key_deserializes_into_secret() {
        let settings: ModelSettings =
            toml::from_str("kind = \"openai\"\napi_key = \"from-file\"").unwrap();
        let key = settings.api_key.as_ref().unwrap();
        assert_eq!(key.expose_secret(), "from-file");
        assert!(!format!("{:?}", settings).contains("from-file"));

        let empty: ModelSettings = toml::from_str("api_key = \"\"").unwrap();
        assert!(empty.resolve_api_key("ALLM_TEST_UNSET_KEY").unwrap().is_none());

        let absent: ModelSettings = toml::from_str("kind = \"openai\"").unwrap();
        assert!(absent.api_key.is_none());
    }

    #[test]
    fn test_model_config_from_settings() {
        let config = Config::default();
        let model_config = config.model_config().unwrap();
        assert_eq!(model_config.max_concurrency, 1000);
        assert_eq!(model_config.retry.max_attempts, 8);
        assert_eq!(model_config.request_timeout, Duration::from_secs(60));
        assert_eq!(model_config.budget.max_allowed_tokens(), 4096 - 512 - 50);
    }
}
