//! Batch Generation Core
//!
//! [`LlmModel`] turns one prompt template plus a batch of examples into one
//! [`ResponseData`] per example.
//!
//! ## Flow per example
//!
//! ```text
//! render ─▶ count tokens ─▶ budget check ─┬─ fits ──────────▶ gated call (retry + timeout)
//!                                          └─ over, long text ─▶ map-reduce chain
//! ```
//!
//! Pre-flight validation (placeholders, system prompt) fails the whole call.
//! Everything after it is captured in the example's `error` field, so one
//! failing example never affects its siblings. Results come back in input
//! order regardless of completion order.
//!
//! ## Concurrency
//!
//! Every provider call, including long-text map and reduce calls, takes a
//! permit from a single semaphore of `max_concurrency` permits for the
//! duration of one attempt.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, instrument};

use crate::ai::budget::TokenBudget;
use crate::ai::long_text::{LongTextChain, LongTextSettings};
use crate::ai::metrics::{BatchMetrics, SharedMetrics};
use crate::ai::prompt::{ChatPrompt, PromptTemplate, RenderedPrompt};
use crate::ai::provider::{BackendCapabilities, ChatRequest, SamplingParams, SharedBackend};
use crate::ai::retry::RetryPolicy;
use crate::ai::schema::{OutputSchema, format_instructions};
use crate::ai::timeout::with_timeout;
use crate::ai::validation::{ResponseParser, validate_input, validate_system_prompt};
use crate::constants::generation::MAX_CONCURRENCY;
use crate::constants::network::DEFAULT_TIMEOUT_SECS;
use crate::types::{AllmError, ErrorCategory, InputData, LlmError, ResponseData, Result};

// =============================================================================
// Model Configuration
// =============================================================================

/// Everything fixed at model construction
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub budget: TokenBudget,
    pub sampling: SamplingParams,
    pub capabilities: BackendCapabilities,
    /// Provider calls in flight at once
    pub max_concurrency: usize,
    pub retry: RetryPolicy,
    /// Deadline per attempt
    pub request_timeout: Duration,
    pub long_text: LongTextSettings,
}

impl ModelConfig {
    pub fn new(budget: TokenBudget, sampling: SamplingParams) -> Self {
        Self {
            budget,
            sampling,
            capabilities: BackendCapabilities::default(),
            max_concurrency: MAX_CONCURRENCY,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            long_text: LongTextSettings::default(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: BackendCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_long_text(mut self, long_text: LongTextSettings) -> Self {
        self.long_text = long_text;
        self
    }
}

// =============================================================================
// LLM Model
// =============================================================================

/// A backend plus the batch machinery around it
pub struct LlmModel {
    backend: SharedBackend,
    config: ModelConfig,
    gate: Semaphore,
    metrics: SharedMetrics,
}

impl std::fmt::Debug for LlmModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmModel")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish()
    }
}

impl LlmModel {
    pub fn new(backend: SharedBackend, config: ModelConfig) -> Result<Self> {
        if config.max_concurrency == 0 {
            return Err(AllmError::Config(
                "max_concurrency must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            gate: Semaphore::new(config.max_concurrency),
            backend,
            config,
            metrics: Arc::new(BatchMetrics::new()),
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Counters accumulated over every batch run on this model
    pub fn metrics(&self) -> SharedMetrics {
        Arc::clone(&self.metrics)
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.backend.count_tokens(text)
    }

    /// Generate raw text for every example
    #[instrument(skip_all, fields(backend = %self.backend.name()))]
    pub async fn generate(
        &self,
        prompt: &str,
        input_data: Option<&[InputData]>,
        system_prompt: Option<&str>,
    ) -> Result<Vec<ResponseData>> {
        let results = self
            .run_batch(PromptTemplate::new(prompt), input_data, system_prompt)
            .await?;
        self.finish_batch(&results);
        Ok(results)
    }

    /// Generate and parse every example into `T`
    ///
    /// Format instructions for `T` are appended to the prompt unless the
    /// backend is configured not to take them.
    #[instrument(skip_all, fields(backend = %self.backend.name()))]
    pub async fn generate_structured<T: OutputSchema>(
        &self,
        prompt: &str,
        input_data: Option<&[InputData]>,
        system_prompt: Option<&str>,
    ) -> Result<Vec<ResponseData<T>>> {
        let mut template = PromptTemplate::new(prompt);
        if self.config.capabilities.injects_format_instructions {
            template = template.with_format_instructions(format_instructions::<T>());
        }

        let raw = self.run_batch(template, input_data, system_prompt).await?;
        let results = ResponseParser::<T>::new().parse_model_output(raw);
        self.finish_batch(&results);
        Ok(results)
    }

    async fn run_batch(
        &self,
        template: PromptTemplate,
        input_data: Option<&[InputData]>,
        system_prompt: Option<&str>,
    ) -> Result<Vec<ResponseData>> {
        validate_system_prompt(system_prompt, self.config.capabilities, self.backend.name())?;
        validate_input(&template, input_data)?;

        let synthetic;
        let examples = match input_data {
            Some(examples) if !examples.is_empty() => examples,
            _ => {
                synthetic = [InputData::synthetic()];
                &synthetic[..]
            }
        };

        info!(
            examples = examples.len(),
            max_concurrency = self.config.max_concurrency,
            "Generating responses..."
        );

        let prompt = ChatPrompt::new(template, system_prompt);
        let tasks = examples
            .iter()
            .map(|example| self.process_example(&prompt, example));
        Ok(join_all(tasks).await)
    }

    fn finish_batch<R>(&self, results: &[ResponseData<R>]) {
        for result in results {
            self.metrics.record_result(result);
        }
        let failed = results.iter().filter(|r| !r.is_success()).count();
        info!(
            total = results.len(),
            failed,
            "Batch complete: {}",
            self.metrics.snapshot().display()
        );
    }

    async fn process_example(&self, prompt: &ChatPrompt, example: &InputData) -> ResponseData {
        let back_reference = (!example.is_empty()).then(|| example.clone());

        let rendered = match prompt.render(&example.input_mappings) {
            Ok(rendered) => rendered,
            Err(e) => return self.fail(example, back_reference, &e, 0),
        };
        let prompt_tokens = self.count_tokens(&rendered.token_text());

        if let Err(e) = self.config.budget.validate(prompt_tokens, &example.id) {
            return self.fail(example, back_reference, &AllmError::from(e), prompt_tokens);
        }

        let outcome = if self.config.long_text.enabled
            && self.config.budget.exceeds_allowed(prompt_tokens)
        {
            LongTextChain::new(self, &self.config.long_text)
                .run(prompt, example)
                .await
        } else {
            self.call(&self.request(rendered))
                .await
                .map_err(AllmError::from)
        };

        match outcome {
            Ok(text) => {
                let generated_tokens = self.count_tokens(&text);
                ResponseData::success(back_reference, text, prompt_tokens, generated_tokens)
            }
            Err(e) => self.fail(example, back_reference, &e, prompt_tokens),
        }
    }

    fn fail(
        &self,
        example: &InputData,
        back_reference: Option<InputData>,
        error: &AllmError,
        prompt_tokens: usize,
    ) -> ResponseData {
        info!("Error for id {} has occurred. Message: {}", example.id, error);
        ResponseData::failure(back_reference, error.to_example_error(), prompt_tokens)
    }

    pub(crate) fn request(&self, rendered: RenderedPrompt) -> ChatRequest {
        ChatRequest {
            system_prompt: rendered.system,
            prompt: rendered.user,
            params: self.config.sampling,
        }
    }

    /// One provider call: gate permit and deadline per attempt, retries around both
    pub(crate) async fn call(&self, request: &ChatRequest) -> std::result::Result<String, LlmError> {
        let this = self;
        self.config
            .retry
            .run(
                move || async move {
                    let _permit = this.gate.acquire().await.map_err(|_| {
                        LlmError::new(ErrorCategory::Unknown, "Concurrency gate closed")
                    })?;
                    let started = Instant::now();
                    let result =
                        with_timeout(this.config.request_timeout, this.backend.complete(request))
                            .await;
                    this.metrics.record_call(started.elapsed().as_millis() as u64);
                    result
                },
                || self.metrics.record_retry(),
            )
            .await
    }
}
