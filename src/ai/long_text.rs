//! Long-Text Map-Reduce Chain
//!
//! Handles a single example whose prompt exceeds the allowed budget:
//!
//! ```text
//! text ─split─▶ [chunk₁ … chunkₙ] ─map (concurrent)─▶ [out₁ … outₙ] ─reduce─▶ answer
//! ```
//!
//! Map calls go through the model's concurrency gate and retry policy like any
//! other call. Reduction either concatenates the per-chunk outputs in chunk
//! order or asks the model to merge them with the aggregation prompt.
//!
//! A chunk whose call fails, or whose output does not parse, still takes part
//! in the reduction as its raw text.

use std::collections::HashMap;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ai::chunker::TextChunker;
use crate::ai::model::LlmModel;
use crate::ai::prompt::{ChatPrompt, PromptTemplate};
use crate::ai::schema::{
    AggregateOutput, ChunkOutput, KeywordsOutput, SummaryOutput, format_instructions,
};
use crate::ai::validation::ResponseParser;
use crate::constants::long_text as defaults;
use crate::types::{AllmError, InputData, Result};

/// What the per-chunk outputs contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LongTextTask {
    #[default]
    Summary,
    Keywords,
}

/// How per-chunk outputs are merged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStrategy {
    #[default]
    SimpleConcatenation,
    ReduceByLlmPrompting,
}

/// Long-text handling for one model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LongTextSettings {
    pub enabled: bool,
    pub task: LongTextTask,
    pub aggregation: AggregationStrategy,
    /// Words shared between neighbouring chunks
    pub overlap_size: usize,
    /// Placeholder holding the long text
    pub text_key: String,
}

impl Default for LongTextSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            task: LongTextTask::default(),
            aggregation: AggregationStrategy::default(),
            overlap_size: defaults::OVERLAP_SIZE,
            text_key: defaults::TEXT_KEY.to_string(),
        }
    }
}

pub(crate) struct LongTextChain<'a> {
    model: &'a LlmModel,
    settings: &'a LongTextSettings,
}

impl<'a> LongTextChain<'a> {
    pub(crate) fn new(model: &'a LlmModel, settings: &'a LongTextSettings) -> Self {
        Self { model, settings }
    }

    fn chunker(&self) -> TextChunker {
        TextChunker::new(self.model.config().budget.max_allowed_tokens())
            .with_overlap(self.settings.overlap_size)
    }

    /// Map every chunk of the example's long text, then reduce
    pub(crate) async fn run(&self, prompt: &ChatPrompt, example: &InputData) -> Result<String> {
        let key = self.settings.text_key.as_str();
        let text = example.get(key).ok_or_else(|| {
            AllmError::Template(format!(
                "Long-text processing needs the `{}` key in example {}",
                key, example.id
            ))
        })?;

        let mappings = &example.input_mappings;
        let measure = |chunk: &str| {
            prompt
                .render_overriding(mappings, key, chunk)
                .map(|rendered| self.model.count_tokens(&rendered.token_text()))
                .unwrap_or(usize::MAX)
        };
        let chunks = self.chunker().split(text, measure)?;
        info!(id = %example.id, chunks = chunks.len(), "Processing long text in chunks");

        let outputs = self.map_step(prompt, mappings, &chunks).await?;
        self.reduce_step(outputs).await
    }

    async fn map_step(
        &self,
        prompt: &ChatPrompt,
        mappings: &HashMap<String, String>,
        chunks: &[String],
    ) -> Result<Vec<ChunkOutput>> {
        let key = self.settings.text_key.as_str();
        let requests = chunks
            .iter()
            .map(|chunk| {
                prompt
                    .render_overriding(mappings, key, chunk)
                    .map(|rendered| self.model.request(rendered))
            })
            .collect::<Result<Vec<_>>>()?;

        let responses = join_all(requests.iter().map(|request| self.model.call(request))).await;

        Ok(responses
            .into_iter()
            .map(|response| match response {
                Ok(text) => self.parse_chunk(&text),
                Err(e) => {
                    debug!(error = %e, "Chunk call failed, folding error text into reduction");
                    ChunkOutput::Raw(e.to_example_error())
                }
            })
            .collect())
    }

    fn parse_chunk(&self, text: &str) -> ChunkOutput {
        let parsed = match self.settings.task {
            LongTextTask::Summary => ResponseParser::<SummaryOutput>::new()
                .parse(text)
                .map(ChunkOutput::Summary),
            LongTextTask::Keywords => ResponseParser::<KeywordsOutput>::new()
                .parse(text)
                .map(ChunkOutput::Keywords),
        };
        parsed.unwrap_or_else(|_| ChunkOutput::Raw(text.to_string()))
    }

    async fn reduce_step(&self, outputs: Vec<ChunkOutput>) -> Result<String> {
        match self.settings.aggregation {
            AggregationStrategy::SimpleConcatenation => self.concatenate(outputs),
            AggregationStrategy::ReduceByLlmPrompting => self.reduce_by_llm(outputs).await,
        }
    }

    fn concatenate(&self, outputs: Vec<ChunkOutput>) -> Result<String> {
        let merged = match self.settings.task {
            LongTextTask::Summary => {
                let summary = outputs
                    .into_iter()
                    .map(|output| match output {
                        ChunkOutput::Summary(s) => s.summary,
                        ChunkOutput::Keywords(k) => k.keywords.join(" "),
                        ChunkOutput::Raw(text) => text,
                    })
                    .collect::<Vec<_>>()
                    .join(defaults::SUMMARY_SEPARATOR);
                serde_json::to_string(&SummaryOutput { summary })?
            }
            LongTextTask::Keywords => {
                let keywords = outputs
                    .into_iter()
                    .flat_map(|output| match output {
                        ChunkOutput::Keywords(k) => k.keywords,
                        ChunkOutput::Summary(s) => vec![s.summary],
                        ChunkOutput::Raw(text) => vec![text],
                    })
                    .collect();
                serde_json::to_string(&KeywordsOutput { keywords })?
            }
        };
        Ok(merged)
    }

    async fn reduce_by_llm(&self, outputs: Vec<ChunkOutput>) -> Result<String> {
        let instructions = match self.settings.task {
            LongTextTask::Summary => format_instructions::<SummaryOutput>(),
            LongTextTask::Keywords => format_instructions::<KeywordsOutput>(),
        };
        let template = PromptTemplate::new(defaults::AGGREGATION_PROMPT)
            .partial(defaults::OUTPUT_DATA_MODEL_KEY, instructions);
        let reduce_prompt = ChatPrompt::new(template, None);

        let aggregate = serde_json::to_string(&AggregateOutput { summaries: outputs })?;
        let empty = HashMap::new();
        let rendered = reduce_prompt.render_overriding(&empty, defaults::TEXT_KEY, &aggregate)?;
        debug!(tokens = self.model.count_tokens(&rendered.user), "Running reduction call");
        Ok(self.model.call(&self.model.request(rendered)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::budget::TokenBudget;
    use crate::ai::model::ModelConfig;
    use crate::ai::provider::mock::MockBackend;
    use crate::ai::provider::SamplingParams;
    use crate::ai::retry::RetryPolicy;
    use crate::types::{ErrorCategory, LlmError};
    use std::sync::Arc;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    /// 400-token window, 50 for output: prompts above 300 words take the chain
    fn model(backend: Arc<MockBackend>, settings: LongTextSettings) -> LlmModel {
        let config = ModelConfig::new(
            TokenBudget::new(400, 50).unwrap(),
            SamplingParams {
                temperature: 0.0,
                top_p: None,
                top_k: None,
                max_output_tokens: 50,
            },
        )
        .with_retry(RetryPolicy::no_delay(1))
        .with_long_text(settings);
        LlmModel::new(backend, config).unwrap()
    }

    fn settings(task: LongTextTask, aggregation: AggregationStrategy) -> LongTextSettings {
        LongTextSettings {
            enabled: true,
            task,
            aggregation,
            ..LongTextSettings::default()
        }
    }

    fn long_example() -> Vec<InputData> {
        vec![InputData::from_pairs("doc", [("text", words(350))])]
    }

    #[test]
    fn test_settings_serde_names() {
        let settings: LongTextSettings = serde_json::from_str(
            r#"{"enabled": true, "task": "keywords", "aggregation": "reduce_by_llm_prompting"}"#,
        )
        .unwrap();
        assert_eq!(settings.task, LongTextTask::Keywords);
        assert_eq!(settings.aggregation, AggregationStrategy::ReduceByLlmPrompting);
        assert_eq!(settings.overlap_size, 50);
        assert_eq!(settings.text_key, "text");
    }

    #[tokio::test]
    async fn test_summary_concatenation_in_chunk_order() {
        let backend = Arc::new(MockBackend::new(|req, _| {
            let first = req.prompt.split_whitespace().nth(1).unwrap_or_default().to_string();
            Ok(format!(r#"{{"summary": "{}"}}"#, first))
        }));
        let model = model(
            backend.clone(),
            settings(LongTextTask::Summary, AggregationStrategy::SimpleConcatenation),
        );

        let results = model
            .generate("Summarize: {text}", Some(long_example().as_slice()), None)
            .await
            .unwrap();

        assert_eq!(backend.calls(), 2);
        let response = results[0].response.as_deref().unwrap();
        let merged: SummaryOutput = serde_json::from_str(response).unwrap();
        assert_eq!(merged.summary, "w0 w150");
    }

    #[tokio::test]
    async fn test_keywords_concatenation_flattens() {
        let backend = Arc::new(MockBackend::fixed(r#"{"keywords": ["a", "b"]}"#));
        let model = model(
            backend,
            settings(LongTextTask::Keywords, AggregationStrategy::SimpleConcatenation),
        );

        let results = model
            .generate("Keywords: {text}", Some(long_example().as_slice()), None)
            .await
            .unwrap();

        let merged: KeywordsOutput =
            serde_json::from_str(results[0].response.as_deref().unwrap()).unwrap();
        assert_eq!(merged.keywords, vec!["a", "b", "a", "b"]);
    }

    #[tokio::test]
    async fn test_failed_chunk_is_folded_into_reduction() {
        let backend = Arc::new(MockBackend::new(|_, call| {
            if call == 0 {
                Err(LlmError::new(ErrorCategory::BadRequest, "bad chunk"))
            } else {
                Ok(r#"{"summary": "ok"}"#.to_string())
            }
        }));
        let model = model(
            backend,
            settings(LongTextTask::Summary, AggregationStrategy::SimpleConcatenation),
        );

        let results = model
            .generate("Summarize: {text}", Some(long_example().as_slice()), None)
            .await
            .unwrap();

        assert!(results[0].is_success());
        let merged: SummaryOutput =
            serde_json::from_str(results[0].response.as_deref().unwrap()).unwrap();
        assert!(merged.summary.contains("bad chunk"));
        assert!(merged.summary.ends_with("ok"));
    }

    #[tokio::test]
    async fn test_reduce_by_llm_sends_aggregate() {
        let backend = Arc::new(MockBackend::new(|req, _| {
            if req.prompt.starts_with("You're an AI agent") {
                Ok(r#"{"summary": "merged"}"#.to_string())
            } else {
                Ok(r#"{"summary": "part"}"#.to_string())
            }
        }));
        let model = model(
            backend.clone(),
            settings(LongTextTask::Summary, AggregationStrategy::ReduceByLlmPrompting),
        );

        let results = model
            .generate("Summarize: {text}", Some(long_example().as_slice()), None)
            .await
            .unwrap();

        assert_eq!(backend.calls(), 3);
        assert_eq!(results[0].response.as_deref(), Some(r#"{"summary": "merged"}"#));

        let reduce = backend
            .requests()
            .into_iter()
            .find(|r| r.prompt.starts_with("You're an AI agent"))
            .unwrap();
        assert!(reduce.prompt.contains(r#"{"summaries":[{"summary":"part"},{"summary":"part"}]}"#));
        assert!(reduce.prompt.contains("The output should be formatted as a JSON instance"));
        assert!(reduce.system_prompt.is_none());
    }

    #[tokio::test]
    async fn test_disabled_long_text_calls_directly() {
        let backend = Arc::new(MockBackend::fixed("direct"));
        let model = model(backend.clone(), LongTextSettings::default());

        let results = model
            .generate("Summarize: {text}", Some(long_example().as_slice()), None)
            .await
            .unwrap();

        assert_eq!(backend.calls(), 1);
        assert_eq!(results[0].response.as_deref(), Some("direct"));
    }

    #[tokio::test]
    async fn test_missing_text_key_fails_example() {
        let backend = Arc::new(MockBackend::fixed("unused"));
        let model = model(
            backend.clone(),
            settings(LongTextTask::Summary, AggregationStrategy::SimpleConcatenation),
        );
        let examples = vec![InputData::from_pairs("doc", [("body", words(350))])];

        let results = model
            .generate("Summarize: {body}", Some(examples.as_slice()), None)
            .await
            .unwrap();

        assert_eq!(backend.calls(), 0);
        assert!(results[0].error.as_deref().unwrap().contains("`text` key"));
    }
}
