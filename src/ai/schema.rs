//! Output Schemas
//!
//! Structured generation targets. Any `Serialize + DeserializeOwned +
//! JsonSchema` type qualifies; its JSON schema is rendered into the format
//! instructions appended to the prompt.
//!
//! ## Built-in schemas
//! - [`SummaryOutput`]: `{"summary": "..."}`
//! - [`KeywordsOutput`]: `{"keywords": ["..."]}`
//! - [`AggregateOutput`]: per-chunk outputs fed to the long-text reduce prompt

use schemars::{JsonSchema, schema_for};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A type the model can be asked to produce
pub trait OutputSchema: DeserializeOwned + Serialize + JsonSchema + Send + 'static {}

impl<T> OutputSchema for T where T: DeserializeOwned + Serialize + JsonSchema + Send + 'static {}

/// Prompt text telling the model to answer with a JSON instance of `T`
pub fn format_instructions<T: JsonSchema>() -> String {
    let mut schema = serde_json::to_value(schema_for!(T)).unwrap_or_default();
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
    }

    format!(
        "The output should be formatted as a JSON instance that conforms to the JSON schema below.\n\n\
         As an example, for the schema {{\"properties\": {{\"foo\": {{\"description\": \"a list of strings\", \
         \"type\": \"array\", \"items\": {{\"type\": \"string\"}}}}}}, \"required\": [\"foo\"]}}\n\
         the object {{\"foo\": [\"bar\", \"baz\"]}} is a well-formatted instance of the schema. \
         The object {{\"properties\": {{\"foo\": [\"bar\", \"baz\"]}}}} is not well-formatted.\n\n\
         Here is the output schema:\n```\n{}\n```",
        schema
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SummaryOutput {
    /// Summary of a product description
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct KeywordsOutput {
    /// List of keywords
    pub keywords: Vec<String>,
}

/// One chunk's contribution to a reduction
///
/// Chunks whose output did not parse (or whose call failed) are carried as raw
/// text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ChunkOutput {
    Summary(SummaryOutput),
    Keywords(KeywordsOutput),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AggregateOutput {
    /// List of aggregated outputs
    pub summaries: Vec<ChunkOutput>,
}
