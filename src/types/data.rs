//! Batch input and output records.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::constants::generation::DEFAULT_ID;

/// One example of a batch: placeholder values plus a caller-chosen id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputData {
    /// Placeholder name → substituted text
    pub input_mappings: HashMap<String, String>,
    /// Unique example id
    pub id: String,
}

impl InputData {
    pub fn new(id: impl Into<String>, input_mappings: HashMap<String, String>) -> Self {
        Self {
            input_mappings,
            id: id.into(),
        }
    }

    /// Build from `(key, value)` pairs
    pub fn from_pairs<K, V>(id: impl Into<String>, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(
            id,
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// The synthetic example used when a prompt has no placeholders
    pub fn synthetic() -> Self {
        Self::new(DEFAULT_ID, HashMap::new())
    }

    pub fn input_keys(&self) -> HashSet<&str> {
        self.input_mappings.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.input_mappings.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.input_mappings.get(key).map(String::as_str)
    }
}

/// Result of one example
///
/// `R` is the raw model text (`String`) straight out of generation, or the
/// caller's schema type once the response parser has run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseData<R = String> {
    pub response: Option<R>,
    /// Omitted for the synthetic no-input example
    pub input_data: Option<InputData>,
    pub number_of_prompt_tokens: usize,
    pub number_of_generated_tokens: usize,
    pub error: Option<String>,
}

impl<R> ResponseData<R> {
    pub fn success(
        input_data: Option<InputData>,
        response: R,
        number_of_prompt_tokens: usize,
        number_of_generated_tokens: usize,
    ) -> Self {
        Self {
            response: Some(response),
            input_data,
            number_of_prompt_tokens,
            number_of_generated_tokens,
            error: None,
        }
    }

    pub fn failure(
        input_data: Option<InputData>,
        error: impl Into<String>,
        number_of_prompt_tokens: usize,
    ) -> Self {
        Self {
            response: None,
            input_data,
            number_of_prompt_tokens,
            number_of_generated_tokens: 0,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Id of the example this record belongs to, if it carries one
    pub fn id(&self) -> Option<&str> {
        self.input_data.as_ref().map(|d| d.id.as_str())
    }

    /// Replace the payload, keeping the input reference and token counts
    pub fn map_response<T>(self, response: Option<T>, error: Option<String>) -> ResponseData<T> {
        ResponseData {
            response,
            input_data: self.input_data,
            number_of_prompt_tokens: self.number_of_prompt_tokens,
            number_of_generated_tokens: self.number_of_generated_tokens,
            error,
        }
    }
}
