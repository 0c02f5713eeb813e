//! Response Parsing
//!
//! Models wrap JSON in prose, code fences or escaped strings. The parser takes
//! the first `{...}` span (shortest match, so nested objects are cut at the
//! first `}`), strips escaped newlines and stray backslashes, then
//! deserializes into the target type. Text without any brace span is parsed
//! as-is.

use std::marker::PhantomData;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::types::ResponseData;

static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*?\}").expect("JSON object pattern is valid"));

/// The text the parser will try to deserialize
pub fn extract_json_candidate(raw: &str) -> String {
    match JSON_OBJECT.find(raw) {
        Some(found) => clean_extracted_json(found.as_str()),
        None => raw.to_string(),
    }
}

fn clean_extracted_json(extracted: &str) -> String {
    extracted.replace("\\n", "").replace('\\', "")
}

/// Deserializes model output into `T`
#[derive(Debug, Clone, Copy)]
pub struct ResponseParser<T> {
    _target: PhantomData<fn() -> T>,
}

impl<T> Default for ResponseParser<T> {
    fn default() -> Self {
        Self {
            _target: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> ResponseParser<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one raw response; the error string embeds the offending text
    pub fn parse(&self, raw: &str) -> Result<T, String> {
        let candidate = extract_json_candidate(raw);
        serde_json::from_str(&candidate).map_err(|e| {
            format!(
                "A parsing error has occurred for the model response: {}\nThe exception message: {}",
                candidate, e
            )
        })
    }

    /// Parse every error-free record; records that already failed pass through
    pub fn parse_model_output(&self, responses: Vec<ResponseData>) -> Vec<ResponseData<T>> {
        responses
            .into_iter()
            .map(|record| {
                if record.error.is_some() {
                    let error = record.error.clone();
                    return record.map_response(None, error);
                }

                let raw = record.response.clone().unwrap_or_default();
                match self.parse(&raw) {
                    Ok(parsed) => record.map_response(Some(parsed), None),
                    Err(message) => {
                        debug!(id = record.id(), "Response parsing failed");
                        record.map_response(None, Some(message))
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InputData;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Keywords {
        keywords: Vec<String>,
    }

    #[test]
    fn test_extracts_embedded_json() {
        let parser = ResponseParser::<Keywords>::new();
        let bare = r#"{"keywords": ["rust", "async"]}"#;
        let wrapped = format!("Sure, here it is: {} thanks", bare);

        assert_eq!(parser.parse(&wrapped), parser.parse(bare));
        assert_eq!(
            parser.parse(&wrapped).unwrap().keywords,
            vec!["rust".to_string(), "async".to_string()]
        );
    }

    #[test]
    fn test_cleans_escaped_json() {
        let raw = r#"{\n\"keywords\": [\"a\"]\n}"#;
        assert_eq!(extract_json_candidate(raw), r#"{"keywords": ["a"]}"#);
        let parsed = ResponseParser::<Keywords>::new().parse(raw).unwrap();
        assert_eq!(parsed.keywords, vec!["a".to_string()]);
    }

    #[test]
    fn test_shortest_span_is_taken() {
        assert_eq!(extract_json_candidate("{a} and {b}"), "{a}");
        assert_eq!(extract_json_candidate(r#"{"x": {"y": 1}}"#), r#"{"x": {"y": 1}"#);
    }

    #[test]
    fn test_no_braces_uses_raw_text() {
        assert_eq!(extract_json_candidate("plain text"), "plain text");
        let err = ResponseParser::<Keywords>::new().parse("plain text").unwrap_err();
        assert!(err.contains("plain text"));
        assert!(err.contains("The exception message"));
    }

    #[test]
    fn test_parse_model_output_skips_failed_records() {
        let parser = ResponseParser::<Keywords>::new();
        let input = InputData::from_pairs("1", [("text", "x")]);
        let responses = vec![
            ResponseData::success(Some(input.clone()), r#"{"keywords": []}"#.to_string(), 10, 4),
            ResponseData::failure(Some(input.clone()), "Timeout Error: slow", 10),
            ResponseData::success(Some(input), "not json".to_string(), 10, 2),
        ];

        let parsed = parser.parse_model_output(responses);
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].response, Some(Keywords { keywords: vec![] }));
        assert_eq!(parsed[1].error.as_deref(), Some("Timeout Error: slow"));
        assert!(parsed[2].response.is_none());
        assert!(parsed[2].error.as_deref().unwrap().contains("not json"));
        assert_eq!(parsed[2].number_of_generated_tokens, 2);
    }
}
