//! Pre-flight placeholder checks.

use std::collections::BTreeSet;

use crate::ai::prompt::{PromptTemplate, extract_placeholders};
use crate::ai::provider::BackendCapabilities;
use crate::constants::long_text::OUTPUT_DATA_MODEL_KEY;
use crate::types::{InputData, ValidationError};

/// System prompts are fixed text: no placeholders, and only on backends that take one
pub fn validate_system_prompt(
    system_prompt: Option<&str>,
    capabilities: BackendCapabilities,
    backend: &str,
) -> Result<(), ValidationError> {
    let Some(system_prompt) = system_prompt else {
        return Ok(());
    };

    if !capabilities.supports_system_prompt {
        return Err(ValidationError::SystemPromptUnsupportedByBackend {
            backend: backend.to_string(),
        });
    }

    if !extract_placeholders(system_prompt).is_empty() {
        return Err(ValidationError::SystemPromptHasVariables);
    }

    Ok(())
}

/// Check every example against the prompt's placeholder set
///
/// An empty batch counts as no input data. The first offending example fails
/// the whole call.
pub fn validate_input(
    prompt: &PromptTemplate,
    input_data: Option<&[InputData]>,
) -> Result<(), ValidationError> {
    let placeholders = required_keys(prompt);

    match input_data {
        Some(examples) if !examples.is_empty() => {
            for example in examples {
                validate_example(&placeholders, example)?;
            }
            Ok(())
        }
        _ if !placeholders.is_empty() => Err(ValidationError::MissingInputData),
        _ => Ok(()),
    }
}

/// Placeholders an example has to supply; the format-instruction slot never is
fn required_keys(prompt: &PromptTemplate) -> BTreeSet<&str> {
    prompt
        .placeholders()
        .iter()
        .map(String::as_str)
        .filter(|name| *name != OUTPUT_DATA_MODEL_KEY)
        .collect()
}

fn validate_example(
    placeholders: &BTreeSet<&str>,
    example: &InputData,
) -> Result<(), ValidationError> {
    let keys = example.input_keys();
    let id = || example.id.clone();

    if !keys.is_empty() && placeholders.is_empty() {
        return Err(ValidationError::MissingKeysInPrompt { id: id() });
    }
    if keys.is_empty() && !placeholders.is_empty() {
        return Err(ValidationError::MissingKeysInInputData { id: id() });
    }
    if keys.len() != placeholders.len() {
        return Err(ValidationError::KeyCountMismatch { id: id() });
    }
    if !placeholders.iter().all(|name| keys.contains(name)) {
        return Err(ValidationError::KeySetMismatch { id: id() });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> BackendCapabilities {
        BackendCapabilities::default()
    }

    #[test]
    fn test_system_prompt_without_variables_passes() {
        assert!(validate_system_prompt(Some("You are terse."), full(), "openai").is_ok());
        assert!(validate_system_prompt(None, full(), "openai").is_ok());
        assert!(validate_system_prompt(Some(r#"Answer as {{"a": 1}}"#), full(), "openai").is_ok());
    }

    #[test]
    fn test_system_prompt_with_variables_fails() {
        assert_eq!(
            validate_system_prompt(Some("You are {role}"), full(), "openai"),
            Err(ValidationError::SystemPromptHasVariables)
        );
    }

    #[test]
    fn test_system_prompt_unsupported_by_backend() {
        let caps = BackendCapabilities {
            supports_system_prompt: false,
            ..full()
        };
        let err = validate_system_prompt(Some(""), caps, "azure_mistral").unwrap_err();
        assert_eq!(
            err.to_string(),
            "azure_mistral models don't support the system_prompt parameter."
        );
        assert!(validate_system_prompt(None, caps, "azure_mistral").is_ok());
    }

    #[test]
    fn test_placeholders_without_input_data() {
        let prompt = PromptTemplate::new("Summarize {text}");
        assert_eq!(
            validate_input(&prompt, None),
            Err(ValidationError::MissingInputData)
        );
        assert_eq!(
            validate_input(&prompt, Some(&[][..])),
            Err(ValidationError::MissingInputData)
        );
        assert!(validate_input(&PromptTemplate::new("Say hi"), None).is_ok());
    }

    #[test]
    fn test_escaped_prompt_accepts_empty_example() {
        let prompt = PromptTemplate::new(r#"Return {{"json": true}}"#);
        let examples = [InputData::from_pairs("1", Vec::<(String, String)>::new())];
        assert!(validate_input(&prompt, Some(&examples[..])).is_ok());
    }

    #[test]
    fn test_example_mismatches() {
        let none = PromptTemplate::new("static");
        let one = PromptTemplate::new("{text}");
        let two = PromptTemplate::new("{text} {title}");

        let with_text = [InputData::from_pairs("a", [("text", "x")])];
        let empty = [InputData::from_pairs("b", Vec::<(String, String)>::new())];
        let other_key = [InputData::from_pairs("c", [("body", "x")])];

        assert_eq!(
            validate_input(&none, Some(&with_text[..])),
            Err(ValidationError::MissingKeysInPrompt { id: "a".into() })
        );
        assert_eq!(
            validate_input(&one, Some(&empty[..])),
            Err(ValidationError::MissingKeysInInputData { id: "b".into() })
        );
        assert_eq!(
            validate_input(&two, Some(&with_text[..])),
            Err(ValidationError::KeyCountMismatch { id: "a".into() })
        );
        assert_eq!(
            validate_input(&one, Some(&other_key[..])),
            Err(ValidationError::KeySetMismatch { id: "c".into() })
        );
    }

    #[test]
    fn test_first_offending_example_fails_batch() {
        let prompt = PromptTemplate::new("{text}");
        let examples = [
            InputData::from_pairs("ok", [("text", "x")]),
            InputData::from_pairs("bad", [("body", "x")]),
            InputData::from_pairs("bad2", [("other", "x")]),
        ];
        assert_eq!(
            validate_input(&prompt, Some(&examples[..])),
            Err(ValidationError::KeySetMismatch { id: "bad".into() })
        );
    }

    #[test]
    fn test_format_instructions_key_is_not_required() {
        let prompt = PromptTemplate::new("{text}").with_format_instructions("{}");
        let examples = [InputData::from_pairs("a", [("text", "x")])];
        assert!(validate_input(&prompt, Some(&examples[..])).is_ok());
    }

    #[test]
    fn test_handwritten_format_instructions_slot_is_not_required() {
        let prompt = PromptTemplate::new("Keywords for {text}\n{output_data_model}");
        let examples = [InputData::from_pairs("a", [("text", "x")])];
        assert!(validate_input(&prompt, Some(&examples[..])).is_ok());

        let static_prompt = PromptTemplate::new("Answer as {output_data_model}");
        assert!(validate_input(&static_prompt, None).is_ok());
    }
}
