//! Prompt Templates
//!
//! `{name}` placeholders bound per example, with `{{` / `}}` as escapes for
//! literal braces so callers can embed JSON-shaped instructions.
//!
//! ## Placeholder rule
//!
//! A placeholder is a `{`, one or more characters other than braces, and a `}`,
//! where the opening brace is not preceded by `{` and the closing brace is not
//! followed by `}`. `{{json}}` is therefore never a placeholder.
//!
//! ## Partials
//!
//! Some variables are known before any example is seen (the schema format
//! instructions, for instance). They are bound once with
//! [`PromptTemplate::partial`] and drop out of the required key set.

use std::collections::{BTreeSet, HashMap};

use crate::constants::generation::FORMAT_INSTRUCTIONS_SEPARATOR;
use crate::constants::long_text::OUTPUT_DATA_MODEL_KEY;
use crate::types::{AllmError, Result};

// =============================================================================
// Placeholder Scanning
// =============================================================================

/// One `{name}` occurrence: byte range of the whole token plus the name
struct Placeholder<'a> {
    start: usize,
    end: usize,
    name: &'a str,
}

/// Placeholder starting at byte `start`, if the brace there opens one
fn placeholder_at(text: &str, start: usize) -> Option<Placeholder<'_>> {
    let bytes = text.as_bytes();
    if bytes.get(start) != Some(&b'{') {
        return None;
    }
    if start > 0 && bytes[start - 1] == b'{' {
        return None;
    }

    let name_start = start + 1;
    let close = name_start + bytes[name_start..].iter().position(|&b| b == b'{' || b == b'}')?;
    if close == name_start || bytes[close] != b'}' || bytes.get(close + 1) == Some(&b'}') {
        return None;
    }

    Some(Placeholder {
        start,
        end: close + 1,
        name: &text[name_start..close],
    })
}

/// Names of all placeholders in `text`
pub fn extract_placeholders(text: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find('{') {
        let start = pos + offset;
        match placeholder_at(text, start) {
            Some(placeholder) => {
                names.insert(placeholder.name.to_string());
                pos = placeholder.end;
            }
            None => pos = start + 1,
        }
    }

    names
}

// =============================================================================
// Prompt Template
// =============================================================================

/// A user prompt with `{name}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
    placeholders: BTreeSet<String>,
    partials: HashMap<String, String>,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        let placeholders = extract_placeholders(&template);
        Self {
            template,
            placeholders,
            partials: HashMap::new(),
        }
    }

    /// Bind a variable for every example
    pub fn partial(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.placeholders.remove(&key);
        self.partials.insert(key, value.into());
        self
    }

    /// Append `{output_data_model}` bound to schema format instructions
    pub fn with_format_instructions(self, instructions: impl Into<String>) -> Self {
        let template = format!(
            "{}{}{{{}}}",
            self.template, FORMAT_INSTRUCTIONS_SEPARATOR, OUTPUT_DATA_MODEL_KEY
        );
        let mut extended = Self::new(template);
        extended.partials = self.partials;
        extended.partial(OUTPUT_DATA_MODEL_KEY, instructions)
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Keys every example has to supply
    pub fn placeholders(&self) -> &BTreeSet<String> {
        &self.placeholders
    }

    pub fn render(&self, mappings: &HashMap<String, String>) -> Result<String> {
        self.render_with(|key| mappings.get(key).map(String::as_str))
    }

    /// Render with one key overridden (used to swap in a chunk of text)
    pub fn render_overriding(
        &self,
        mappings: &HashMap<String, String>,
        key: &str,
        value: &str,
    ) -> Result<String> {
        self.render_with(|name| {
            if name == key {
                Some(value)
            } else {
                mappings.get(name).map(String::as_str)
            }
        })
    }

    fn render_with<'v>(&self, lookup: impl Fn(&str) -> Option<&'v str>) -> Result<String> {
        let text = self.template.as_str();
        let bytes = text.as_bytes();
        let mut out = String::with_capacity(text.len());
        let mut pos = 0;
        let mut literal_start = 0;

        while pos < bytes.len() {
            if let Some(placeholder) = placeholder_at(text, pos) {
                let value: &str = match lookup(placeholder.name) {
                    Some(value) => value,
                    None => self
                        .partials
                        .get(placeholder.name)
                        .map(String::as_str)
                        .ok_or_else(|| {
                            AllmError::Template(format!(
                                "Missing value for placeholder '{}'",
                                placeholder.name
                            ))
                        })?,
                };
                out.push_str(&text[literal_start..placeholder.start]);
                out.push_str(value);
                pos = placeholder.end;
                literal_start = pos;
                continue;
            }

            match (bytes[pos], bytes.get(pos + 1)) {
                (b'{', Some(b'{')) | (b'}', Some(b'}')) => {
                    out.push_str(&text[literal_start..=pos]);
                    pos += 2;
                    literal_start = pos;
                }
                _ => pos += 1,
            }
        }
        out.push_str(&text[literal_start..]);

        Ok(out)
    }
}

// =============================================================================
// Chat Prompt
// =============================================================================

/// A rendered system + user message pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub system: Option<String>,
    pub user: String,
}

impl RenderedPrompt {
    /// Text the prompt-token count is measured on
    pub fn token_text(&self) -> String {
        match &self.system {
            Some(system) => format!("{}\n{}", system, self.user),
            None => self.user.clone(),
        }
    }
}

/// User template plus an optional fixed system prompt
#[derive(Debug, Clone)]
pub struct ChatPrompt {
    system: Option<String>,
    user: PromptTemplate,
}

impl ChatPrompt {
    /// An empty system prompt is dropped
    pub fn new(user: PromptTemplate, system: Option<&str>) -> Self {
        Self {
            system: system.filter(|s| !s.is_empty()).map(str::to_string),
            user,
        }
    }

    pub fn system(&self) -> Option<&str> {
        self.system.as_deref()
    }

    pub fn render(&self, mappings: &HashMap<String, String>) -> Result<RenderedPrompt> {
        Ok(RenderedPrompt {
            system: self.system.clone(),
            user: self.user.render(mappings)?,
        })
    }

    pub fn render_overriding(
        &self,
        mappings: &HashMap<String, String>,
        key: &str,
        value: &str,
    ) -> Result<RenderedPrompt> {
        Ok(RenderedPrompt {
            system: self.system.clone(),
            user: self.user.render_overriding(mappings, key, value)?,
        })
    }
}
