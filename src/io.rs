//! Input data and credential loaders.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use secrecy::SecretString;
use serde_json::Value;
use tracing::debug;

use crate::types::{AllmError, InputData, Result};

/// Load examples from a JSON Lines file
///
/// Every non-blank line is an object with an `id` (string or number); all
/// other scalar fields become the example's input mappings. `limit` keeps the
/// first N examples.
pub fn load_input_data(path: &Path, limit: Option<usize>) -> Result<Vec<InputData>> {
    let content = fs::read_to_string(path)?;
    let error = |line: usize, message: String| AllmError::InputData {
        path: path.display().to_string(),
        message: format!("line {}: {}", line, message),
    };

    let mut examples = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if limit.is_some_and(|limit| examples.len() >= limit) {
            break;
        }
        let line_number = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        let value: Value =
            serde_json::from_str(line).map_err(|e| error(line_number, e.to_string()))?;
        let Value::Object(mut fields) = value else {
            return Err(error(line_number, "expected a JSON object".to_string()));
        };

        let id = match fields.remove("id") {
            Some(Value::String(id)) => id,
            Some(Value::Number(id)) => id.to_string(),
            Some(_) => return Err(error(line_number, "`id` must be a string or number".to_string())),
            None => return Err(error(line_number, "missing `id`".to_string())),
        };

        let mut mappings = HashMap::with_capacity(fields.len());
        for (key, value) in fields {
            let text = match value {
                Value::String(text) => text,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => continue,
                _ => {
                    return Err(error(
                        line_number,
                        format!("field `{}` must be a scalar", key),
                    ));
                }
            };
            mappings.insert(key, text);
        }

        examples.push(InputData::new(id, mappings));
    }

    debug!(count = examples.len(), path = %path.display(), "Loaded input data");
    Ok(examples)
}

/// Read a credential from the first line of a file
pub fn load_credentials(path: &Path) -> Result<SecretString> {
    let content = fs::read_to_string(path)?;
    let key = content.lines().next().unwrap_or_default().trim();
    if key.is_empty() {
        return Err(AllmError::Config(format!(
            "Credentials file is empty: {}",
            path.display()
        )));
    }
    Ok(SecretString::from(key.to_string()))
}
