//! Input document loading.
//!
//! The document is either a JSON array of question objects or an object with
//! a `questions` array. Elements are decoded one at a time so a single bad
//! record is reported instead of failing the whole document.

use std::path::Path;

use crate::error::InputError;
use crate::models::RawQuestionRecord;

/// One element of the input array.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEntry {
    Parsed(RawQuestionRecord),
    /// Element could not be decoded as a question object.
    Malformed { id: Option<String>, reason: String },
}

pub fn load_input(path: &Path) -> Result<Vec<RawEntry>, InputError> {
    if !path.exists() {
        return Err(InputError::Missing(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path).map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_input(&content)
}

pub fn parse_input(content: &str) -> Result<Vec<RawEntry>, InputError> {
    let document: serde_json::Value = serde_json::from_str(content)?;

    let items = match document {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("questions") {
            Some(serde_json::Value::Array(items)) => items,
            Some(_) => {
                return Err(InputError::Shape(
                    "top-level key 'questions' must contain a list".to_string(),
                ))
            }
            None => {
                return Err(InputError::Shape(
                    "expected a list of questions or an object with a 'questions' list"
                        .to_string(),
                ))
            }
        },
        _ => {
            return Err(InputError::Shape(
                "expected a list of questions or an object with a 'questions' list".to_string(),
            ))
        }
    };

    Ok(items.into_iter().map(decode_entry).collect())
}

fn decode_entry(value: serde_json::Value) -> RawEntry {
    if !value.is_object() {
        return RawEntry::Malformed {
            id: None,
            reason: "record is not a JSON object".to_string(),
        };
    }

    // Keep the id around for the drop report even if the rest is broken.
    let id = value.get("id").and_then(|v| match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    });

    match serde_json::from_value::<RawQuestionRecord>(value) {
        Ok(record) if record.text.is_none() => RawEntry::Malformed {
            id,
            reason: "missing required field 'text'".to_string(),
        },
        Ok(record) => RawEntry::Parsed(record),
        Err(e) => RawEntry::Malformed {
            id,
            reason: format!("malformed record: {}", e),
        },
    }
}
