//! Response record model and validation
//!
//! A [`ResponseRecord`] is one submitted questionnaire. Construction from raw
//! input always goes through schema validation, so the form handler, the
//! import job and any other caller get the same guarantees.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::schema::{FieldKind, FieldSpec, SchemaVersion};
use crate::time;

/// Keys carried next to the answers that are not questions
const METADATA_KEYS: &[&str] = &["id", "schema_version", "timestamp"];

/// Answer to a single question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    /// Single-choice option or free text
    Text(String),
    /// Multi-choice selections in the order chosen
    List(Vec<String>),
    /// Unanswered
    Null,
}

impl AnswerValue {
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerValue::Text(s) => s.trim().is_empty(),
            AnswerValue::List(items) => items.is_empty(),
            AnswerValue::Null => true,
        }
    }

    /// Lenient conversion from stored JSON; `None` when the shape is unusable
    pub fn from_json(value: &Value) -> Option<AnswerValue> {
        match value {
            Value::Null => Some(AnswerValue::Null),
            Value::String(s) => Some(AnswerValue::Text(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .map(AnswerValue::List),
            _ => None,
        }
    }
}

/// Answers keyed by question, kept in schema order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Answers(Vec<(String, AnswerValue)>);

impl Answers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&AnswerValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Insert or replace, keeping the original position of an existing key
    pub fn insert(&mut self, key: impl Into<String>, value: AnswerValue) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AnswerValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Unvalidated view of a JSON object; values of unusable shape are dropped
    pub fn from_json_object(object: &Map<String, Value>) -> Self {
        object
            .iter()
            .filter(|(key, _)| !METADATA_KEYS.contains(&key.as_str()))
            .filter_map(|(key, value)| AnswerValue::from_json(value).map(|v| (key.clone(), v)))
            .collect()
    }
}

impl FromIterator<(String, AnswerValue)> for Answers {
    fn from_iter<I: IntoIterator<Item = (String, AnswerValue)>>(iter: I) -> Self {
        let mut answers = Answers::new();
        for (key, value) in iter {
            answers.insert(key, value);
        }
        answers
    }
}

impl Serialize for Answers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Reasons a submission is refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Submission must be a JSON object")]
    NotAnObject,

    #[error("Missing answer for required question '{field}'")]
    MissingRequired { field: String },

    #[error("Invalid option '{value}' for question '{field}'")]
    UnknownOption { field: String, value: String },

    #[error("Option '{value}' selected more than once for question '{field}'")]
    DuplicateSelection { field: String, value: String },

    #[error("Question '{field}' allows at most {max} selections, got {got}")]
    TooManySelections {
        field: String,
        max: usize,
        got: usize,
    },

    #[error("Question '{field}' expects {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },
}

/// Reasons a stored document cannot become a record
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Document is not a JSON object")]
    NotAnObject,

    #[error("Unknown schema version '{0}'")]
    UnknownVersion(String),

    #[error("Incomplete record: {0}")]
    Invalid(#[from] ValidationError),
}

/// One submitted questionnaire
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseRecord {
    /// Relational surrogate key; `None` until inserted
    pub id: Option<i64>,
    pub schema_version: SchemaVersion,
    /// Submission time (UTC), immutable
    pub timestamp: DateTime<Utc>,
    pub answers: Answers,
}

impl ResponseRecord {
    /// Validate raw form input and stamp it with the current time
    pub fn new(version: SchemaVersion, input: &Value) -> Result<Self, ValidationError> {
        Self::with_timestamp(version, input, time::now())
    }

    pub fn with_timestamp(
        version: SchemaVersion,
        input: &Value,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let object = input.as_object().ok_or(ValidationError::NotAnObject)?;
        let schema = version.schema();

        for key in object.keys() {
            if schema.field(key).is_none() && !METADATA_KEYS.contains(&key.as_str()) {
                debug!(field = %key, version = %version, "Dropping undeclared answer key");
            }
        }

        let mut answers = Answers::new();
        for field in schema.fields {
            let value = validate_field(field, object.get(field.key))?;
            answers.insert(field.key, value);
        }

        Ok(Self {
            id: None,
            schema_version: version,
            timestamp,
            answers,
        })
    }

    /// Rebuild a record read back from storage, without re-validation
    pub fn from_stored(
        id: Option<i64>,
        schema_version: SchemaVersion,
        timestamp: DateTime<Utc>,
        answers: Answers,
    ) -> Self {
        Self {
            id,
            schema_version,
            timestamp,
            answers,
        }
    }

    /// Decode and validate a document store object.
    ///
    /// Documents written before versions were tagged have their edition
    /// inferred from their keys, and their timestamp taken from the key.
    pub fn from_document(key: &str, raw: &[u8]) -> Result<Self, DocumentError> {
        let value: Value = serde_json::from_slice(raw)?;
        let object = value.as_object().ok_or(DocumentError::NotAnObject)?;

        let version = match object.get("schema_version").and_then(Value::as_str) {
            Some(id) => {
                SchemaVersion::parse(id).ok_or_else(|| DocumentError::UnknownVersion(id.to_string()))?
            }
            None => SchemaVersion::infer(object.keys().map(String::as_str)),
        };

        let timestamp = object
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(time::parse_stored)
            .or_else(|| time::parse_key_timestamp(key))
            .unwrap_or_else(time::now);

        Ok(Self::with_timestamp(version, &value, timestamp)?)
    }

    pub fn get(&self, key: &str) -> Option<&AnswerValue> {
        self.answers.get(key)
    }

    /// Document store payload: version tag, timestamp, then answers in schema order
    pub fn to_document(&self) -> Value {
        let mut object = Map::new();
        object.insert(
            "schema_version".to_string(),
            Value::String(self.schema_version.id().to_string()),
        );
        object.insert(
            "timestamp".to_string(),
            Value::String(time::to_storage(&self.timestamp)),
        );
        for (key, answer) in self.answers.iter() {
            let value = match answer {
                AnswerValue::Text(s) => Value::String(s.clone()),
                AnswerValue::List(items) => {
                    Value::Array(items.iter().cloned().map(Value::String).collect())
                }
                AnswerValue::Null => Value::Null,
            };
            object.insert(key.to_string(), value);
        }
        Value::Object(object)
    }

    /// Pretty-printed UTF-8 JSON for the document store
    pub fn to_document_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_document())
    }
}

fn validate_field(field: &FieldSpec, raw: Option<&Value>) -> Result<AnswerValue, ValidationError> {
    let missing = || {
        if field.required {
            Err(ValidationError::MissingRequired {
                field: field.key.to_string(),
            })
        } else {
            Ok(AnswerValue::Null)
        }
    };

    let raw = match raw {
        None | Some(Value::Null) => return missing(),
        Some(Value::String(s)) if s.trim().is_empty() => return missing(),
        Some(value) => value,
    };

    match field.kind {
        FieldKind::YesNo | FieldKind::SingleChoice { .. } => {
            let value = raw.as_str().ok_or_else(|| ValidationError::WrongType {
                field: field.key.to_string(),
                expected: "a single option",
            })?;
            check_option(field, value)?;
            Ok(AnswerValue::Text(value.to_string()))
        }
        FieldKind::MultiChoice { max_selections, .. } => {
            let selections: Vec<String> = match raw {
                Value::String(s) => vec![s.clone()],
                Value::Array(items) => items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| ValidationError::WrongType {
                        field: field.key.to_string(),
                        expected: "a list of options",
                    })?,
                _ => {
                    return Err(ValidationError::WrongType {
                        field: field.key.to_string(),
                        expected: "a list of options",
                    })
                }
            };

            if selections.is_empty() && field.required {
                return missing();
            }
            if selections.len() > max_selections {
                return Err(ValidationError::TooManySelections {
                    field: field.key.to_string(),
                    max: max_selections,
                    got: selections.len(),
                });
            }
            for (i, selection) in selections.iter().enumerate() {
                check_option(field, selection)?;
                if selections[..i].contains(selection) {
                    return Err(ValidationError::DuplicateSelection {
                        field: field.key.to_string(),
                        value: selection.clone(),
                    });
                }
            }
            Ok(AnswerValue::List(selections))
        }
        FieldKind::FreeText => {
            let text = raw.as_str().ok_or_else(|| ValidationError::WrongType {
                field: field.key.to_string(),
                expected: "text",
            })?;
            Ok(AnswerValue::Text(text.to_string()))
        }
    }
}

fn check_option(field: &FieldSpec, value: &str) -> Result<(), ValidationError> {
    if field.kind.options().contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::UnknownOption {
            field: field.key.to_string(),
            value: value.to_string(),
        })
    }
}
