//! Core data models.
//!
//! Records flow forward through the pipeline: raw input →
//! [`NormalizedQuestionRecord`] → corpus text → remote corpus →
//! [`RawHit`] → [`QuestionHit`].

use serde::{Deserialize, Deserializer, Serialize};

/// One teacher-entered question as it appears in the input document.
///
/// Every field is optional at this stage; the normalizer decides what is
/// recoverable. `question` is accepted as an alias of `text` and `matches`
/// carries the upstream concept matcher output.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RawQuestionRecord {
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub main_concept: Option<String>,
    #[serde(default)]
    pub concepts: Option<Vec<String>>,
    #[serde(default, alias = "question")]
    pub text: Option<String>,
    #[serde(default)]
    pub matches: Vec<ConceptMatch>,
}

/// A concept suggested by the upstream matcher, best-first.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ConceptMatch {
    #[serde(default)]
    pub concept: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

/// Accepts `"q_1"`, `7` or `null` for the identifier.
fn deserialize_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdValue {
        Text(String),
        Number(serde_json::Number),
    }

    let value: Option<IdValue> = Option::deserialize(deserializer)?;
    Ok(value.map(|v| match v {
        IdValue::Text(s) => s,
        IdValue::Number(n) => n.to_string(),
    }))
}

/// A cleaned record, safe to render as a tagged block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedQuestionRecord {
    pub id: String,
    pub text: String,
    pub main_concept: String,
    pub concepts: Vec<String>,
}

impl From<NormalizedQuestionRecord> for RawQuestionRecord {
    fn from(record: NormalizedQuestionRecord) -> Self {
        Self {
            id: Some(record.id),
            main_concept: Some(record.main_concept),
            concepts: Some(record.concepts),
            text: Some(record.text),
            matches: Vec::new(),
        }
    }
}

/// An input record excluded from the normalized set, with the reason.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DroppedRecord {
    /// 1-based position in the input document.
    pub position: usize,
    /// Identifier as given in the input, if any.
    pub id: Option<String>,
    pub reason: String,
}

/// Where the corpus artifact landed in the blob store.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BlobLocation {
    /// Backend URI (`gs://bucket/key`, `s3://bucket/key`, `file:///...`).
    pub uri: String,
    pub size: u64,
}

/// Acknowledgement of an import request. The import itself may still be
/// running on the service side.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ImportAck {
    pub corpus: String,
    /// Long-running operation name, when the service hands one back.
    pub operation: Option<String>,
}

/// Parameters of one corpus query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub text: String,
    pub top_k: usize,
}

/// One context returned by the corpus service, best-first.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RawHit {
    /// Matched chunk text; embeds one or more tagged blocks.
    pub text: String,
    pub score: f64,
    pub source_uri: Option<String>,
}

/// Structured retrieval result handed to callers and agent tools.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionHit {
    pub id: String,
    pub text: String,
    pub main_concept: String,
    pub concepts: Vec<String>,
    pub score: f64,
}
