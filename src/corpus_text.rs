//! Tagged-block corpus format.
//!
//! Each normalized record is rendered as:
//!
//! ```text
//! [ID: q_001]
//! [MAIN_CONCEPT: Partnerships]
//! [CONCEPTS: Partnerships; Tax]
//!
//! Explain...
//!
//! ---
//! ```
//!
//! Blocks are separated by a blank line and the artifact ends with a single
//! newline. The retrieval side recovers the tags from whatever text the corpus
//! service hands back, so tag names and bracket syntax are fixed.

use crate::error::{BlockParseError, BuildError};
use crate::models::NormalizedQuestionRecord;
use crate::normalize::concept_key;

/// Line terminating every block.
pub const DELIMITER: &str = "---";

const ID_TAG: &str = "ID";
const MAIN_CONCEPT_TAG: &str = "MAIN_CONCEPT";
const CONCEPTS_TAG: &str = "CONCEPTS";
const CONCEPT_SEPARATOR: &str = "; ";

/// Structured content recovered from one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedBlock {
    pub id: String,
    pub main_concept: String,
    pub concepts: Vec<String>,
    pub text: String,
}

/// Render the whole corpus artifact.
///
/// Fails on the first record that breaks the block invariants; such a record
/// should never get past normalization.
pub fn build_corpus_text(records: &[NormalizedQuestionRecord]) -> Result<String, BuildError> {
    let blocks = records
        .iter()
        .map(render_block)
        .collect::<Result<Vec<_>, _>>()?;

    if blocks.is_empty() {
        return Ok(String::new());
    }
    Ok(blocks.join("\n\n") + "\n")
}

/// Render one record without the trailing newline.
pub fn render_block(record: &NormalizedQuestionRecord) -> Result<String, BuildError> {
    validate_record(record)?;

    Ok([
        format!("[{}: {}]", ID_TAG, record.id),
        format!("[{}: {}]", MAIN_CONCEPT_TAG, record.main_concept),
        format!("[{}: {}]", CONCEPTS_TAG, record.concepts.join(CONCEPT_SEPARATOR)),
        String::new(),
        record.text.clone(),
        String::new(),
        DELIMITER.to_string(),
    ]
    .join("\n"))
}

fn validate_record(record: &NormalizedQuestionRecord) -> Result<(), BuildError> {
    let id = record.id.clone();

    check_header(&id, "id", &record.id, false)?;
    check_header(&id, "main_concept", &record.main_concept, true)?;
    for concept in &record.concepts {
        check_header(&id, "concepts", concept, true)?;
    }

    if record.text.trim().is_empty() {
        return Err(BuildError::EmptyField { id, field: "text" });
    }
    if record.text.lines().any(|line| line.trim() == DELIMITER) {
        return Err(BuildError::DelimiterInText { id });
    }

    let main_key = concept_key(&record.main_concept);
    if !record.concepts.iter().any(|c| concept_key(c) == main_key) {
        return Err(BuildError::MainConceptMissing {
            id,
            main_concept: record.main_concept.clone(),
        });
    }

    Ok(())
}

fn check_header(
    id: &str,
    field: &'static str,
    value: &str,
    is_concept: bool,
) -> Result<(), BuildError> {
    if value.trim().is_empty() {
        return Err(BuildError::EmptyField {
            id: id.to_string(),
            field,
        });
    }
    let reserved = |c: char| matches!(c, '[' | ']' | '\n' | '\r') || (is_concept && c == ';');
    if let Some(found) = value.chars().find(|&c| reserved(c)) {
        return Err(BuildError::TagSyntax {
            id: id.to_string(),
            field,
            found,
        });
    }
    Ok(())
}

/// Split corpus (or chunk) text into block bodies at delimiter lines.
///
/// Segments that are blank are discarded; a trailing segment without a
/// delimiter is still returned.
pub fn split_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim() == DELIMITER {
            push_block(&mut blocks, &current);
            current.clear();
        } else {
            current.push(line);
        }
    }
    push_block(&mut blocks, &current);

    blocks
}

fn push_block(blocks: &mut Vec<String>, lines: &[&str]) {
    let block = lines.join("\n");
    if !block.trim().is_empty() {
        blocks.push(block.trim().to_string());
    }
}

/// Parse one block body (delimiter optional).
pub fn parse_block(raw: &str) -> Result<TaggedBlock, BlockParseError> {
    let mut lines = raw.lines().skip_while(|l| l.trim().is_empty());

    let first = lines.next().ok_or(BlockParseError::Empty)?;
    let id = extract_tag(first, ID_TAG).ok_or(BlockParseError::MissingTag(ID_TAG))?;

    let main_concept = lines
        .next()
        .and_then(|l| extract_tag(l, MAIN_CONCEPT_TAG))
        .ok_or(BlockParseError::MissingTag(MAIN_CONCEPT_TAG))?;

    let concepts_raw = lines
        .next()
        .and_then(|l| extract_tag(l, CONCEPTS_TAG))
        .ok_or(BlockParseError::MissingTag(CONCEPTS_TAG))?;
    let concepts = concepts_raw
        .split(';')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect();

    let text = lines
        .take_while(|l| l.trim() != DELIMITER)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();
    if text.is_empty() {
        return Err(BlockParseError::EmptyText { id });
    }

    Ok(TaggedBlock {
        id,
        main_concept,
        concepts,
        text,
    })
}

/// Parse every block of a corpus artifact, collecting malformed ones
/// instead of failing.
pub fn parse_corpus(text: &str) -> (Vec<TaggedBlock>, Vec<BlockParseError>) {
    let mut parsed = Vec::new();
    let mut errors = Vec::new();
    for block in split_blocks(text) {
        match parse_block(&block) {
            Ok(b) => parsed.push(b),
            Err(e) => errors.push(e),
        }
    }
    (parsed, errors)
}

/// `[LABEL: value]` → `value`.
fn extract_tag(line: &str, label: &str) -> Option<String> {
    let rest = line.trim().strip_prefix('[')?.strip_prefix(label)?;
    let value = rest.strip_prefix(':')?.strip_suffix(']')?;
    Some(value.trim().to_string())
}
