//! Metadata normalization.
//!
//! Turns the raw input entries into [`NormalizedQuestionRecord`]s:
//!
//! - identifiers are trimmed; a missing one becomes `<prefix><ordinal>`
//!   (`q_001` for the first input element, counting rejected elements too)
//! - the main concept falls back to the first matcher concept, then to the
//!   configured default label
//! - concepts are cleaned, de-duplicated case/whitespace-insensitively
//!   (first spelling wins) and always include the main concept
//! - records whose text is empty are dropped and reported
//!
//! Cleaning also strips the characters the tagged-block format reserves, so
//! every normalized record can be rendered and parsed back losslessly.
//! Normalizing an already-normalized set returns it unchanged.

use std::collections::HashMap;

use tracing::warn;

use crate::config::NormalizeConfig;
use crate::error::NormalizeError;
use crate::input::RawEntry;
use crate::models::{DroppedRecord, NormalizedQuestionRecord, RawQuestionRecord};

/// Result of one normalization pass.
#[derive(Debug, Clone, Default)]
pub struct NormalizeOutcome {
    /// Surviving records in input order.
    pub records: Vec<NormalizedQuestionRecord>,
    pub dropped: Vec<DroppedRecord>,
}

pub struct Normalizer {
    config: NormalizeConfig,
}

impl Normalizer {
    pub fn new(config: NormalizeConfig) -> Self {
        Self { config }
    }

    /// Identifier assigned to the record at `position` (1-based) when the
    /// input has none. Cleaned like an explicit identifier.
    pub fn fallback_id(&self, position: usize) -> String {
        clean_header(&format!(
            "{}{:0width$}",
            self.config.id_prefix,
            position,
            width = self.config.id_width
        ))
    }

    /// Normalize decoded input entries.
    ///
    /// # Errors
    ///
    /// - [`NormalizeError::IdCollision`] if two surviving records end up with
    ///   the same identifier (compared case-insensitively).
    /// - [`NormalizeError::NoValidRecords`] if every entry was dropped.
    pub fn normalize(&self, entries: &[RawEntry]) -> Result<NormalizeOutcome, NormalizeError> {
        let mut outcome = NormalizeOutcome::default();
        let mut seen_ids: HashMap<String, usize> = HashMap::new();

        for (idx, entry) in entries.iter().enumerate() {
            let position = idx + 1;

            let raw = match entry {
                RawEntry::Parsed(raw) => raw,
                RawEntry::Malformed { id, reason } => {
                    self.drop_record(&mut outcome, position, id.clone(), reason.clone());
                    continue;
                }
            };

            let record = match self.normalize_record(position, raw) {
                Ok(record) => record,
                Err(reason) => {
                    self.drop_record(&mut outcome, position, raw.id.clone(), reason);
                    continue;
                }
            };

            let key = record.id.to_lowercase();
            if let Some(&first) = seen_ids.get(&key) {
                return Err(NormalizeError::IdCollision {
                    id: record.id,
                    first,
                    second: position,
                });
            }
            seen_ids.insert(key, position);
            outcome.records.push(record);
        }

        if outcome.records.is_empty() {
            return Err(NormalizeError::NoValidRecords {
                dropped: outcome.dropped.len(),
            });
        }

        Ok(outcome)
    }

    /// Normalize already-decoded records (e.g. a previous normalized set).
    pub fn normalize_records(
        &self,
        records: &[RawQuestionRecord],
    ) -> Result<NormalizeOutcome, NormalizeError> {
        let entries: Vec<RawEntry> = records.iter().cloned().map(RawEntry::Parsed).collect();
        self.normalize(&entries)
    }

    fn drop_record(
        &self,
        outcome: &mut NormalizeOutcome,
        position: usize,
        id: Option<String>,
        reason: String,
    ) {
        warn!(position, id = ?id, %reason, "dropping input record");
        outcome.dropped.push(DroppedRecord {
            position,
            id,
            reason,
        });
    }

    fn normalize_record(
        &self,
        position: usize,
        raw: &RawQuestionRecord,
    ) -> Result<NormalizedQuestionRecord, String> {
        let text = clean_text(raw.text.as_deref().unwrap_or(""));
        if text.is_empty() {
            return Err("text is empty after trimming".to_string());
        }

        let id = raw
            .id
            .as_deref()
            .map(clean_header)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.fallback_id(position));

        let matched = self.matched_concepts(raw);

        let main_concept = raw
            .main_concept
            .as_deref()
            .map(clean_concept)
            .filter(|s| !s.is_empty())
            .or_else(|| {
                raw.matches
                    .iter()
                    .filter_map(|m| m.concept.as_deref())
                    .map(clean_concept)
                    .find(|s| !s.is_empty())
            })
            .unwrap_or_else(|| clean_concept(&self.config.default_main_concept));

        let source: &[String] = match &raw.concepts {
            Some(list) if !list.is_empty() => list,
            _ => &matched,
        };

        let mut concepts: Vec<String> = Vec::new();
        let mut keys: Vec<String> = Vec::new();
        for concept in source.iter().map(|c| clean_concept(c)) {
            if concept.is_empty() {
                continue;
            }
            let key = concept_key(&concept);
            if !keys.contains(&key) {
                keys.push(key);
                concepts.push(concept);
            }
        }
        if !keys.contains(&concept_key(&main_concept)) {
            concepts.push(main_concept.clone());
        }

        Ok(NormalizedQuestionRecord {
            id,
            text,
            main_concept,
            concepts,
        })
    }

    /// Concepts suggested by the upstream matcher, best-first, above the
    /// configured threshold.
    fn matched_concepts(&self, raw: &RawQuestionRecord) -> Vec<String> {
        raw.matches
            .iter()
            .filter(|m| m.score.map_or(true, |s| s >= self.config.concept_threshold))
            .filter_map(|m| m.concept.clone())
            .filter(|c| !c.trim().is_empty())
            .take(self.config.max_matched_concepts)
            .collect()
    }
}

/// Key used to decide whether two concept spellings are the same concept.
pub fn concept_key(concept: &str) -> String {
    concept
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Single-line header value without bracket syntax.
fn clean_header(value: &str) -> String {
    value
        .replace('[', "(")
        .replace(']', ")")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn clean_concept(value: &str) -> String {
    clean_header(&value.replace(';', ","))
}

fn clean_text(value: &str) -> String {
    value
        .replace("\r\n", "\n")
        .trim()
        .lines()
        .map(|line| {
            if line.trim() == crate::corpus_text::DELIMITER {
                "- - -"
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
