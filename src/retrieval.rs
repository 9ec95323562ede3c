//! Retrieval adapters.
//!
//! Three lookups over the imported corpus, all returning [`QuestionHit`]s
//! recovered from the tagged blocks embedded in the service's raw hits:
//!
//! | Operation | Service query | Post-processing |
//! |-----------|---------------|-----------------|
//! | [`Retriever::search_by_text`] | query text, `top_k` | parse, dedup by id |
//! | [`Retriever::search_by_concept`] | concept, `top_k * overfetch` | keep concept matches (fallback: all) |
//! | [`Retriever::search_by_id`] | identifier, `id_lookup_k` | exact id match or `None` |
//!
//! A raw hit may hold several blocks or a fragment of one (the service
//! chunks the artifact its own way). Every well-formed block becomes a hit
//! with the raw hit's score; fragments are skipped with a warning.

use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::corpus_text::{parse_block, split_blocks};
use crate::error::RetrievalError;
use crate::models::{QueryRequest, QuestionHit, RawHit};
use crate::normalize::concept_key;
use crate::traits::CorpusService;

pub struct Retriever {
    corpus: Arc<dyn CorpusService>,
    settings: RetrievalConfig,
}

impl Retriever {
    pub fn new(corpus: Arc<dyn CorpusService>, settings: RetrievalConfig) -> Self {
        Self { corpus, settings }
    }

    pub fn default_top_k(&self) -> usize {
        self.settings.default_top_k
    }

    pub fn corpus_name(&self) -> &str {
        self.corpus.name()
    }

    /// Free-text search, best-first.
    pub async fn search_by_text(&self, query: &str, top_k: usize) -> Result<Vec<QuestionHit>> {
        let query = require_non_empty("query", query)?;
        require_top_k(top_k)?;

        let hits = self.fetch(query, top_k).await?;
        Ok(hits.into_iter().take(top_k).collect())
    }

    /// Questions tagged with `concept` in their main concept or concept list.
    ///
    /// Over-fetches, filters case/whitespace-insensitively and falls back to
    /// the unfiltered hits when nothing carries the tag.
    pub async fn search_by_concept(&self, concept: &str, top_k: usize) -> Result<Vec<QuestionHit>> {
        let concept = require_non_empty("concept", concept)?;
        require_top_k(top_k)?;

        let hits = self
            .fetch(concept, top_k.saturating_mul(self.settings.concept_overfetch))
            .await?;

        let target = concept_key(concept);
        let tagged: Vec<QuestionHit> = hits
            .iter()
            .filter(|h| {
                concept_key(&h.main_concept) == target
                    || h.concepts.iter().any(|c| concept_key(c) == target)
            })
            .cloned()
            .collect();

        let selected = if tagged.is_empty() {
            debug!(concept, "no hit carries the concept tag, returning raw hits");
            hits
        } else {
            tagged
        };
        Ok(selected.into_iter().take(top_k).collect())
    }

    /// Exact (case-insensitive) identifier lookup. A miss is `Ok(None)`.
    pub async fn search_by_id(&self, id: &str) -> Result<Option<QuestionHit>> {
        let id = require_non_empty("question_id", id)?;
        let wanted = id.to_lowercase();

        let hits = self.fetch(id, self.settings.id_lookup_k).await?;
        Ok(hits.into_iter().find(|h| h.id.to_lowercase() == wanted))
    }

    async fn fetch(&self, text: &str, top_k: usize) -> Result<Vec<QuestionHit>> {
        let raw = self
            .corpus
            .query(&QueryRequest {
                text: text.to_string(),
                top_k,
            })
            .await?;
        Ok(hits_from_raw(&raw))
    }
}

/// Turn raw service hits into structured hits, keeping service order and
/// the first occurrence of each identifier.
pub fn hits_from_raw(raw: &[RawHit]) -> Vec<QuestionHit> {
    let mut seen = HashSet::new();
    let mut hits = Vec::new();

    for hit in raw {
        for block in split_blocks(&hit.text) {
            match parse_block(&block) {
                Ok(parsed) => {
                    if !seen.insert(parsed.id.to_lowercase()) {
                        continue;
                    }
                    hits.push(QuestionHit {
                        id: parsed.id,
                        text: parsed.text,
                        main_concept: parsed.main_concept,
                        concepts: parsed.concepts,
                        score: hit.score,
                    });
                }
                Err(e) => {
                    warn!(
                        source = hit.source_uri.as_deref().unwrap_or("-"),
                        error = %e,
                        "skipping malformed block in corpus hit"
                    );
                }
            }
        }
    }

    hits
}

fn require_non_empty<'a>(name: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RetrievalError::InvalidArgument(format!("{} must not be empty", name)).into());
    }
    Ok(trimmed)
}

fn require_top_k(top_k: usize) -> Result<()> {
    if top_k == 0 {
        return Err(RetrievalError::InvalidArgument("top_k must be >= 1".to_string()).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCorpus;

    fn block(id: &str, main: &str, concepts: &str, text: &str) -> String {
        format!(
            "[ID: {}]\n[MAIN_CONCEPT: {}]\n[CONCEPTS: {}]\n\n{}\n\n---",
            id, main, concepts, text
        )
    }

    fn retriever(hits: Vec<RawHit>) -> (Retriever, Arc<MemoryCorpus>) {
        let corpus = Arc::new(MemoryCorpus::with_hits(hits));
        (
            Retriever::new(corpus.clone(), RetrievalConfig::default()),
            corpus,
        )
    }

    fn hit(text: String, score: f64) -> RawHit {
        RawHit {
            text,
            score,
            source_uri: None,
        }
    }

    #[tokio::test]
    async fn text_search_parses_blocks_in_order() {
        let (r, corpus) = retriever(vec![
            hit(block("q_002", "Tax", "Tax; Audit", "Second question"), 0.9),
            hit(block("q_001", "Partnerships", "Partnerships", "First question"), 0.5),
        ]);
        let hits = r.search_by_text("  tax question ", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "q_002");
        assert_eq!(hits[0].concepts, vec!["Tax", "Audit"]);
        assert_eq!(hits[0].score, 0.9);
        assert_eq!(hits[1].text, "First question");

        let queries = corpus.queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].text, "tax question");
        assert_eq!(queries[0].top_k, 5);
    }

    #[tokio::test]
    async fn empty_query_is_invalid_argument() {
        let (r, corpus) = retriever(vec![]);
        let err = r.search_by_text("   ", 5).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RetrievalError>(),
            Some(RetrievalError::InvalidArgument(_))
        ));
        assert!(r.search_by_text("x", 0).await.is_err());
        assert!(corpus.queries().is_empty());
    }

    #[tokio::test]
    async fn multi_block_hits_are_split_and_deduplicated() {
        let chunk = format!(
            "end of a previous question\n\n---\n\n{}\n\n{}",
            block("a", "X", "X", "Alpha"),
            block("b", "Y", "Y", "Beta")
        );
        let (r, _) = retriever(vec![
            hit(chunk, 0.8),
            hit(block("A", "X", "X", "Alpha again"), 0.7),
        ]);
        let hits = r.search_by_text("alpha", 10).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(hits.iter().all(|h| h.score == 0.8));
    }

    #[tokio::test]
    async fn text_search_truncates_to_top_k() {
        let chunk = (0..4)
            .map(|i| block(&format!("q{}", i), "M", "M", "t"))
            .collect::<Vec<_>>()
            .join("\n\n");
        let (r, _) = retriever(vec![hit(chunk, 1.0)]);
        assert_eq!(r.search_by_text("t", 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn concept_search_filters_and_overfetches() {
        let (r, corpus) = retriever(vec![
            hit(block("a", "Tax", "Tax", "one"), 0.9),
            hit(block("b", "Audit", "Audit; Partnerships", "two"), 0.8),
            hit(block("c", "partnerships", "partnerships", "three"), 0.7),
        ]);
        let hits = r.search_by_concept(" Partnerships", 2).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(corpus.queries()[0].top_k, 6);
    }

    #[tokio::test]
    async fn concept_search_falls_back_to_raw_hits() {
        let (r, _) = retriever(vec![
            hit(block("a", "Tax", "Tax", "one"), 0.9),
            hit(block("b", "Audit", "Audit", "two"), 0.8),
        ]);
        let hits = r.search_by_concept("Ethics", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[tokio::test]
    async fn id_lookup_matches_case_insensitively() {
        let (r, corpus) = retriever(vec![
            hit(block("q_010", "M", "M", "ten"), 0.9),
            hit(block("Q_001", "M", "M", "one"), 0.5),
        ]);
        let found = r.search_by_id(" q_001 ").await.unwrap().unwrap();
        assert_eq!(found.id, "Q_001");
        assert_eq!(found.text, "one");
        assert_eq!(corpus.queries()[0].top_k, 10);
    }

    #[tokio::test]
    async fn id_lookup_miss_is_none() {
        let (r, _) = retriever(vec![hit(block("q_010", "M", "M", "ten"), 0.9)]);
        assert_eq!(r.search_by_id("q_999").await.unwrap(), None);
    }

    #[test]
    fn malformed_hits_are_skipped() {
        let hits = hits_from_raw(&[
            hit("no tags at all".to_string(), 0.4),
            hit(block("ok", "M", "M", "fine"), 0.3),
        ]);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "ok");
    }
}
