//! Local corpus backend.
//!
//! Stands in for the managed retrieval service on a single machine:
//! `import` copies the artifact from the blob store into `index_path`
//! (replacing the previous import) and `query` ranks the imported blocks by
//! how many of the query's terms they contain.
//!
//! Ranking is deliberately plain term overlap; it exists so the whole
//! pipeline can run without cloud credentials.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::corpus_text::{split_blocks, DELIMITER};
use crate::models::{BlobLocation, ImportAck, QueryRequest, RawHit};
use crate::traits::{BlobStore, CorpusService};

pub struct LocalCorpus {
    index_path: PathBuf,
    name: String,
    blob_store: Arc<dyn BlobStore>,
}

impl LocalCorpus {
    pub fn new(index_path: PathBuf, blob_store: Arc<dyn BlobStore>) -> Self {
        let name = format!("local:{}", index_path.display());
        Self {
            index_path,
            name,
            blob_store,
        }
    }
}

#[async_trait]
impl CorpusService for LocalCorpus {
    fn name(&self) -> &str {
        &self.name
    }

    async fn import(&self, location: &BlobLocation) -> Result<ImportAck> {
        let bytes = self
            .blob_store
            .get(location)
            .await
            .with_context(|| format!("Failed to fetch {} for import", location.uri))?;

        if let Some(parent) = self.index_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.index_path.with_extension("importing");
        tokio::fs::write(&tmp, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.index_path)
            .await
            .with_context(|| format!("Failed to replace {}", self.index_path.display()))?;

        debug!(uri = %location.uri, bytes = bytes.len(), "local corpus imported");
        Ok(ImportAck {
            corpus: self.name.clone(),
            operation: None,
        })
    }

    async fn query(&self, request: &QueryRequest) -> Result<Vec<RawHit>> {
        if !self.index_path.exists() {
            bail!(
                "local corpus has not been imported yet: {}",
                self.index_path.display()
            );
        }
        let text = tokio::fs::read_to_string(&self.index_path)
            .await
            .with_context(|| format!("Failed to read {}", self.index_path.display()))?;

        let source = self.index_path.display().to_string();
        Ok(rank_blocks(
            &text,
            &request.text,
            request.top_k,
            Some(source.as_str()),
        ))
    }
}

/// Rank the blocks of a corpus artifact against `query`.
///
/// Score is the fraction of distinct query terms found in the block
/// (case-insensitive). Blocks with no matching term are left out; ties keep
/// corpus order. Each hit's text is the block with its delimiter line, the
/// same shape a managed service hands back.
pub fn rank_blocks(
    corpus: &str,
    query: &str,
    top_k: usize,
    source_uri: Option<&str>,
) -> Vec<RawHit> {
    let terms = terms(query);
    if terms.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(f64, String)> = split_blocks(corpus)
        .into_iter()
        .filter_map(|block| {
            let block_terms = self::terms(&block);
            let matched = terms.iter().filter(|t| block_terms.contains(*t)).count();
            if matched == 0 {
                None
            } else {
                Some((matched as f64 / terms.len() as f64, block))
            }
        })
        .collect();

    // Stable sort keeps corpus order among equal scores.
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    scored
        .into_iter()
        .take(top_k)
        .map(|(score, block)| RawHit {
            text: format!("{}\n\n{}", block, DELIMITER),
            score,
            source_uri: source_uri.map(String::from),
        })
        .collect()
}

/// Lower-cased word terms; `_` and `-` stay inside words so ids like
/// `q_001` survive as one term.
fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
        .map(|t| t.trim_matches('-').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}
