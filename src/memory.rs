//! In-memory [`BlobStore`] and [`CorpusService`] implementations.
//!
//! Both record every call so tests can assert what reached the "remote"
//! side (and, more often, that nothing did).

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::corpus_local::rank_blocks;
use crate::models::{BlobLocation, ImportAck, QueryRequest, RawHit};
use crate::traits::{BlobStore, CorpusService};

const URI_SCHEME: &str = "memory://";

/// Blob store backed by a map of object name → bytes.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
    puts: RwLock<Vec<String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Object names passed to `put`, in call order.
    pub fn puts(&self) -> Vec<String> {
        self.puts.read().unwrap().clone()
    }

    pub fn object(&self, object_name: &str) -> Option<Vec<u8>> {
        self.objects.read().unwrap().get(object_name).cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put(&self, object_name: &str, body: &[u8]) -> Result<BlobLocation> {
        self.puts.write().unwrap().push(object_name.to_string());
        self.objects
            .write()
            .unwrap()
            .insert(object_name.to_string(), body.to_vec());
        Ok(BlobLocation {
            uri: format!("{}{}", URI_SCHEME, object_name),
            size: body.len() as u64,
        })
    }

    async fn get(&self, location: &BlobLocation) -> Result<Vec<u8>> {
        let name = location
            .uri
            .strip_prefix(URI_SCHEME)
            .ok_or_else(|| anyhow!("not a memory blob: {}", location.uri))?;
        self.object(name)
            .ok_or_else(|| anyhow!("blob not found: {}", location.uri))
    }
}

/// Corpus that either ranks imported artifacts or replays canned hits.
pub struct MemoryCorpus {
    source: Option<Arc<dyn BlobStore>>,
    canned: Option<Vec<RawHit>>,
    content: RwLock<Option<String>>,
    imports: RwLock<Vec<BlobLocation>>,
    queries: RwLock<Vec<QueryRequest>>,
}

impl MemoryCorpus {
    /// Imports read the artifact from `source` and queries rank its blocks.
    pub fn new(source: Arc<dyn BlobStore>) -> Self {
        Self {
            source: Some(source),
            canned: None,
            content: RwLock::new(None),
            imports: RwLock::new(Vec::new()),
            queries: RwLock::new(Vec::new()),
        }
    }

    /// Every query returns (up to `top_k` of) `hits`, whatever the text.
    pub fn with_hits(hits: Vec<RawHit>) -> Self {
        Self {
            source: None,
            canned: Some(hits),
            content: RwLock::new(None),
            imports: RwLock::new(Vec::new()),
            queries: RwLock::new(Vec::new()),
        }
    }

    pub fn imports(&self) -> Vec<BlobLocation> {
        self.imports.read().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<QueryRequest> {
        self.queries.read().unwrap().clone()
    }
}

#[async_trait]
impl CorpusService for MemoryCorpus {
    fn name(&self) -> &str {
        "memory"
    }

    async fn import(&self, location: &BlobLocation) -> Result<ImportAck> {
        self.imports.write().unwrap().push(location.clone());
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| anyhow!("memory corpus has no blob source to import from"))?;
        let bytes = source.get(location).await?;
        *self.content.write().unwrap() = Some(String::from_utf8_lossy(&bytes).into_owned());
        Ok(ImportAck {
            corpus: self.name().to_string(),
            operation: None,
        })
    }

    async fn query(&self, request: &QueryRequest) -> Result<Vec<RawHit>> {
        self.queries.write().unwrap().push(request.clone());

        if let Some(hits) = &self.canned {
            return Ok(hits.iter().take(request.top_k).cloned().collect());
        }
        let content = self.content.read().unwrap();
        match content.as_deref() {
            Some(text) => Ok(rank_blocks(text, &request.text, request.top_k, None)),
            None => bail!("memory corpus has not been imported yet"),
        }
    }
}
