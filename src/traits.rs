//! Capability traits at the seams of the pipeline.
//!
//! The ingestion driver and the retrieval adapters never talk to a cloud SDK
//! directly. They hold trait objects:
//!
//! ```text
//!   IngestionDriver ──put──▶ BlobStore      (filesystem, S3/GCS, memory)
//!         │
//!         └──────import──▶ CorpusService  (local, Vertex RAG, memory)
//!                               ▲
//!   Retriever ───────query──────┘
//!         ▲
//!   ToolRegistry ◀── agent host (HTTP)
//! ```
//!
//! Backends are picked from [`Config`] by [`create_blob_store`] and
//! [`create_corpus_service`]; tests swap in the in-memory ones from
//! [`crate::memory`].

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::config::{BlobStoreConfig, Config, CorpusConfig};
use crate::models::{BlobLocation, ImportAck, QueryRequest, QuestionHit, RawHit};
use crate::retrieval::Retriever;

// ═══════════════════════════════════════════════════════════════════════
// Blob store
// ═══════════════════════════════════════════════════════════════════════

/// Object storage holding the corpus artifact between ingestion and import.
///
/// `put` has overwrite semantics: the same object name is replaced on every
/// ingestion run.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Short backend label for status output (e.g. `"s3"`).
    fn name(&self) -> &str;

    /// Store `body` under `object_name`, replacing any previous object.
    async fn put(&self, object_name: &str, body: &[u8]) -> Result<BlobLocation>;

    /// Read back an object previously returned by [`put`](BlobStore::put).
    async fn get(&self, location: &BlobLocation) -> Result<Vec<u8>>;
}

// ═══════════════════════════════════════════════════════════════════════
// Corpus service
// ═══════════════════════════════════════════════════════════════════════

/// The managed retrieval service that indexes the corpus artifact.
#[async_trait]
pub trait CorpusService: Send + Sync {
    /// Human-readable corpus name (resource name for remote services).
    fn name(&self) -> &str;

    /// Ask the service to (re)import the artifact at `location`.
    ///
    /// Returns once the request is accepted; indexing may still be running.
    async fn import(&self, location: &BlobLocation) -> Result<ImportAck>;

    /// Run a similarity query. Hits come back best-first.
    async fn query(&self, request: &QueryRequest) -> Result<Vec<RawHit>>;
}

/// Build the blob store selected by `[blob_store]`.
pub fn create_blob_store(config: &Config) -> Result<Arc<dyn BlobStore>> {
    Ok(match &config.blob_store {
        BlobStoreConfig::Filesystem(fs) => {
            Arc::new(crate::blob_fs::FilesystemBlobStore::new(fs.root.clone()))
        }
        BlobStoreConfig::S3(s3) => Arc::new(crate::blob_s3::S3BlobStore::from_env(s3.clone())?),
    })
}

/// Build the corpus client selected by `[corpus]`.
///
/// The local corpus reads imported artifacts back through `blob_store`.
pub fn create_corpus_service(
    config: &Config,
    blob_store: Arc<dyn BlobStore>,
) -> Result<Arc<dyn CorpusService>> {
    Ok(match &config.corpus {
        CorpusConfig::Local(local) => Arc::new(crate::corpus_local::LocalCorpus::new(
            local.index_path.clone(),
            blob_store,
        )),
        CorpusConfig::Vertex(vertex) => {
            Arc::new(crate::corpus_vertex::VertexRagCorpus::from_env(vertex.clone())?)
        }
    })
}

// ═══════════════════════════════════════════════════════════════════════
// Tool trait
// ═══════════════════════════════════════════════════════════════════════

/// A function an agent host can discover and call by name.
///
/// Tools are listed via `GET /tools/list` and invoked via
/// `POST /tools/{name}` with a JSON object of parameters that has already
/// been checked against [`parameters_schema`](Tool::parameters_schema).
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// One-line description the agent uses to pick the tool.
    fn description(&self) -> &str;

    /// JSON Schema (`type: "object"`) for the parameters.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Bridge from a tool invocation to the question corpus.
#[derive(Clone)]
pub struct ToolContext {
    retriever: Arc<Retriever>,
}

impl ToolContext {
    pub fn new(retriever: Arc<Retriever>) -> Self {
        Self { retriever }
    }

    pub fn default_top_k(&self) -> usize {
        self.retriever.default_top_k()
    }

    pub async fn search_by_text(&self, query: &str, top_k: usize) -> Result<Vec<QuestionHit>> {
        self.retriever.search_by_text(query, top_k).await
    }

    pub async fn search_by_concept(
        &self,
        concept: &str,
        top_k: usize,
    ) -> Result<Vec<QuestionHit>> {
        self.retriever.search_by_concept(concept, top_k).await
    }

    pub async fn search_by_id(&self, id: &str) -> Result<Option<QuestionHit>> {
        self.retriever.search_by_id(id).await
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Built-in tools
// ═══════════════════════════════════════════════════════════════════════

fn top_k_param(params: &Value, ctx: &ToolContext) -> usize {
    params
        .get("top_k")
        .and_then(|v| v.as_u64())
        .map(|k| k as usize)
        .unwrap_or_else(|| ctx.default_top_k())
}

/// Free-text search over the exam-question corpus.
pub struct RetrieveExamQuestionsTool;

#[async_trait]
impl Tool for RetrieveExamQuestionsTool {
    fn name(&self) -> &str {
        "retrieve_exam_questions"
    }

    fn description(&self) -> &str {
        "Search the exam-question corpus using a free-text query"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "What the teacher typed, e.g. \"strategic risks SSBR\"" },
                "top_k": { "type": "integer", "minimum": 1, "description": "Maximum number of hits (defaults to retrieval.default_top_k)" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = params["query"].as_str().unwrap_or("");
        let hits = ctx.search_by_text(query, top_k_param(&params, ctx)).await?;
        Ok(serde_json::json!({ "results": hits }))
    }
}

/// Questions tagged with a concept.
pub struct RetrieveQuestionsByConceptTool;

#[async_trait]
impl Tool for RetrieveQuestionsByConceptTool {
    fn name(&self) -> &str {
        "retrieve_questions_by_concept"
    }

    fn description(&self) -> &str {
        "Retrieve questions that are tagged with the given concept name"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "concept": { "type": "string", "description": "Concept name, e.g. \"Partnerships\"" },
                "top_k": { "type": "integer", "minimum": 1, "description": "Maximum number of hits (defaults to retrieval.default_top_k)" }
            },
            "required": ["concept"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let concept = params["concept"].as_str().unwrap_or("");
        let hits = ctx
            .search_by_concept(concept, top_k_param(&params, ctx))
            .await?;
        Ok(serde_json::json!({ "results": hits }))
    }
}

/// Lookup by question identifier. A miss is an empty result list.
pub struct RetrieveQuestionByIdTool;

#[async_trait]
impl Tool for RetrieveQuestionByIdTool {
    fn name(&self) -> &str {
        "retrieve_question_by_id"
    }

    fn description(&self) -> &str {
        "Retrieve a single question by its ID (e.g. \"q_001\")"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "question_id": { "type": "string", "description": "Question identifier" }
            },
            "required": ["question_id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let id = params["question_id"].as_str().unwrap_or("");
        let hit = ctx.search_by_id(id).await?;
        Ok(serde_json::json!({ "results": hit.into_iter().collect::<Vec<_>>() }))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Ordered set of tools exposed to the agent host.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry with the three retrieval tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(RetrieveExamQuestionsTool));
        registry.register(Box::new(RetrieveQuestionsByConceptTool));
        registry.register(Box::new(RetrieveQuestionByIdTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
