//! TOML configuration.
//!
//! A single [`Config`] value is loaded once by the CLI and handed to the
//! ingestion driver, the retrieval adapters and the tool host. Nothing in
//! the crate reads project, bucket or corpus identifiers from globals.
//!
//! ```toml
//! [paths]
//! input = "./input/metadata_input.json"
//!
//! [blob_store]
//! backend = "s3"
//! bucket = "exam-rag"
//! region = "auto"
//! endpoint_url = "https://storage.googleapis.com"
//! uri_scheme = "gs"
//!
//! [corpus]
//! backend = "vertex"
//! project_id = "my-project"
//! location = "us-central1"
//! corpus_name = "1234567890"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub normalize: NormalizeConfig,
    pub blob_store: BlobStoreConfig,
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_input_path")]
    pub input: PathBuf,
    #[serde(default = "default_normalized_path")]
    pub normalized: PathBuf,
    #[serde(default = "default_corpus_path")]
    pub corpus: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input: default_input_path(),
            normalized: default_normalized_path(),
            corpus: default_corpus_path(),
        }
    }
}

fn default_input_path() -> PathBuf {
    PathBuf::from("./input/metadata_input.json")
}
fn default_normalized_path() -> PathBuf {
    PathBuf::from("./input/normalized_metadata.json")
}
fn default_corpus_path() -> PathBuf {
    PathBuf::from("./metadata_tagging_file.txt")
}

/// Knobs for the metadata normalizer.
#[derive(Debug, Deserialize, Clone)]
pub struct NormalizeConfig {
    /// Label used when a record has no usable main concept.
    #[serde(default = "default_main_concept")]
    pub default_main_concept: String,
    /// Prefix of generated identifiers (`q_` → `q_001`).
    #[serde(default = "default_id_prefix")]
    pub id_prefix: String,
    /// Zero-padding width of generated identifiers.
    #[serde(default = "default_id_width")]
    pub id_width: usize,
    /// How many matcher concepts are kept for matcher-shaped input.
    #[serde(default = "default_max_matched_concepts")]
    pub max_matched_concepts: usize,
    /// Matcher concepts scoring below this are ignored.
    #[serde(default)]
    pub concept_threshold: f64,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            default_main_concept: default_main_concept(),
            id_prefix: default_id_prefix(),
            id_width: default_id_width(),
            max_matched_concepts: default_max_matched_concepts(),
            concept_threshold: 0.0,
        }
    }
}

fn default_main_concept() -> String {
    "UNKNOWN".to_string()
}
fn default_id_prefix() -> String {
    "q_".to_string()
}
fn default_id_width() -> usize {
    3
}
fn default_max_matched_concepts() -> usize {
    3
}

/// Where the corpus artifact is uploaded.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum BlobStoreConfig {
    Filesystem(FilesystemBlobConfig),
    S3(S3BlobConfig),
}

impl BlobStoreConfig {
    pub fn object_name(&self) -> &str {
        match self {
            BlobStoreConfig::Filesystem(c) => &c.object_name,
            BlobStoreConfig::S3(c) => &c.object_name,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesystemBlobConfig {
    pub root: PathBuf,
    #[serde(default = "default_object_name")]
    pub object_name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct S3BlobConfig {
    pub bucket: String,
    pub region: String,
    /// Key prefix inside the bucket (e.g. `rag/`).
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_object_name")]
    pub object_name: String,
    /// Custom endpoint for S3-compatible services (GCS XML API, MinIO).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Scheme used in the location handed to the corpus (`s3` or `gs`).
    #[serde(default = "default_uri_scheme")]
    pub uri_scheme: String,
}

fn default_object_name() -> String {
    "metadata_tagging_file.txt".to_string()
}
fn default_uri_scheme() -> String {
    "s3".to_string()
}

/// The retrieval service holding the imported corpus.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum CorpusConfig {
    Local(LocalCorpusConfig),
    Vertex(VertexCorpusConfig),
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocalCorpusConfig {
    pub index_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VertexCorpusConfig {
    pub project_id: String,
    pub location: String,
    /// Corpus id, or a full `projects/.../ragCorpora/...` resource name.
    pub corpus_name: String,
    /// Overrides `https://<location>-aiplatform.googleapis.com`.
    #[serde(default)]
    pub api_endpoint: Option<String>,
    /// Environment variable holding an OAuth access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_token_env() -> String {
    "GOOGLE_OAUTH_ACCESS_TOKEN".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    /// `search_by_concept` asks the service for `top_k * concept_overfetch` hits.
    #[serde(default = "default_concept_overfetch")]
    pub concept_overfetch: usize,
    #[serde(default = "default_id_lookup_k")]
    pub id_lookup_k: usize,
    #[serde(default = "default_sample_query")]
    pub sample_query: String,
    #[serde(default = "default_sample_top_k")]
    pub sample_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            concept_overfetch: default_concept_overfetch(),
            id_lookup_k: default_id_lookup_k(),
            sample_query: default_sample_query(),
            sample_top_k: default_sample_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_concept_overfetch() -> usize {
    3
}
fn default_id_lookup_k() -> usize {
    10
}
fn default_sample_query() -> String {
    "[TEST UPDATE 1]".to_string()
}
fn default_sample_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,
    #[serde(default = "default_agent_model")]
    pub model: String,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub instruction_path: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            model: default_agent_model(),
            instruction: None,
            instruction_path: None,
        }
    }
}

fn default_agent_name() -> String {
    "question_rag".to_string()
}
fn default_agent_model() -> String {
    "gemini-2.5-pro".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)
        .with_context(|| format!("Invalid config file: {}", path.display()))?;

    Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let n = &config.normalize;
    if n.id_prefix.trim().is_empty() {
        bail!("normalize.id_prefix must not be empty");
    }
    if n.id_prefix.split_whitespace().collect::<Vec<_>>().join(" ") != n.id_prefix {
        bail!("normalize.id_prefix must not have leading, trailing or repeated whitespace");
    }
    if n.id_prefix.contains(|c| matches!(c, '[' | ']' | '\n' | '\r')) {
        bail!("normalize.id_prefix must not contain '[', ']' or line breaks");
    }
    if !(1..=12).contains(&n.id_width) {
        bail!("normalize.id_width must be in [1, 12]");
    }
    if n.default_main_concept.trim().is_empty() {
        bail!("normalize.default_main_concept must not be empty");
    }
    if n
        .default_main_concept
        .contains(|c| matches!(c, '[' | ']' | ';' | '\n' | '\r'))
    {
        bail!("normalize.default_main_concept must not contain '[', ']', ';' or line breaks");
    }
    if n.max_matched_concepts == 0 {
        bail!("normalize.max_matched_concepts must be >= 1");
    }
    if !(0.0..=1.0).contains(&n.concept_threshold) {
        bail!("normalize.concept_threshold must be in [0.0, 1.0]");
    }

    match &config.blob_store {
        BlobStoreConfig::Filesystem(fs) => {
            if fs.object_name.trim().is_empty() {
                bail!("blob_store.object_name must not be empty");
            }
        }
        BlobStoreConfig::S3(s3) => {
            if s3.bucket.trim().is_empty() {
                bail!("blob_store.bucket must not be empty");
            }
            if s3.region.trim().is_empty() {
                bail!("blob_store.region must not be empty");
            }
            if s3.object_name.trim().is_empty() {
                bail!("blob_store.object_name must not be empty");
            }
            match s3.uri_scheme.as_str() {
                "s3" | "gs" => {}
                other => bail!(
                    "Unknown blob_store.uri_scheme: '{}'. Must be s3 or gs.",
                    other
                ),
            }
        }
    }

    if let CorpusConfig::Vertex(v) = &config.corpus {
        match &config.blob_store {
            BlobStoreConfig::S3(s3) if s3.uri_scheme == "gs" => {}
            _ => bail!(
                "corpus.backend = \"vertex\" imports from Cloud Storage; \
                 blob_store must be backend = \"s3\" with uri_scheme = \"gs\""
            ),
        }
        if v.project_id.trim().is_empty() {
            bail!("corpus.project_id must not be empty");
        }
        if v.location.trim().is_empty() {
            bail!("corpus.location must not be empty");
        }
        if v.corpus_name.trim().is_empty() {
            bail!("corpus.corpus_name must not be empty");
        }
    }

    let r = &config.retrieval;
    if r.default_top_k == 0 {
        bail!("retrieval.default_top_k must be >= 1");
    }
    if r.concept_overfetch == 0 {
        bail!("retrieval.concept_overfetch must be >= 1");
    }
    if r.id_lookup_k == 0 {
        bail!("retrieval.id_lookup_k must be >= 1");
    }
    if r.sample_top_k == 0 {
        bail!("retrieval.sample_top_k must be >= 1");
    }
    if r.sample_query.trim().is_empty() {
        bail!("retrieval.sample_query must not be empty");
    }

    Ok(())
}
