//! Vertex AI RAG Engine corpus client.
//!
//! Talks to the `v1` REST surface directly:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | import | `POST {endpoint}/v1/{corpus}/ragFiles:import` |
//! | query  | `POST {endpoint}/v1/projects/{p}/locations/{l}:retrieveContexts` |
//!
//! `{corpus}` is `projects/{p}/locations/{l}/ragCorpora/{id}`. Imports are
//! long-running operations on the service side; the client returns the
//! operation name without waiting for indexing to finish.
//!
//! # Authentication
//!
//! An OAuth access token is read from the environment variable named by
//! `corpus.token_env` (default `GOOGLE_OAUTH_ACCESS_TOKEN`), e.g. the output
//! of `gcloud auth print-access-token`.
//!
//! # Retries
//!
//! - HTTP 429 or 5xx → retry with exponential backoff (1s, 2s, 4s, ...)
//! - HTTP 4xx (not 429) → fail immediately
//! - Network error → retry

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::VertexCorpusConfig;
use crate::models::{BlobLocation, ImportAck, QueryRequest, RawHit};
use crate::traits::CorpusService;

pub struct VertexRagCorpus {
    config: VertexCorpusConfig,
    resource_name: String,
    token: String,
    client: reqwest::Client,
}

impl VertexRagCorpus {
    pub fn new(config: VertexCorpusConfig, token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            resource_name: corpus_resource_name(&config),
            config,
            token,
            client,
        })
    }

    pub fn from_env(config: VertexCorpusConfig) -> Result<Self> {
        let token = std::env::var(&config.token_env)
            .map_err(|_| anyhow!("{} not set", config.token_env))?;
        if token.trim().is_empty() {
            bail!("{} is empty", config.token_env);
        }
        Self::new(config, token.trim().to_string())
    }

    fn endpoint(&self) -> String {
        match self.config.api_endpoint {
            Some(ref endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}-aiplatform.googleapis.com", self.config.location),
        }
    }

    fn import_url(&self) -> String {
        format!("{}/v1/{}/ragFiles:import", self.endpoint(), self.resource_name)
    }

    fn retrieve_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}:retrieveContexts",
            self.endpoint(),
            self.config.project_id,
            self.config.location
        )
    }

    /// POST `body` to `url`, retrying transient failures.
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(attempt, ?delay, "retrying vertex request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(url)
                .bearer_auth(&self.token)
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response.json().await?);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(%status, "vertex request failed, will retry");
                        last_err = Some(anyhow!("Vertex AI error {}: {}", status, body_text));
                        continue;
                    }

                    bail!("Vertex AI error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("Vertex AI request failed after retries")))
    }
}

#[async_trait]
impl CorpusService for VertexRagCorpus {
    fn name(&self) -> &str {
        &self.resource_name
    }

    async fn import(&self, location: &BlobLocation) -> Result<ImportAck> {
        let body = import_request_body(&location.uri);
        let resp = self
            .post_json(&self.import_url(), &body)
            .await
            .with_context(|| format!("ragFiles:import of {} failed", location.uri))?;

        Ok(ImportAck {
            corpus: self.resource_name.clone(),
            operation: operation_name(&resp),
        })
    }

    async fn query(&self, request: &QueryRequest) -> Result<Vec<RawHit>> {
        let body = retrieve_request_body(&self.resource_name, request);
        let resp = self
            .post_json(&self.retrieve_url(), &body)
            .await
            .context("retrieveContexts failed")?;
        parse_retrieve_response(&resp)
    }
}

/// Full `projects/.../ragCorpora/...` name; a configured full name is kept
/// as-is.
pub fn corpus_resource_name(config: &VertexCorpusConfig) -> String {
    if config.corpus_name.starts_with("projects/") {
        config.corpus_name.clone()
    } else {
        format!(
            "projects/{}/locations/{}/ragCorpora/{}",
            config.project_id, config.location, config.corpus_name
        )
    }
}

fn import_request_body(uri: &str) -> Value {
    serde_json::json!({
        "importRagFilesConfig": {
            "gcsSource": { "uris": [uri] }
        }
    })
}

fn retrieve_request_body(corpus: &str, request: &QueryRequest) -> Value {
    serde_json::json!({
        "vertexRagStore": {
            "ragResources": [{ "ragCorpus": corpus }]
        },
        "query": {
            "text": request.text,
            "ragRetrievalConfig": { "topK": request.top_k }
        }
    })
}

/// `name` of the long-running operation returned by `ragFiles:import`.
fn operation_name(resp: &Value) -> Option<String> {
    resp.get("name").and_then(|n| n.as_str()).map(String::from)
}

/// Map `contexts.contexts[]` to raw hits in service order.
///
/// An empty response (`{}`) means no hits. Newer responses carry a `score`
/// (higher is better); older ones only a `distance`, which becomes
/// `1 - distance`.
pub fn parse_retrieve_response(json: &Value) -> Result<Vec<RawHit>> {
    let contexts = match json.get("contexts") {
        None => return Ok(Vec::new()),
        Some(c) => match c.get("contexts") {
            None => return Ok(Vec::new()),
            Some(list) => list.as_array().ok_or_else(|| {
                anyhow!("Invalid retrieveContexts response: contexts.contexts is not an array")
            })?,
        },
    };

    let mut hits = Vec::with_capacity(contexts.len());
    for ctx in contexts {
        let text = ctx
            .get("text")
            .and_then(|t| t.as_str())
            .ok_or_else(|| anyhow!("Invalid retrieveContexts response: context without text"))?;

        let score = ctx
            .get("score")
            .and_then(|s| s.as_f64())
            .or_else(|| ctx.get("distance").and_then(|d| d.as_f64()).map(|d| 1.0 - d))
            .unwrap_or(0.0);

        hits.push(RawHit {
            text: text.to_string(),
            score,
            source_uri: ctx
                .get("sourceUri")
                .and_then(|s| s.as_str())
                .map(String::from),
        });
    }
    Ok(hits)
}
