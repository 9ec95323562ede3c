//! Agent tool host.
//!
//! Exposes the retrieval tools over a JSON HTTP API so an agent host can
//! discover them and call them by name. Every tool is registered in a
//! [`ToolRegistry`] and dispatched through the same `POST /tools/{name}`
//! handler.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/tools/list` | Registered tools with parameter schemas |
//! | `POST` | `/tools/{name}` | Call a tool; returns `{ "results": [...] }` |
//! | `GET`  | `/agent` | Agent profile: name, model, instruction, tools |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `tool_error` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser-based agent
//! UIs can call the tools directly.

use anyhow::{bail, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::agent::AgentProfile;
use crate::config::Config;
use crate::error::RetrievalError;
use crate::retrieval::Retriever;
use crate::traits::{create_blob_store, create_corpus_service, ToolContext, ToolRegistry};

#[derive(Clone)]
struct AppState {
    tools: Arc<ToolRegistry>,
    ctx: ToolContext,
    agent: Arc<AgentProfile>,
}

/// Start the tool host on `[server].bind` against the configured corpus.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> Result<()> {
    let blob_store = create_blob_store(config)?;
    let corpus = create_corpus_service(config, blob_store)?;
    let retriever = Arc::new(Retriever::new(corpus, config.retrieval.clone()));
    run_server_with_retriever(config, retriever).await
}

/// Like [`run_server`], with an already-built retriever (e.g. over an
/// in-memory corpus).
pub async fn run_server_with_retriever(config: &Config, retriever: Arc<Retriever>) -> Result<()> {
    let app = build_router(config, retriever)?;

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "tool server listening");
    println!("Tool server listening on http://{}", config.server.bind);

    axum::serve(listener, app).await?;
    Ok(())
}

/// The router with all routes and CORS, without binding a socket.
pub fn build_router(config: &Config, retriever: Arc<Retriever>) -> Result<Router> {
    let registry = ToolRegistry::with_builtins();
    let agent = AgentProfile::from_config(&config.agent, &registry)?;
    info!(
        corpus = retriever.corpus_name(),
        tools = registry.len(),
        "registered retrieval tools"
    );

    let state = AppState {
        tools: Arc::new(registry),
        ctx: ToolContext::new(retriever),
        agent: Arc::new(agent),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Ok(Router::new()
        .route("/health", get(handle_health))
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/agent", get(handle_agent))
        .layer(cors)
        .with_state(state))
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn tool_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "tool_error".to_string(),
        message: message.into(),
    }
}

/// Invalid arguments are the caller's fault (400); anything else, usually
/// the corpus service failing, is a 500.
fn classify_tool_error(tool_name: &str, err: anyhow::Error) -> AppError {
    if let Some(RetrievalError::InvalidArgument(msg)) = err.downcast_ref::<RetrievalError>() {
        return bad_request(format!("{}: {}", tool_name, msg));
    }
    warn!(tool = tool_name, error = %format!("{:#}", err), "tool call failed");
    tool_error(format!("{}: {:#}", tool_name, err))
}

// ============ Parameter validation ============

/// Check `params` against a tool's parameter schema: required keys,
/// `string`/`integer` types and `minimum` on integers. A missing body
/// counts as an empty object.
pub fn validate_params(
    schema: &serde_json::Value,
    params: &serde_json::Value,
) -> Result<serde_json::Value> {
    let params_obj = match params {
        serde_json::Value::Object(map) => map.clone(),
        serde_json::Value::Null => serde_json::Map::new(),
        _ => bail!("parameters must be a JSON object"),
    };

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field in required.iter().filter_map(|v| v.as_str()) {
            if !params_obj.contains_key(field) {
                bail!("missing required parameter: {}", field);
            }
        }
    }

    let properties = schema.get("properties").and_then(|p| p.as_object());
    for (name, prop) in properties.into_iter().flatten() {
        let Some(value) = params_obj.get(name) else {
            continue;
        };
        match prop.get("type").and_then(|t| t.as_str()) {
            Some("string") if !value.is_string() => {
                bail!("parameter '{}' must be a string", name)
            }
            Some("integer") if !(value.is_i64() || value.is_u64()) => {
                bail!("parameter '{}' must be an integer", name)
            }
            _ => {}
        }
        if let (Some(min), Some(n)) = (
            prop.get("minimum").and_then(|m| m.as_i64()),
            value.as_i64(),
        ) {
            if n < min {
                bail!("parameter '{}' must be >= {}, got {}", name, min, n);
            }
        }
    }

    Ok(serde_json::Value::Object(params_obj))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /tools/list ============

/// One entry of `GET /tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object.
    pub parameters: serde_json::Value,
}

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    let tools = state
        .tools
        .tools()
        .iter()
        .map(|t| ToolInfo {
            name: t.name().to_string(),
            description: t.description().to_string(),
            parameters: t.parameters_schema(),
        })
        .collect();

    Json(ToolListResponse { tools })
}

// ============ POST /tools/{name} ============

async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tool = state
        .tools
        .find(&name)
        .ok_or_else(|| not_found(format!("no tool registered with name: {}", name)))?;

    let validated_params = validate_params(&tool.parameters_schema(), &params)
        .map_err(|e| bad_request(e.to_string()))?;

    let result = tool
        .execute(validated_params, &state.ctx)
        .await
        .map_err(|e| classify_tool_error(&name, e))?;

    Ok(Json(result))
}

// ============ GET /agent ============

async fn handle_agent(State(state): State<AppState>) -> Json<AgentProfile> {
    Json(state.agent.as_ref().clone())
}
