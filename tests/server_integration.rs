//! The HTTP tool host, exercised the way an agent host calls it.
//!
//! The server runs in-process over the in-memory blob store and corpus, so
//! these tests need no network access beyond loopback.

use question_rag::config::{parse_config, Config};
use question_rag::corpus_text::build_corpus_text;
use question_rag::memory::{MemoryBlobStore, MemoryCorpus};
use question_rag::models::NormalizedQuestionRecord;
use question_rag::retrieval::Retriever;
use question_rag::server::run_server_with_retriever;
use question_rag::traits::{BlobStore, CorpusService};
use serde_json::{json, Value};
use std::sync::Arc;

fn record(id: &str, main: &str, concepts: &[&str], text: &str) -> NormalizedQuestionRecord {
    NormalizedQuestionRecord {
        id: id.to_string(),
        text: text.to_string(),
        main_concept: main.to_string(),
        concepts: concepts.iter().map(|c| c.to_string()).collect(),
    }
}

fn test_config(port: u16) -> Config {
    let mut cfg = parse_config(
        r#"
[blob_store]
backend = "filesystem"
root = "unused"

[corpus]
backend = "local"
index_path = "unused"

[agent]
instruction = "Find exam questions."
"#,
    )
    .unwrap();
    cfg.server.bind = format!("127.0.0.1:{}", port);
    cfg
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

/// Ingest a small corpus into memory and serve it on a free port.
async fn start_server() -> (u16, Arc<MemoryCorpus>) {
    let records = vec![
        record(
            "q_001",
            "Partnerships",
            &["Partnerships", "Tax"],
            "Explain how partnership profits are taxed.",
        ),
        record(
            "q_002",
            "Strategic Risk",
            &["Strategic Risk"],
            "Discuss the strategic risks facing SSBR.",
        ),
        record(
            "q_003",
            "Tax",
            &["Tax", "Partnerships"],
            "Compute the tax due on a partnership disposal.",
        ),
    ];
    let text = build_corpus_text(&records).unwrap();

    let store = Arc::new(MemoryBlobStore::new());
    let location = store
        .put("metadata_tagging_file.txt", text.as_bytes())
        .await
        .unwrap();
    let corpus = Arc::new(MemoryCorpus::new(store.clone()));
    corpus.import(&location).await.unwrap();

    let port = find_free_port();
    let cfg = test_config(port);
    let retriever = Arc::new(Retriever::new(corpus.clone(), cfg.retrieval.clone()));
    tokio::spawn(async move {
        run_server_with_retriever(&cfg, retriever).await.ok();
    });
    wait_for_server(port).await;

    (port, corpus)
}

async fn call(port: u16, tool: &str, params: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{}/tools/{}", port, tool))
        .json(&params)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn test_health_and_tool_listing() {
    let (port, _) = start_server().await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("http://127.0.0.1:{}/health", port))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let list: Value = client
        .get(format!("http://127.0.0.1:{}/tools/list", port))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let names: Vec<&str> = list["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            "retrieve_exam_questions",
            "retrieve_questions_by_concept",
            "retrieve_question_by_id"
        ]
    );
    assert_eq!(list["tools"][0]["parameters"]["required"], json!(["query"]));
}

#[tokio::test]
async fn test_agent_profile() {
    let (port, _) = start_server().await;
    let agent: Value = reqwest::get(format!("http://127.0.0.1:{}/agent", port))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(agent["name"], "question_rag");
    assert_eq!(agent["model"], "gemini-2.5-pro");
    assert_eq!(agent["instruction"], "Find exam questions.");
    assert_eq!(agent["tools"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_search_tool_returns_structured_hits() {
    let (port, corpus) = start_server().await;

    let (status, body) = call(
        port,
        "retrieve_exam_questions",
        json!({ "query": "strategic risks SSBR", "top_k": 2 }),
    )
    .await;
    assert_eq!(status, 200);
    let results = body["results"].as_array().unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0]["id"], "q_002");
    assert_eq!(results[0]["main_concept"], "Strategic Risk");
    assert_eq!(results[0]["concepts"], json!(["Strategic Risk"]));
    assert_eq!(
        results[0]["text"],
        "Discuss the strategic risks facing SSBR."
    );

    let last = corpus.queries().pop().unwrap();
    assert_eq!(last.top_k, 2);
}

#[tokio::test]
async fn test_default_top_k_comes_from_config() {
    let (port, corpus) = start_server().await;

    let (status, _) = call(port, "retrieve_exam_questions", json!({ "query": "tax" })).await;
    assert_eq!(status, 200);
    assert_eq!(corpus.queries().pop().unwrap().top_k, 5);
}

#[tokio::test]
async fn test_concept_tool_filters_by_tag() {
    let (port, _) = start_server().await;

    let (status, body) = call(
        port,
        "retrieve_questions_by_concept",
        json!({ "concept": "partnerships" }),
    )
    .await;
    assert_eq!(status, 200);
    let ids: Vec<&str> = body["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["q_001", "q_003"]);
}

#[tokio::test]
async fn test_id_tool_hit_and_miss() {
    let (port, _) = start_server().await;

    let (status, body) = call(
        port,
        "retrieve_question_by_id",
        json!({ "question_id": "Q_003" }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["results"].as_array().unwrap().len(), 1);
    assert_eq!(body["results"][0]["id"], "q_003");

    let (status, body) = call(
        port,
        "retrieve_question_by_id",
        json!({ "question_id": "q_404" }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["results"], json!([]));
}

#[tokio::test]
async fn test_error_contract() {
    let (port, _) = start_server().await;

    let (status, body) = call(port, "retrieve_exam_questions", json!({ "query": "  " })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("must not be empty"));

    let (status, body) = call(port, "retrieve_exam_questions", json!({})).await;
    assert_eq!(status, 400);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("missing required parameter: query"));

    let (status, _) = call(
        port,
        "retrieve_exam_questions",
        json!({ "query": "tax", "top_k": 0 }),
    )
    .await;
    assert_eq!(status, 400);

    let (status, body) = call(port, "delete_everything", json!({})).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");
}
