use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn qrag_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_qrag"))
}

const INPUT: &str = r#"{
  "questions": [
    {
      "question": "Explain how partnership profits are taxed.",
      "matches": [
        { "concept": "Partnerships", "score": 0.92 },
        { "concept": "Income Tax", "score": 0.41 },
        { "concept": "Ethics", "score": 0.12 },
        { "concept": "Audit", "score": 0.05 }
      ]
    },
    {
      "id": "ssbr-01",
      "main_concept": "Strategic Risk",
      "concepts": ["Strategic Risk", "Governance"],
      "text": "Discuss the strategic risks facing SSBR and how the board should respond."
    },
    { "id": "blank", "text": "   " },
    {
      "main_concept": "Audit",
      "concepts": ["Audit", "audit ", "Ethics"],
      "text": "What threats to auditor independence arise from long association?"
    }
  ]
}"#;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("input")).unwrap();
    fs::write(root.join("input/metadata_input.json"), INPUT).unwrap();

    let config_content = format!(
        r#"[paths]
input = "{root}/input/metadata_input.json"
normalized = "{root}/input/normalized_metadata.json"
corpus = "{root}/out/metadata_tagging_file.txt"

[blob_store]
backend = "filesystem"
root = "{root}/blobs"

[corpus]
backend = "local"
index_path = "{root}/index/corpus.txt"

[retrieval]
sample_query = "strategic risks"

[server]
bind = "127.0.0.1:7341"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("qrag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_qrag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = qrag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run qrag binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn ingest(config_path: &Path) {
    let (stdout, stderr, success) = run_qrag(config_path, &["ingest", "--progress", "off"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
}

#[test]
fn test_ingest_writes_artifacts_and_reports() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_qrag(&config_path, &["ingest", "--progress", "off"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("input records: 4"));
    assert!(stdout.contains("normalized records: 3"));
    assert!(stdout.contains("dropped #3 (blank): text is empty after trimming"));
    assert!(stdout.contains("uploaded: file://"));
    assert!(stdout.trim_end().ends_with("=== Ingestion complete ==="));

    let corpus = fs::read_to_string(tmp.path().join("out/metadata_tagging_file.txt")).unwrap();
    assert!(corpus.starts_with(
        "[ID: q_001]\n[MAIN_CONCEPT: Partnerships]\n[CONCEPTS: Partnerships; Income Tax; Ethics]\n\nExplain how partnership profits are taxed.\n\n---\n\n[ID: ssbr-01]"
    ));
    assert!(corpus.contains("[ID: q_004]\n[MAIN_CONCEPT: Audit]\n[CONCEPTS: Audit; Ethics]\n"));
    assert!(corpus.ends_with("---\n"));

    let blob = fs::read_to_string(tmp.path().join("blobs/metadata_tagging_file.txt")).unwrap();
    assert_eq!(blob, corpus);
    let index = fs::read_to_string(tmp.path().join("index/corpus.txt")).unwrap();
    assert_eq!(index, corpus);

    let normalized: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(tmp.path().join("input/normalized_metadata.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(normalized.as_array().unwrap().len(), 3);
    assert_eq!(normalized[1]["id"], "ssbr-01");
}

#[test]
fn test_ingest_human_progress_on_stderr() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_qrag(&config_path, &["ingest", "--progress", "human"]);
    assert!(success, "ingest failed: {}", stderr);
    for step in 1..=5 {
        assert!(stderr.contains(&format!("[STEP {}]", step)), "{}", stderr);
    }
    assert!(!stdout.contains("[STEP"));
}

#[test]
fn test_ingest_prints_steps_by_default() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_qrag(&config_path, &["ingest"]);
    assert!(success, "ingest failed: {}", stderr);
    for step in 1..=5 {
        assert!(stderr.contains(&format!("[STEP {}]", step)), "{}", stderr);
    }
    assert!(stdout.contains("=== Ingestion complete ==="));
}

#[test]
fn test_ingest_dry_run_skips_upload() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_qrag(&config_path, &["ingest", "--dry-run", "--progress", "off"]);
    assert!(success, "dry run failed: {}", stderr);
    assert!(stdout.contains("upload: skipped"));
    assert!(tmp.path().join("out/metadata_tagging_file.txt").exists());
    assert!(!tmp.path().join("blobs").exists());
    assert!(!tmp.path().join("index/corpus.txt").exists());
}

#[test]
fn test_ingest_missing_input_fails() {
    let (tmp, config_path) = setup_test_env();
    fs::remove_file(tmp.path().join("input/metadata_input.json")).unwrap();

    let (stdout, stderr, success) = run_qrag(&config_path, &["ingest", "--progress", "off"]);
    assert!(!success);
    assert!(stderr.contains("[STEP 1]"), "stderr={}", stderr);
    assert!(!stdout.contains("Ingestion complete"));
}

#[test]
fn test_ingest_id_collision_fails_without_upload() {
    let (tmp, config_path) = setup_test_env();
    fs::write(
        tmp.path().join("input/metadata_input.json"),
        r#"[
            {"id": "q_1", "main_concept": "A", "concepts": ["A"], "text": "one"},
            {"id": "Q_1", "main_concept": "B", "concepts": ["B"], "text": "two"}
        ]"#,
    )
    .unwrap();

    let (_, stderr, success) = run_qrag(&config_path, &["ingest", "--progress", "off"]);
    assert!(!success);
    assert!(stderr.contains("identifier collision"), "stderr={}", stderr);
    assert!(!tmp.path().join("input/normalized_metadata.json").exists());
    assert!(!tmp.path().join("blobs").exists());
}

#[test]
fn test_search_returns_result_cards() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (stdout, stderr, success) = run_qrag(&config_path, &["search", "strategic risks SSBR"]);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("---- Result 1 ----"));
    assert!(stdout.contains("ID          : ssbr-01"));
    assert!(stdout.contains("Concepts    : Strategic Risk, Governance"));
}

#[test]
fn test_search_json_and_top_k() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (stdout, stderr, success) =
        run_qrag(&config_path, &["search", "the", "--top-k", "1", "--json"]);
    assert!(success, "search failed: {}", stderr);
    let hits: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(hits.as_array().unwrap().len(), 1);
    assert!(hits[0]["score"].as_f64().unwrap() > 0.0);
}

#[test]
fn test_search_empty_query_fails() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (_, stderr, success) = run_qrag(&config_path, &["search", "   "]);
    assert!(!success);
    assert!(stderr.contains("must not be empty"), "stderr={}", stderr);
}

#[test]
fn test_search_before_ingest_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_qrag(&config_path, &["search", "tax"]);
    assert!(!success);
    assert!(stderr.contains("not been imported"), "stderr={}", stderr);
}

#[test]
fn test_concept_search_filters_by_tag() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (stdout, stderr, success) = run_qrag(&config_path, &["concept", "ethics", "--json"]);
    assert!(success, "concept failed: {}", stderr);
    let hits: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let ids: Vec<&str> = hits
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["q_001", "q_004"]);
}

#[test]
fn test_get_by_id() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (stdout, stderr, success) = run_qrag(&config_path, &["get", "SSBR-01"]);
    assert!(success, "get failed: {}", stderr);
    assert!(stdout.contains("ID          : ssbr-01"));
    assert!(stdout.contains("Discuss the strategic risks facing SSBR"));
}

#[test]
fn test_get_missing_id_is_not_an_error() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (stdout, stderr, success) = run_qrag(&config_path, &["get", "q_999"]);
    assert!(success, "get failed: {}", stderr);
    assert!(stdout.contains("No question found with id q_999"));

    let (stdout, _, success) = run_qrag(&config_path, &["get", "q_999", "--json"]);
    assert!(success);
    assert_eq!(stdout.trim(), "null");
}

#[test]
fn test_retrieval_test_prints_contexts() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (stdout, stderr, success) = run_qrag(&config_path, &["retrieval-test"]);
    assert!(success, "retrieval-test failed: {}", stderr);
    assert!(stdout.contains("Query: strategic risks"));
    assert!(stdout.contains("---- Context 1 ----"));
    assert!(stdout.contains("[ID: ssbr-01]"));
}

#[test]
fn test_invalid_config_fails() {
    let (tmp, config_path) = setup_test_env();
    let bad = tmp.path().join("config/bad.toml");
    fs::write(&bad, "[blob_store]\nbackend = \"filesystem\"\n").unwrap();

    let (_, stderr, success) = run_qrag(&bad, &["search", "x"]);
    assert!(!success);
    assert!(stderr.contains("Invalid config file"), "stderr={}", stderr);
    drop(config_path);
}
