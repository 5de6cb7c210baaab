use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use clap::Parser;
use parking_lot::Mutex;
use retrieval_core::error::OracleError;
use retrieval_core::oracle::{Completion, CompletionRequest};
use retrieval_core::persist::{load_answers, RunReport};
use retrieval_core::RankingResult;
use retriever::openai::OpenAiChat;
use retriever::{run, Cli, Summary};
use serde_json::{json, Value};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::net::TcpListener;

type Seen = Arc<Mutex<Vec<Value>>>;

async fn chat_completions(State(seen): State<Seen>, Json(body): Json<Value>) -> Result<Json<Value>, (StatusCode, String)> {
    seen.lock().push(body.clone());
    let prompt = body["messages"][0]["content"].as_str().unwrap_or_default().to_string();
    if prompt.contains("please fail") {
        return Err((StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded".into()));
    }
    let id = if prompt.contains("Alpha") { 1 } else { 2 };
    Ok(Json(json!({
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": format!("{{\"retrieve\": {id}}}") } }]
    })))
}

async fn spawn_fake_oracle() -> (SocketAddr, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().route("/v1/chat/completions", post(chat_completions)).with_state(seen.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    (addr, seen)
}

fn write_fixture(root: &Path) {
    fs::create_dir_all(root.join("finance")).unwrap();
    fs::create_dir_all(root.join("insurance")).unwrap();
    fs::create_dir_all(root.join("faq")).unwrap();
    fs::write(root.join("finance/1.json"), r#"{"combined_responses": "A", "raw_text": "Alpha doc"}"#).unwrap();
    fs::write(root.join("finance/2.json"), r#"{"combined_responses": "B", "raw_text": "Beta doc"}"#).unwrap();
    fs::write(root.join("insurance/2.json"), r#"{"combined_responses": ["clause"], "raw_text": "保單條款"}"#).unwrap();
    fs::write(root.join("faq/pid_map_content.json"), r#"{"1": [{"question": "Alpha?", "answers": ["yes"]}], "2": "other"}"#).unwrap();
    fs::write(
        root.join("questions.json"),
        r#"{"questions": [
            {"category": "finance", "qid": 7, "query": "which doc is about Alpha", "source": [1, 2]},
            {"category": "insurance", "qid": 3, "query": "please fail", "source": [2]},
            {"category": "faq", "qid": 1, "query": "faq lookup", "source": [1, 2]},
            {"category": "legal", "qid": 9, "query": "unknown", "source": [1]}
        ]}"#,
    )
    .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_writes_sorted_answers_and_report() {
    let (addr, seen) = spawn_fake_oracle().await;
    let dir = tempdir().unwrap();
    write_fixture(dir.path());
    let output = dir.path().join("out/pred.json");
    let report_path = dir.path().join("out/report.json");
    let api_base = format!("http://{addr}/v1");

    let args = Cli::parse_from([
        "retriever",
        "--question_path",
        dir.path().join("questions.json").to_str().unwrap(),
        "--source_path",
        dir.path().to_str().unwrap(),
        "--output_path",
        output.to_str().unwrap(),
        "--max_tasks",
        "2",
        "--api_base",
        &api_base,
        "--report_path",
        report_path.to_str().unwrap(),
    ]);
    let summary = run(&args).await.unwrap();
    assert_eq!(summary, Summary { total: 4, written: 2, failed: 2 });

    let answers = load_answers(&output).unwrap().answers;
    assert_eq!(answers, vec![RankingResult { qid: 1, retrieve: 1 }, RankingResult { qid: 7, retrieve: 1 }]);

    let report: RunReport = serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    let mut failed: Vec<u64> = report.failures.iter().map(|f| f.qid).collect();
    failed.sort();
    assert_eq!(failed, vec![3, 9]);
    assert!(fs::read_to_string(&output).unwrap().contains("\"answers\""));

    // unknown categories never reach the service
    let requests = seen.lock();
    assert_eq!(requests.len(), 3);
    for body in requests.iter() {
        assert_eq!(body["temperature"], json!(0.0));
        assert_eq!(body["max_tokens"], json!(100));
        assert_eq!(body["response_format"]["type"], json!("json_object"));
        assert_eq!(body["messages"][0]["role"], json!("user"));
    }
}

#[tokio::test]
async fn missing_corpus_directory_is_fatal() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("questions.json"), r#"{"questions": []}"#).unwrap();
    let args = Cli::parse_from([
        "retriever",
        "--question_path",
        dir.path().join("questions.json").to_str().unwrap(),
        "--source_path",
        dir.path().to_str().unwrap(),
        "--output_path",
        dir.path().join("pred.json").to_str().unwrap(),
    ]);
    assert!(run(&args).await.is_err());
    assert!(!dir.path().join("pred.json").exists());
}

#[tokio::test]
async fn backend_maps_status_and_empty_replies() {
    async fn empty(Json(_): Json<Value>) -> Json<Value> { Json(json!({ "choices": [] })) }
    let app = Router::new()
        .route("/v1/chat/completions", post(empty))
        .route("/v2/chat/completions", post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    let request = CompletionRequest { prompt: "hi".into(), temperature: 0.0, max_tokens: 10 };
    let v1 = OpenAiChat::new(&format!("http://{addr}/v1"), Some("sk-test".into()), "m", Duration::from_secs(5)).unwrap();
    assert!(matches!(v1.complete(&request).await, Err(OracleError::EmptyResponse)));

    let v2 = OpenAiChat::new(&format!("http://{addr}/v2"), None, "m", Duration::from_secs(5)).unwrap();
    match v2.complete(&request).await {
        Err(OracleError::Status { status, body }) => {
            assert_eq!(status, 429);
            assert_eq!(body, "slow down");
        }
        other => panic!("unexpected: {other:?}"),
    }
}
