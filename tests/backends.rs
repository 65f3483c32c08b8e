//! Backend integration tests against mock Ollama, OpenAI, and Pinecone
//! servers running on ephemeral ports.
//!
//! No test here needs network access or a model download: the hashing
//! encoder stands in for sentence embeddings.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use jarvis_core::context::ContextAssembler;
use jarvis_core::embedding::cosine_similarity;
use jarvis_core::models::RetrievedSnippet;
use jarvis_rag::config::{GenerationConfig, StoreConfig};
use jarvis_rag::embedding::{EmbeddingEncoder, HashingEncoder};
use jarvis_rag::generation::{BackendKind, GenerationRouter, ANSWER_INSTRUCTIONS};
use jarvis_rag::knowledge::{KnowledgeStore, UpsertOutcome};
use jarvis_rag::pinecone::PineconeIndex;

// ─── Helpers ────────────────────────────────────────────────────────

async fn bind() -> (tokio::net::TcpListener, String) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    (listener, url)
}

fn serve(listener: tokio::net::TcpListener, app: Router) {
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
}

/// Records request bodies and `Authorization` headers; optionally fails
/// every generation call with a fixed status.
#[derive(Default)]
struct LlmMock {
    requests: Mutex<Vec<Value>>,
    auth: Mutex<Vec<String>>,
    fail_with: Option<StatusCode>,
}

impl LlmMock {
    fn record(&self, headers: &HeaderMap, body: Value) {
        if let Some(v) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
            self.auth.lock().unwrap().push(v.to_string());
        }
        self.requests.lock().unwrap().push(body);
    }
}

async fn ollama_tags() -> Json<Value> {
    Json(json!({"models": [{"name": "llama2:latest", "size": 3825819519u64}]}))
}

async fn ollama_generate(
    State(mock): State<Arc<LlmMock>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    mock.record(&headers, body);
    if let Some(status) = mock.fail_with {
        return (status, "model runner crashed").into_response();
    }
    Json(json!({"model": "llama2", "response": "Ollama says hi", "done": true})).into_response()
}

async fn openai_chat(
    State(mock): State<Arc<LlmMock>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    mock.record(&headers, body);
    if let Some(status) = mock.fail_with {
        return (status, Json(json!({"error": {"message": "Incorrect API key provided"}})))
            .into_response();
    }
    Json(json!({
        "id": "chatcmpl-1",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "OpenAI says hi"},
            "finish_reason": "stop"
        }]
    }))
    .into_response()
}

async fn spawn_ollama(mock: Arc<LlmMock>) -> String {
    let (listener, url) = bind().await;
    let app = Router::new()
        .route("/api/tags", get(ollama_tags))
        .route("/api/generate", post(ollama_generate))
        .with_state(mock);
    serve(listener, app);
    url
}

async fn spawn_openai(mock: Arc<LlmMock>) -> String {
    let (listener, url) = bind().await;
    let app = Router::new()
        .route("/v1/chat/completions", post(openai_chat))
        .with_state(mock);
    serve(listener, app);
    format!("{}/v1", url)
}

/// Minimal Pinecone control and data plane on one port.
struct PineconeMock {
    host: String,
    api_key: String,
    indexes: Mutex<Vec<Value>>,
    create_requests: Mutex<Vec<Value>>,
    vectors: Mutex<Vec<(String, Vec<f32>, Value)>>,
}

impl PineconeMock {
    fn authorized(&self, headers: &HeaderMap) -> bool {
        headers.get("Api-Key").and_then(|v| v.to_str().ok()) == Some(self.api_key.as_str())
    }
}

async fn pc_list(State(mock): State<Arc<PineconeMock>>, headers: HeaderMap) -> Response {
    if !mock.authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "Invalid API Key").into_response();
    }
    let indexes = mock.indexes.lock().unwrap().clone();
    Json(json!({ "indexes": indexes })).into_response()
}

async fn pc_create(
    State(mock): State<Arc<PineconeMock>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !mock.authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "Invalid API Key").into_response();
    }
    let description = json!({
        "name": body["name"],
        "dimension": body["dimension"],
        "metric": body["metric"],
        "host": mock.host,
        "status": {"ready": true, "state": "Ready"}
    });
    mock.create_requests.lock().unwrap().push(body);
    mock.indexes.lock().unwrap().push(description.clone());
    (StatusCode::CREATED, Json(description)).into_response()
}

async fn pc_upsert(State(mock): State<Arc<PineconeMock>>, Json(body): Json<Value>) -> Json<Value> {
    let mut vectors = mock.vectors.lock().unwrap();
    let incoming = body["vectors"].as_array().cloned().unwrap_or_default();
    let count = incoming.len();
    for v in incoming {
        let id = v["id"].as_str().unwrap().to_string();
        let values: Vec<f32> = serde_json::from_value(v["values"].clone()).unwrap();
        let metadata = v["metadata"].clone();
        vectors.retain(|(existing, _, _)| existing != &id);
        vectors.push((id, values, metadata));
    }
    Json(json!({ "upsertedCount": count }))
}

async fn pc_query(State(mock): State<Arc<PineconeMock>>, Json(body): Json<Value>) -> Json<Value> {
    let query: Vec<f32> = serde_json::from_value(body["vector"].clone()).unwrap();
    let top_k = body["topK"].as_u64().unwrap() as usize;
    let vectors = mock.vectors.lock().unwrap();
    let mut scored: Vec<(f32, &String, &Value)> = vectors
        .iter()
        .map(|(id, values, meta)| (cosine_similarity(&query, values), id, meta))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());
    let matches: Vec<Value> = scored
        .into_iter()
        .take(top_k)
        .map(|(score, id, meta)| json!({"id": id, "score": score, "metadata": meta}))
        .collect();
    Json(json!({ "matches": matches, "namespace": "" }))
}

async fn pc_stats(State(mock): State<Arc<PineconeMock>>) -> Json<Value> {
    let n = mock.vectors.lock().unwrap().len();
    Json(json!({ "dimension": 384, "totalVectorCount": n }))
}

async fn spawn_pinecone(existing: Vec<Value>) -> (Arc<PineconeMock>, StoreConfig) {
    let (listener, url) = bind().await;
    let mock = Arc::new(PineconeMock {
        host: url.clone(),
        api_key: "pc-test".to_string(),
        indexes: Mutex::new(existing),
        create_requests: Mutex::new(Vec::new()),
        vectors: Mutex::new(Vec::new()),
    });
    let app = Router::new()
        .route("/indexes", get(pc_list).post(pc_create))
        .route("/vectors/upsert", post(pc_upsert))
        .route("/query", post(pc_query))
        .route("/describe_index_stats", post(pc_stats))
        .with_state(Arc::clone(&mock));
    serve(listener, app);

    let config = StoreConfig {
        controller_url: url,
        ..StoreConfig::default()
    };
    (mock, config)
}

fn encoder() -> Arc<dyn EmbeddingEncoder> {
    Arc::new(HashingEncoder::new(384).unwrap())
}

fn paris_block() -> jarvis_core::context::ContextBlock {
    ContextAssembler::default().assemble(&[RetrievedSnippet {
        text: "Paris is the capital of France".to_string(),
        source: "encyclopedia".to_string(),
        score: 0.83,
    }])
}

// ─── Generation ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_ollama_receives_full_prompt() {
    let mock = Arc::new(LlmMock::default());
    let url = spawn_ollama(Arc::clone(&mock)).await;

    let mut config = GenerationConfig::default();
    config.backend = "local".to_string();
    config.ollama.url = url;
    let router = GenerationRouter::from_config(&config, None).await;
    assert_eq!(router.status().unwrap().kind, BackendKind::Local);

    let text = router.generate("What is the capital of France?", &paris_block()).await;
    assert_eq!(text, "Ollama says hi");

    let requests = mock.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let body = &requests[0];
    assert_eq!(body["model"], "llama2");
    assert_eq!(body["stream"], false);
    assert_eq!(body["system"], "You are Jarvis, a helpful AI assistant.");
    assert_eq!(body["options"]["num_predict"], 500);
    let prompt = body["prompt"].as_str().unwrap();
    assert!(prompt.starts_with("Context information:\nParis is the capital of France\n\n"));
    assert!(prompt.contains("User question: What is the capital of France?"));
    assert!(prompt.ends_with(ANSWER_INSTRUCTIONS));
}

#[tokio::test]
async fn test_ollama_error_becomes_apology() {
    let mock = Arc::new(LlmMock {
        fail_with: Some(StatusCode::INTERNAL_SERVER_ERROR),
        ..LlmMock::default()
    });
    let url = spawn_ollama(mock).await;

    let mut config = GenerationConfig::default();
    config.backend = "local".to_string();
    config.ollama.url = url;
    let router = GenerationRouter::from_config(&config, None).await;

    let text = router.generate("hello", &Default::default()).await;
    assert!(text.starts_with("I'm sorry, I encountered an error:"));
    assert!(text.contains("500"));
    assert!(text.contains("Ollama is running with the llama2 model"));
}

#[tokio::test]
async fn test_openai_preferred_with_key() {
    let mock = Arc::new(LlmMock::default());
    let base_url = spawn_openai(Arc::clone(&mock)).await;

    let mut config = GenerationConfig::default();
    config.openai.base_url = base_url;
    config.ollama.url = "http://127.0.0.1:1".to_string();
    let router = GenerationRouter::from_config(&config, Some("sk-test")).await;
    assert_eq!(router.status().unwrap().kind, BackendKind::Cloud);

    let text = router.generate("hello", &Default::default()).await;
    assert_eq!(text, "OpenAI says hi");

    assert_eq!(mock.auth.lock().unwrap().as_slice(), ["Bearer sk-test"]);
    let requests = mock.requests.lock().unwrap();
    let body = &requests[0];
    assert_eq!(body["model"], "gpt-3.5-turbo");
    assert_eq!(body["max_tokens"], 500);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["role"], "user");
    assert!(body["messages"][1]["content"]
        .as_str()
        .unwrap()
        .starts_with("User question: hello"));
}

#[tokio::test]
async fn test_openai_rejected_key_becomes_apology() {
    let mock = Arc::new(LlmMock {
        fail_with: Some(StatusCode::UNAUTHORIZED),
        ..LlmMock::default()
    });
    let base_url = spawn_openai(mock).await;

    let mut config = GenerationConfig::default();
    config.backend = "cloud".to_string();
    config.openai.base_url = base_url;
    let router = GenerationRouter::from_config(&config, Some("sk-wrong")).await;

    let text = router.generate("hello", &Default::default()).await;
    assert!(text.starts_with("I'm sorry, I encountered an error with OpenAI:"));
    assert!(text.contains("authentication rejected"));
    assert!(text.ends_with("Please check your API key."));
}

// ─── Pinecone ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_pinecone_creates_index_and_round_trips() {
    let (mock, config) = spawn_pinecone(Vec::new()).await;
    let store = KnowledgeStore::connect(&config, Some("pc-test"), encoder()).await;
    assert!(store.is_available());
    assert_eq!(store.status().backend, "pinecone");

    {
        let created = mock.create_requests.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0]["name"], "jarvis-knowledge");
        assert_eq!(created[0]["dimension"], 384);
        assert_eq!(created[0]["metric"], "cosine");
        assert_eq!(created[0]["spec"]["serverless"]["cloud"], "aws");
        assert_eq!(created[0]["spec"]["serverless"]["region"], "us-east-1");
    }

    let paris = store
        .upsert(&jarvis_core::models::Document::new(
            "Paris is the capital of France",
            "encyclopedia",
        ))
        .await;
    assert!(matches!(paris, UpsertOutcome::Stored(_)));
    store
        .upsert(&jarvis_core::models::Document::new(
            "Rust ownership rules prevent data races",
            "rust-book",
        ))
        .await;

    let hits = store.query("What is the capital of France?", 3).await;
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].source, "encyclopedia");
    assert_eq!(hits[0].text, "Paris is the capital of France");
    assert!(hits[0].score > 0.5);
    assert_eq!(store.count().await, Some(2));
}

#[tokio::test]
async fn test_pinecone_reuses_existing_index() {
    let existing = vec![json!({"name": "jarvis-knowledge", "dimension": 384, "metric": "cosine", "host": "placeholder"})];
    let (mock, config) = spawn_pinecone(existing).await;
    // Point the existing index at the mock's data plane.
    mock.indexes.lock().unwrap()[0]["host"] = json!(mock.host.clone());

    let index = PineconeIndex::connect(&config, "pc-test", 384).await.unwrap();
    assert_eq!(index.index_name(), "jarvis-knowledge");
    assert!(mock.create_requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_pinecone_dimension_mismatch_is_rejected() {
    let existing = vec![json!({"name": "jarvis-knowledge", "dimension": 1536, "metric": "cosine", "host": "unused"})];
    let (_mock, config) = spawn_pinecone(existing).await;

    let err = PineconeIndex::connect(&config, "pc-test", 384)
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("dimension 1536"));

    let store = KnowledgeStore::connect(&config, Some("pc-test"), encoder()).await;
    assert!(!store.is_available());
}

#[tokio::test]
async fn test_pinecone_bad_key_degrades_store() {
    let (_mock, config) = spawn_pinecone(Vec::new()).await;
    let store = KnowledgeStore::connect(&config, Some("wrong-key"), encoder()).await;
    assert!(!store.is_available());
    assert_eq!(
        store
            .upsert(&jarvis_core::models::Document::new("text", "src"))
            .await,
        UpsertOutcome::Unavailable
    );
    assert!(store.query("text", 3).await.is_empty());
}
