//! In-process stand-in for a CoreNLP server
//!
//! Answers `GET /` as a health check and `POST /` as an annotation request.
//! Known texts get canned JSON; anything else is split on whitespace and
//! punctuation into a flat parse. `GET /files/:name` serves bundle archives.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

#[derive(Default)]
struct StubState {
    canned: HashMap<String, Value>,
    files: HashMap<String, Vec<u8>>,
    fail_next: AtomicUsize,
    annotate_calls: AtomicUsize,
    health_calls: AtomicUsize,
    file_calls: AtomicUsize,
    last_properties: Mutex<Option<String>>,
}

/// Builder for a stub server
#[derive(Default)]
pub struct StubBuilder {
    state: StubState,
}

impl StubBuilder {
    /// Answer `text` with the given JSON body
    pub fn with_response(mut self, text: impl Into<String>, body: Value) -> Self {
        self.state.canned.insert(text.into(), body);
        self
    }

    /// Serve `bytes` at `/files/<name>`
    pub fn with_file(mut self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.state.files.insert(name.into(), bytes);
        self
    }

    /// Reject the next `n` annotation requests with HTTP 500
    pub fn failing_first(self, n: usize) -> Self {
        self.state.fail_next.store(n, Ordering::SeqCst);
        self
    }

    pub async fn spawn(self) -> StubCoreNlp {
        let state = Arc::new(self.state);
        let app = Router::new()
            .route("/", get(health).post(annotate))
            .route("/files/:name", get(file))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        StubCoreNlp { port, state, task }
    }
}

/// Handle to a running stub; the server stops when this is dropped
pub struct StubCoreNlp {
    pub port: u16,
    state: Arc<StubState>,
    task: JoinHandle<()>,
}

impl StubCoreNlp {
    pub fn builder() -> StubBuilder {
        StubBuilder::default()
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn file_url(&self, name: &str) -> String {
        format!("{}/files/{}", self.url(), name)
    }

    pub fn annotate_calls(&self) -> usize {
        self.state.annotate_calls.load(Ordering::SeqCst)
    }

    pub fn health_calls(&self) -> usize {
        self.state.health_calls.load(Ordering::SeqCst)
    }

    pub fn file_calls(&self) -> usize {
        self.state.file_calls.load(Ordering::SeqCst)
    }

    /// Decoded `properties` parameter of the latest annotation request
    pub fn last_properties(&self) -> Option<Value> {
        let raw = self.state.last_properties.lock().unwrap().clone()?;
        serde_json::from_str(&raw).ok()
    }
}

impl Drop for StubCoreNlp {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn health(State(state): State<Arc<StubState>>) -> &'static str {
    state.health_calls.fetch_add(1, Ordering::SeqCst);
    "StanfordCoreNLPServer stub"
}

async fn annotate(
    State(state): State<Arc<StubState>>,
    Query(params): Query<HashMap<String, String>>,
    body: String,
) -> Response {
    state.annotate_calls.fetch_add(1, Ordering::SeqCst);
    *state.last_properties.lock().unwrap() = params.get("properties").cloned();

    let fail = state
        .fail_next
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if fail {
        return (StatusCode::INTERNAL_SERVER_ERROR, "not ready").into_response();
    }

    let value = state
        .canned
        .get(&body)
        .cloned()
        .unwrap_or_else(|| flat_annotation(&body));
    Json(value).into_response()
}

async fn file(State(state): State<Arc<StubState>>, Path(name): Path<String>) -> Response {
    state.file_calls.fetch_add(1, Ordering::SeqCst);
    match state.files.get(&name) {
        Some(bytes) => bytes.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Tokenize on whitespace and punctuation, split sentences after `.!?`,
/// attach every token to the first one of its sentence.
pub fn flat_annotation(text: &str) -> Value {
    let mut sentences = Vec::new();
    let mut tokens: Vec<(String, usize, usize)> = Vec::new();
    let mut word_start: Option<usize> = None;
    let chars: Vec<char> = text.chars().collect();

    let mut flush_sentence = |tokens: &mut Vec<(String, usize, usize)>| {
        if !tokens.is_empty() {
            sentences.push(sentence_json(tokens));
            tokens.clear();
        }
    };

    for (i, c) in chars.iter().enumerate() {
        if c.is_alphanumeric() {
            word_start.get_or_insert(i);
            continue;
        }
        if let Some(start) = word_start.take() {
            tokens.push((chars[start..i].iter().collect(), start, i));
        }
        if c.is_ascii_punctuation() {
            tokens.push((c.to_string(), i, i + 1));
            if matches!(c, '.' | '!' | '?') {
                flush_sentence(&mut tokens);
            }
        }
    }
    if let Some(start) = word_start {
        tokens.push((chars[start..].iter().collect(), start, chars.len()));
    }
    flush_sentence(&mut tokens);

    json!({ "sentences": sentences })
}

fn sentence_json(tokens: &[(String, usize, usize)]) -> Value {
    let token_values: Vec<Value> = tokens
        .iter()
        .enumerate()
        .map(|(i, (word, start, end))| {
            let punct = word.chars().all(|c| c.is_ascii_punctuation());
            json!({
                "index": i + 1,
                "word": word,
                "originalText": word,
                "lemma": word.to_lowercase(),
                "characterOffsetBegin": start,
                "characterOffsetEnd": end,
                "pos": if punct { "." } else { "NN" },
            })
        })
        .collect();

    let mut deps = vec![json!({"dep": "ROOT", "governor": 0, "dependent": 1})];
    for (i, (word, _, _)) in tokens.iter().enumerate().skip(1) {
        let punct = word.chars().all(|c| c.is_ascii_punctuation());
        deps.push(json!({
            "dep": if punct { "punct" } else { "dep" },
            "governor": 1,
            "dependent": i + 1,
        }));
    }

    json!({
        "tokens": token_values,
        "basicDependencies": deps.clone(),
        "enhancedPlusPlusDependencies": deps,
    })
}
