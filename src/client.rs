//! CoreNLP client: annotation requests over the server's HTTP interface
//!
//! Defines the backend trait and the typed response schema. Two
//! implementations:
//! - `CoreNlpClient`: talks to a CoreNLP server over HTTP (production)
//! - `MockBackend`: returns preconfigured responses (testing)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Text sent by `probe()`
pub const PROBE_TEXT: &str = "This is a test";

/// Which annotator stages to request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pipeline {
    /// Neural dependency parser
    #[default]
    Dependency,
    /// Constituency parser, converted to dependencies by the server. Slower.
    Constituency,
}

impl Pipeline {
    /// Comma-joined annotator list understood by CoreNLP
    pub fn annotators(&self) -> &'static str {
        match self {
            Pipeline::Dependency => "ssplit,tokenize,pos,lemma,depparse",
            Pipeline::Constituency => "ssplit,tokenize,pos,lemma,parse",
        }
    }
}

impl std::str::FromStr for Pipeline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dependency" | "depparse" => Ok(Pipeline::Dependency),
            "constituency" | "parse" => Ok(Pipeline::Constituency),
            other => Err(format!("unknown pipeline '{}'", other)),
        }
    }
}

/// Decoded annotation response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationResponse {
    pub sentences: Vec<AnnotatedSentence>,
}

/// One sentence of the response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSentence")]
pub struct AnnotatedSentence {
    pub tokens: Vec<AnnotatedToken>,
    /// Enhanced++ dependencies, or basic ones when the server sent only
    /// those; indices are 1-based with 0 for ROOT
    #[serde(rename = "enhancedPlusPlusDependencies")]
    pub dependencies: Vec<AnnotatedDependency>,
}

/// Sentence as sent on the wire; servers include several dependency flavours
#[derive(Deserialize)]
struct RawSentence {
    tokens: Vec<AnnotatedToken>,
    #[serde(rename = "enhancedPlusPlusDependencies", default)]
    enhanced_plus_plus: Option<Vec<AnnotatedDependency>>,
    #[serde(rename = "basicDependencies", default)]
    basic: Option<Vec<AnnotatedDependency>>,
}

impl TryFrom<RawSentence> for AnnotatedSentence {
    type Error = String;

    fn try_from(raw: RawSentence) -> Result<Self, Self::Error> {
        let dependencies = raw.enhanced_plus_plus.or(raw.basic).ok_or_else(|| {
            "missing field `enhancedPlusPlusDependencies` (or `basicDependencies`)".to_string()
        })?;
        Ok(Self {
            tokens: raw.tokens,
            dependencies,
        })
    }
}

/// Token as reported by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedToken {
    pub word: String,
    pub pos: String,
    pub lemma: String,
    pub character_offset_begin: usize,
    pub character_offset_end: usize,
}

/// Dependency as reported by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedDependency {
    /// 1-based head position, 0 for ROOT
    pub governor: usize,
    /// 1-based modifier position
    pub dependent: usize,
    /// Relation label, possibly with a `:subtype`
    pub dep: String,
}

/// Errors from annotation requests
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed annotation response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Backend able to annotate raw text.
///
/// Abstracts over transport so the parser doesn't depend on how the
/// annotation server is reached.
#[async_trait]
pub trait AnnotationBackend: Send + Sync {
    /// Pipeline used by `probe()`
    fn pipeline(&self) -> Pipeline;

    /// Annotate `text` with the given pipeline.
    async fn annotate(&self, text: &str, pipeline: Pipeline) -> ClientResult<AnnotationResponse>;

    /// Whether a well-formed response comes back for a fixed test string.
    /// Never fails; every error becomes `false`.
    async fn probe(&self) -> bool {
        match self.annotate(PROBE_TEXT, self.pipeline()).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Probe failed");
                false
            }
        }
    }
}

/// HTTP client for a CoreNLP server
#[derive(Debug, Clone)]
pub struct CoreNlpClient {
    url: String,
    pipeline: Pipeline,
    http: reqwest::Client,
}

impl CoreNlpClient {
    /// Create a client for the server at `url` (e.g. `http://localhost:9000`)
    pub fn new(url: impl Into<String>, pipeline: Pipeline, timeout: Duration) -> ClientResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            pipeline,
            http,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Value of the `properties` query parameter
    fn properties(pipeline: Pipeline) -> String {
        serde_json::json!({
            "annotators": pipeline.annotators(),
            "outputFormat": "json",
        })
        .to_string()
    }
}

#[async_trait]
impl AnnotationBackend for CoreNlpClient {
    fn pipeline(&self) -> Pipeline {
        self.pipeline
    }

    async fn annotate(&self, text: &str, pipeline: Pipeline) -> ClientResult<AnnotationResponse> {
        let response = self
            .http
            .post(&self.url)
            .query(&[("properties", Self::properties(pipeline))])
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(text.to_owned())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

/// Mock backend for testing. Returns preconfigured responses keyed by text.
pub struct MockBackend {
    available: bool,
    pipeline: Pipeline,
    responses: HashMap<String, AnnotationResponse>,
    failures: HashMap<String, u16>,
    calls: AtomicUsize,
}

impl MockBackend {
    /// A mock that answers probes and registered texts.
    pub fn available() -> Self {
        Self {
            available: true,
            pipeline: Pipeline::default(),
            responses: HashMap::new(),
            failures: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// A mock whose every request fails.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::available()
        }
    }

    /// Register the response for a given text.
    pub fn with_response(mut self, text: impl Into<String>, response: AnnotationResponse) -> Self {
        self.responses.insert(text.into(), response);
        self
    }

    /// Make requests for a given text fail with an HTTP status.
    pub fn with_failure(mut self, text: impl Into<String>, status: u16) -> Self {
        self.failures.insert(text.into(), status);
        self
    }

    /// Number of `annotate` calls so far, probes included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnnotationBackend for MockBackend {
    fn pipeline(&self) -> Pipeline {
        self.pipeline
    }

    async fn annotate(&self, text: &str, _pipeline: Pipeline) -> ClientResult<AnnotationResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.available {
            return Err(ClientError::Status {
                status: 503,
                body: "mock backend configured as unavailable".to_string(),
            });
        }
        if let Some(status) = self.failures.get(text) {
            return Err(ClientError::Status {
                status: *status,
                body: format!("mock failure for '{}'", text),
            });
        }
        if text == PROBE_TEXT {
            return Ok(AnnotationResponse { sentences: Vec::new() });
        }
        match self.responses.get(text) {
            Some(response) => Ok(response.clone()),
            None => Err(ClientError::Status {
                status: 404,
                body: format!("no mock response for '{}'", text),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "sentences": [{
            "index": 0,
            "basicDependencies": [{"dep": "ROOT", "governor": 0, "governorGloss": "ROOT", "dependent": 1, "dependentGloss": "Hi"}],
            "enhancedPlusPlusDependencies": [
                {"dep": "ROOT", "governor": 0, "governorGloss": "ROOT", "dependent": 1, "dependentGloss": "Hi"},
                {"dep": "punct", "governor": 1, "governorGloss": "Hi", "dependent": 2, "dependentGloss": "."}
            ],
            "tokens": [
                {"index": 1, "word": "Hi", "originalText": "Hi", "lemma": "hi", "characterOffsetBegin": 0, "characterOffsetEnd": 2, "pos": "UH", "before": "", "after": ""},
                {"index": 2, "word": ".", "originalText": ".", "lemma": ".", "characterOffsetBegin": 2, "characterOffsetEnd": 3, "pos": ".", "before": "", "after": ""}
            ]
        }]
    }"#;

    #[test]
    fn decodes_server_json_ignoring_extra_fields() {
        let response: AnnotationResponse = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(response.sentences.len(), 1);
        let sentence = &response.sentences[0];
        assert_eq!(sentence.tokens[0].word, "Hi");
        assert_eq!(sentence.tokens[1].character_offset_begin, 2);
        assert_eq!(sentence.dependencies.len(), 2);
        assert_eq!(sentence.dependencies[1].dep, "punct");
    }

    #[test]
    fn prefers_enhanced_plus_plus_over_basic() {
        let response: AnnotationResponse = serde_json::from_str(SAMPLE).unwrap();
        // SAMPLE's basic list has only the ROOT edge
        assert_eq!(response.sentences[0].dependencies.len(), 2);
    }

    #[test]
    fn falls_back_to_basic_dependencies() {
        let response: AnnotationResponse = serde_json::from_str(
            r#"{"sentences": [{
                "tokens": [{"word": "Hi", "pos": "UH", "lemma": "hi", "characterOffsetBegin": 0, "characterOffsetEnd": 2}],
                "basicDependencies": [{"dep": "ROOT", "governor": 0, "dependent": 1}]
            }]}"#,
        )
        .unwrap();
        let deps = &response.sentences[0].dependencies;
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].dep, "ROOT");
    }

    #[test]
    fn missing_dependencies_is_decode_error() {
        let err = serde_json::from_str::<AnnotationResponse>(
            r#"{"sentences": [{"tokens": []}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("basicDependencies"));
    }

    #[test]
    fn missing_tokens_is_decode_error() {
        let err = serde_json::from_str::<AnnotationResponse>(
            r#"{"sentences": [{"enhancedPlusPlusDependencies": []}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("tokens"));
    }

    #[test]
    fn pipeline_annotators() {
        assert_eq!(Pipeline::Dependency.annotators(), "ssplit,tokenize,pos,lemma,depparse");
        assert_eq!(Pipeline::Constituency.annotators(), "ssplit,tokenize,pos,lemma,parse");
        assert_eq!("parse".parse::<Pipeline>().unwrap(), Pipeline::Constituency);
        assert!("srl".parse::<Pipeline>().is_err());
    }

    #[test]
    fn properties_request_json_output() {
        let props: serde_json::Value =
            serde_json::from_str(&CoreNlpClient::properties(Pipeline::Dependency)).unwrap();
        assert_eq!(props["outputFormat"], "json");
        assert_eq!(props["annotators"], "ssplit,tokenize,pos,lemma,depparse");
    }

    #[tokio::test]
    async fn mock_probe_reflects_availability() {
        assert!(MockBackend::available().probe().await);
        assert!(!MockBackend::unavailable().probe().await);
    }

    #[tokio::test]
    async fn mock_returns_registered_response() {
        let response: AnnotationResponse = serde_json::from_str(SAMPLE).unwrap();
        let mock = MockBackend::available().with_response("Hi.", response.clone());
        let got = mock.annotate("Hi.", Pipeline::Dependency).await.unwrap();
        assert_eq!(got, response);
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn mock_failure_surfaces_status() {
        let mock = MockBackend::available().with_failure("boom", 500);
        let err = mock.annotate("boom", Pipeline::Dependency).await.unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn unreachable_server_probe_is_false() {
        let client = CoreNlpClient::new(
            "http://127.0.0.1:9",
            Pipeline::Dependency,
            Duration::from_secs(2),
        )
        .unwrap();
        assert!(!client.probe().await);
    }
}
