//! Parser: runs documents through CoreNLP and assembles sentence graphs
//!
//! `Parser::connect` reaches a CoreNLP server, launching a local one when
//! none answers. `Parser::parse` annotates every document, aligns entities to
//! tokens and appends the resulting sentences to the corpus. A failure in any
//! document aborts the whole call and leaves the corpus untouched.

use crate::align::{align, shorten_relation, SpanIndex};
use crate::assets::{AssetError, AssetManager};
use crate::client::{
    AnnotatedSentence, AnnotationBackend, AnnotationResponse, ClientError, CoreNlpClient, Pipeline,
};
use crate::config::ParserConfig;
use crate::corpus::{Corpus, DependencyEdge, Document, EntityAlignment, Sentence, Token};
use crate::server::{ServerError, ServerSupervisor};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while parsing a corpus
#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("Annotation request failed for document {document}: {source}")]
    Client {
        document: usize,
        #[source]
        source: ClientError,
    },

    #[error("Cannot reach CoreNLP at {url}, even after launching a local server")]
    Connectivity { url: String },

    #[error("Unexpected annotation in document {document}, sentence {sentence}: {reason}")]
    Protocol {
        document: usize,
        sentence: usize,
        reason: String,
    },

    #[error("Cannot set up the CoreNLP client: {0}")]
    ClientSetup(#[source] ClientError),
}

/// Result type for parse operations
pub type ParseResult<T> = Result<T, ParseError>;

/// A parsing session bound to one annotation backend
pub struct Parser {
    backend: Arc<dyn AnnotationBackend>,
    pipeline: Pipeline,
    concurrency: usize,
    server: Option<ServerSupervisor>,
}

impl Parser {
    /// Use an existing CoreNLP server, or launch a local one if the
    /// configured URL doesn't answer a probe.
    pub async fn connect(config: ParserConfig) -> ParseResult<Self> {
        let client = CoreNlpClient::new(&config.corenlp_url, config.pipeline, config.request_timeout)
            .map_err(ParseError::ClientSetup)?;

        if client.probe().await {
            tracing::info!(url = %config.corenlp_url, "Using running CoreNLP server");
            return Ok(Self::with_backend(client, config.pipeline));
        }

        tracing::info!(url = %config.corenlp_url, "No CoreNLP server answered, launching one");
        let assets = AssetManager::new(config.resolved_cache_root()?);
        let server_dir = if config.download_if_missing {
            assets.ensure(&config.bundle).await?
        } else {
            assets
                .locate(&config.bundle)
                .unwrap_or_else(|| assets.cache_root().join(&config.bundle.directory_name))
        };

        let server = ServerSupervisor::start(&server_dir, &config.server).await?;

        if !client.probe().await {
            // `server` is dropped here, which kills it
            return Err(ParseError::Connectivity {
                url: config.corenlp_url,
            });
        }

        let mut parser = Self::with_backend(client, config.pipeline);
        parser.server = Some(server);
        Ok(parser)
    }

    /// Parser over any backend, without a managed server
    pub fn with_backend(backend: impl AnnotationBackend + 'static, pipeline: Pipeline) -> Self {
        Self {
            backend: Arc::new(backend),
            pipeline,
            concurrency: 1,
            server: None,
        }
    }

    /// Allow up to `n` annotation requests in flight at once
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn pipeline(&self) -> Pipeline {
        self.pipeline
    }

    /// Whether this session launched and owns a CoreNLP server
    pub fn manages_server(&self) -> bool {
        self.server.is_some()
    }

    /// Parse every document not parsed yet and append the sentences to it.
    ///
    /// Sentences are staged for all pending documents first and only
    /// committed once every one of them succeeded; the corpus is marked
    /// parsed at the same point. A corpus that is already parsed is left
    /// alone, and documents added after a parse are picked up by the next one.
    pub async fn parse(&self, corpus: &mut Corpus) -> ParseResult<()> {
        if corpus.is_parsed() {
            tracing::info!("Corpus already parsed, skipping");
            return Ok(());
        }

        let staged: Vec<(usize, Vec<Sentence>)> = stream::iter(corpus.unparsed_documents())
            .map(|(i, doc)| async move {
                let sentences = self.parse_document(i, doc).await?;
                Ok::<_, ParseError>((i, sentences))
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        corpus.commit_parse(staged);
        tracing::info!(documents = corpus.len(), "Corpus parsed");
        Ok(())
    }

    /// Annotate one document and build its sentences without mutating it
    pub async fn parse_document(&self, index: usize, doc: &Document) -> ParseResult<Vec<Sentence>> {
        tracing::debug!(document = index, chars = doc.text().len(), "Annotating document");
        let response = self
            .backend
            .annotate(doc.text(), self.pipeline)
            .await
            .map_err(|source| ParseError::Client {
                document: index,
                source,
            })?;
        assemble_sentences(index, doc, response)
    }

    /// Stop the managed server, if any. Dropping the parser does the same.
    pub async fn shutdown(&mut self) {
        if let Some(mut server) = self.server.take() {
            server.stop().await;
        }
    }
}

/// Turn an annotation response into sentences for `doc`.
pub fn assemble_sentences(
    doc_index: usize,
    doc: &Document,
    response: AnnotationResponse,
) -> ParseResult<Vec<Sentence>> {
    let index = SpanIndex::build(doc.entities());
    let entities = doc.entity_map();

    response
        .sentences
        .into_iter()
        .enumerate()
        .map(|(sentence_index, raw)| {
            let protocol = |reason: String| ParseError::Protocol {
                document: doc_index,
                sentence: sentence_index,
                reason,
            };

            let (tokens, dependencies) = convert_sentence(raw).map_err(protocol)?;

            let entity_alignments = align(&tokens, &index)
                .into_iter()
                .filter_map(|(id, token_indices)| {
                    entities.get(&id).map(|e| EntityAlignment {
                        entity: (*e).clone(),
                        token_indices,
                    })
                })
                .collect();

            Ok(Sentence::new(
                tokens,
                dependencies,
                entity_alignments,
                doc.source_filename().map(str::to_string),
            ))
        })
        .collect()
}

/// Validate and convert one sentence: tokens in order, 1-based dependency
/// positions shifted to 0-based with ROOT as `None`.
fn convert_sentence(raw: AnnotatedSentence) -> Result<(Vec<Token>, Vec<DependencyEdge>), String> {
    let mut tokens: Vec<Token> = Vec::with_capacity(raw.tokens.len());
    for t in raw.tokens {
        if t.character_offset_end < t.character_offset_begin {
            return Err(format!(
                "token '{}' ends before it starts ({}..{})",
                t.word, t.character_offset_begin, t.character_offset_end
            ));
        }
        if let Some(prev) = tokens.last() {
            if t.character_offset_begin < prev.end || t.character_offset_begin <= prev.start {
                return Err(format!(
                    "token '{}' at {} overlaps or precedes '{}' ending at {}",
                    t.word, t.character_offset_begin, prev.word, prev.end
                ));
            }
        }
        tokens.push(Token::new(
            t.word,
            t.pos,
            t.lemma,
            t.character_offset_begin,
            t.character_offset_end,
        ));
    }

    let n = tokens.len();
    let dependencies = raw
        .dependencies
        .into_iter()
        .map(|d| {
            if d.dependent == 0 || d.dependent > n {
                return Err(format!("dependent {} out of range 1..={}", d.dependent, n));
            }
            if d.governor > n {
                return Err(format!("governor {} out of range 0..={}", d.governor, n));
            }
            Ok(DependencyEdge::new(
                d.governor.checked_sub(1),
                d.dependent - 1,
                shorten_relation(&d.dep),
            ))
        })
        .collect::<Result<Vec<_>, String>>()?;

    Ok((tokens, dependencies))
}
