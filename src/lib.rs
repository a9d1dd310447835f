//! Kindred: CoreNLP-backed annotation pipeline
//!
//! Turns raw document text plus entity span annotations into per-sentence
//! graphs: tokens with part-of-speech and lemma, dependency edges, and the
//! token positions each entity covers.
//!
//! # Core Concepts
//!
//! - **Corpus**: documents with their entity annotations; parsing appends sentences
//! - **Parser**: a session bound to a CoreNLP server, launched locally if needed
//! - **Alignment**: entity character spans matched to the tokens they overlap
//!
//! # Example
//!
//! ```no_run
//! use kindred::{Corpus, Document, Entity, Parser, ParserConfig, Span};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let doc = Document::new("Erlotinib is a common treatment for NSCLC.")
//!     .with_entity(Entity::new(1, "drug", Span::new(0, 9)))
//!     .with_entity(Entity::new(2, "cancer", Span::new(36, 41)));
//! let mut corpus = Corpus::from_documents(vec![doc])?;
//!
//! let parser = Parser::connect(ParserConfig::default()).await?;
//! parser.parse(&mut corpus).await?;
//! assert!(corpus.is_parsed());
//! # Ok(())
//! # }
//! ```

pub mod align;
pub mod assets;
pub mod client;
pub mod config;
mod corpus;
pub mod parser;
pub mod server;

pub use align::{shorten_relation, SpanIndex};
pub use assets::{AssetError, AssetManager, ResourceBundle};
pub use client::{AnnotationBackend, ClientError, CoreNlpClient, MockBackend, Pipeline};
pub use config::{ConfigError, ParserConfig, ServerConfig};
pub use corpus::{
    Corpus, CorpusError, DependencyEdge, Document, Entity, EntityAlignment, EntityId, Sentence,
    Span, Token,
};
pub use parser::{ParseError, ParseResult, Parser};
pub use server::{ServerError, ServerSupervisor};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
