//! Corpus data model: documents, entity annotations and parsed sentences

mod document;
mod entity;
mod sentence;

pub use document::{Corpus, CorpusError, Document};
pub use entity::{Entity, EntityId, Span};
pub use sentence::{DependencyEdge, EntityAlignment, Sentence, Token};
