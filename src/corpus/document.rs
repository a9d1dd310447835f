//! Documents and the corpus that owns them

use super::entity::{Entity, EntityId};
use super::sentence::Sentence;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading or saving a corpus
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Duplicate entity ID {0} in document")]
    DuplicateEntity(EntityId),
}

/// A document: raw text, its entity annotations and the parsed sentences
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    text: String,
    #[serde(default)]
    entities: Vec<Entity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_filename: Option<String>,
    #[serde(default)]
    sentences: Vec<Sentence>,
    #[serde(default)]
    parsed: bool,
}

impl Document {
    /// Create a document with no entities
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Set the originating filename
    pub fn with_source(mut self, filename: impl Into<String>) -> Self {
        self.source_filename = Some(filename.into());
        self
    }

    /// Add an entity annotation
    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn source_filename(&self) -> Option<&str> {
        self.source_filename.as_deref()
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    /// Whether this document's sentences came from a completed parse
    pub fn is_parsed(&self) -> bool {
        self.parsed
    }

    /// Look up an entity by ID
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|e| e.entity_id == id)
    }

    /// Map of entity ID to entity
    pub fn entity_map(&self) -> HashMap<EntityId, &Entity> {
        self.entities.iter().map(|e| (e.entity_id, e)).collect()
    }

    /// Append a parsed sentence
    pub fn add_sentence(&mut self, sentence: Sentence) {
        self.sentences.push(sentence);
    }

    /// Check that entity IDs are unique
    pub fn validate(&self) -> Result<(), CorpusError> {
        let mut seen = std::collections::HashSet::new();
        for e in &self.entities {
            if !seen.insert(e.entity_id) {
                return Err(CorpusError::DuplicateEntity(e.entity_id));
            }
        }
        Ok(())
    }
}

/// An ordered collection of documents
///
/// `parsed` is only ever true when every document currently in the corpus
/// went through one successful parse. Adding a document clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Corpus {
    documents: Vec<Document>,
    #[serde(default)]
    parsed: bool,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a corpus from documents, validating entity IDs
    pub fn from_documents(documents: Vec<Document>) -> Result<Self, CorpusError> {
        for d in &documents {
            d.validate()?;
        }
        Ok(Self {
            documents,
            parsed: false,
        })
    }

    /// Append a document; the corpus needs parsing again afterwards
    pub fn add_document(&mut self, document: Document) {
        self.documents.push(document);
        self.parsed = false;
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Whether every document has been parsed
    pub fn is_parsed(&self) -> bool {
        self.parsed
    }

    /// Documents not yet parsed, with their positions in the corpus
    pub fn unparsed_documents(&self) -> impl Iterator<Item = (usize, &Document)> {
        self.documents.iter().enumerate().filter(|(_, d)| !d.parsed)
    }

    /// Append staged sentences to the documents at the given positions,
    /// mark them parsed, and mark the corpus parsed.
    pub(crate) fn commit_parse(&mut self, staged: Vec<(usize, Vec<Sentence>)>) {
        for (index, sentences) in staged {
            if let Some(doc) = self.documents.get_mut(index) {
                for sentence in sentences {
                    doc.add_sentence(sentence);
                }
                doc.parsed = true;
            }
        }
        self.parsed = self.documents.iter().all(|d| d.parsed);
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Load a corpus from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CorpusError> {
        let raw = std::fs::read_to_string(path)?;
        let corpus: Corpus = serde_json::from_str(&raw)?;
        for d in &corpus.documents {
            d.validate()?;
        }
        Ok(corpus)
    }

    pub fn to_json_string(&self) -> Result<String, CorpusError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
