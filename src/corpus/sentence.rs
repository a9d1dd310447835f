//! Parsed sentence structures produced by the pipeline

use super::entity::{Entity, Span};
use serde::{Deserialize, Serialize};

/// A token with its tagging attributes and document offsets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Surface form
    pub word: String,
    /// Part-of-speech tag
    pub pos: String,
    pub lemma: String,
    /// Start offset into the document text
    pub start: usize,
    /// End offset (exclusive) into the document text
    pub end: usize,
}

impl Token {
    pub fn new(
        word: impl Into<String>,
        pos: impl Into<String>,
        lemma: impl Into<String>,
        start: usize,
        end: usize,
    ) -> Self {
        Self {
            word: word.into(),
            pos: pos.into(),
            lemma: lemma.into(),
            start,
            end,
        }
    }

    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }
}

/// A dependency relation between two tokens of the same sentence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// Index of the head token; `None` for the root attachment
    pub governor: Option<usize>,
    /// Index of the modifier token
    pub dependent: usize,
    /// Shortened relation label (e.g., "nsubj", "nmod:poss")
    pub relation: String,
}

impl DependencyEdge {
    pub fn new(governor: Option<usize>, dependent: usize, relation: impl Into<String>) -> Self {
        Self {
            governor,
            dependent,
            relation: relation.into(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.governor.is_none()
    }
}

/// An entity together with the indices of the tokens it overlaps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityAlignment {
    pub entity: Entity,
    pub token_indices: Vec<usize>,
}

/// One sentence of a parsed document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentence {
    pub tokens: Vec<Token>,
    pub dependencies: Vec<DependencyEdge>,
    /// Entities overlapping this sentence, ordered by entity ID
    pub entity_alignments: Vec<EntityAlignment>,
    pub source_filename: Option<String>,
}

impl Sentence {
    pub fn new(
        tokens: Vec<Token>,
        dependencies: Vec<DependencyEdge>,
        entity_alignments: Vec<EntityAlignment>,
        source_filename: Option<String>,
    ) -> Self {
        Self {
            tokens,
            dependencies,
            entity_alignments,
            source_filename,
        }
    }

    /// Span from the first token's start to the last token's end
    pub fn span(&self) -> Option<Span> {
        let first = self.tokens.first()?;
        let last = self.tokens.last()?;
        Some(Span::new(first.start, last.end))
    }

    /// Token indices aligned to the given entity, if it occurs here
    pub fn token_indices_for(&self, entity_id: super::EntityId) -> Option<&[usize]> {
        self.entity_alignments
            .iter()
            .find(|a| a.entity.entity_id == entity_id)
            .map(|a| a.token_indices.as_slice())
    }

    /// Edges whose governor is the given token
    pub fn dependents_of(&self, token: usize) -> impl Iterator<Item = &DependencyEdge> {
        self.dependencies
            .iter()
            .filter(move |e| e.governor == Some(token))
    }
}
