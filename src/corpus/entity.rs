//! Entity annotations supplied alongside the document text

use serde::{Deserialize, Serialize};

/// Identifier of an entity, unique within its document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u64);

impl EntityId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Half-open character interval `[start, end)` into a document's text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// True when the two intervals share at least one position.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A typed mention in the document, possibly discontinuous
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: EntityId,
    /// Type tag (e.g., "drug", "cancer")
    pub entity_type: String,
    /// One or more disjoint spans covering the mention
    pub spans: Vec<Span>,
}

impl Entity {
    /// Create an entity covering a single span
    pub fn new(entity_id: u64, entity_type: impl Into<String>, span: Span) -> Self {
        Self {
            entity_id: EntityId::new(entity_id),
            entity_type: entity_type.into(),
            spans: vec![span],
        }
    }

    /// Add another disjoint span to a discontinuous mention
    pub fn with_span(mut self, span: Span) -> Self {
        self.spans.push(span);
        self
    }

    /// Surface text of each span, joined by a single space
    pub fn text_in(&self, text: &str) -> String {
        self.spans
            .iter()
            .filter_map(|s| slice_chars(text, s.start, s.end))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Slice `text` by character (not byte) offsets.
fn slice_chars(text: &str, start: usize, end: usize) -> Option<&str> {
    let mut indices = text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len()));
    let byte_start = indices.by_ref().nth(start)?;
    let byte_end = if end > start {
        indices.nth(end - start - 1)?
    } else {
        byte_start
    };
    text.get(byte_start..byte_end)
}
