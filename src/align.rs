//! Entity-to-token alignment and dependency label normalization
//!
//! Entity spans are indexed once per document; every token span is then
//! queried against the index. Any non-empty intersection aligns the entity to
//! the token, so a token that only partially covers an entity still counts.

use crate::corpus::{Entity, EntityId, Span, Token};
use std::collections::BTreeMap;

/// Dependency labels whose subtype carries meaning and is kept intact.
const PRESERVED_RELATIONS: [&str; 7] = [
    "acl:relcl",
    "cc:preconj",
    "compound:prt",
    "det:predet",
    "nmod:npmod",
    "nmod:poss",
    "nmod:tmod",
];

/// Reduce a `base[:subtype]` relation label to its base, except for the
/// preserved compound labels.
///
/// ```
/// use kindred::align::shorten_relation;
///
/// assert_eq!(shorten_relation("nmod:poss"), "nmod:poss");
/// assert_eq!(shorten_relation("nmod:in"), "nmod");
/// assert_eq!(shorten_relation("nsubj"), "nsubj");
/// ```
pub fn shorten_relation(label: &str) -> &str {
    if PRESERVED_RELATIONS.contains(&label) {
        return label;
    }
    label.split(':').next().unwrap_or(label)
}

#[derive(Debug, Clone, Copy)]
struct Interval {
    span: Span,
    entity_id: EntityId,
}

/// Static interval index over entity spans
///
/// Intervals are kept sorted by start offset alongside a running maximum of
/// their end offsets. A query binary-searches past every interval that starts
/// at or after the query end, then walks backwards until the running maximum
/// shows nothing earlier can reach the query start.
#[derive(Debug, Clone, Default)]
pub struct SpanIndex {
    intervals: Vec<Interval>,
    /// `max_end[i]` = max end over `intervals[..=i]`
    max_end: Vec<usize>,
}

impl SpanIndex {
    /// Index every span of every entity, tagged with the owning entity ID
    pub fn build<'a>(entities: impl IntoIterator<Item = &'a Entity>) -> Self {
        let mut intervals: Vec<Interval> = entities
            .into_iter()
            .flat_map(|e| {
                e.spans.iter().map(move |span| Interval {
                    span: *span,
                    entity_id: e.entity_id,
                })
            })
            .filter(|i| !i.span.is_empty())
            .collect();
        intervals.sort_by_key(|i| (i.span.start, i.span.end, i.entity_id));

        let mut max_end = Vec::with_capacity(intervals.len());
        let mut running = 0;
        for interval in &intervals {
            running = running.max(interval.span.end);
            max_end.push(running);
        }

        Self { intervals, max_end }
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Entity IDs of every interval sharing at least one position with
    /// `[start, end)`. An entity is reported once per overlapping span.
    pub fn overlapping(&self, start: usize, end: usize) -> Vec<EntityId> {
        let query = Span::new(start, end);
        if query.is_empty() {
            return Vec::new();
        }

        // Intervals at or past this point start too late to overlap.
        let upper = self.intervals.partition_point(|i| i.span.start < end);

        let mut hits = Vec::new();
        for idx in (0..upper).rev() {
            if self.max_end[idx] <= start {
                break;
            }
            let interval = &self.intervals[idx];
            if interval.span.overlaps(&query) {
                hits.push(interval.entity_id);
            }
        }
        hits
    }
}

/// Align tokens to entities: entity ID → ascending, deduplicated token indices.
///
/// The map iterates in entity ID order, independent of index layout.
pub fn align(tokens: &[Token], index: &SpanIndex) -> BTreeMap<EntityId, Vec<usize>> {
    let mut aligned: BTreeMap<EntityId, Vec<usize>> = BTreeMap::new();
    for (i, token) in tokens.iter().enumerate() {
        for entity_id in index.overlapping(token.start, token.end) {
            let locs = aligned.entry(entity_id).or_default();
            // Tokens are visited in order, so a duplicate can only be the last entry.
            if locs.last() != Some(&i) {
                locs.push(i);
            }
        }
    }
    aligned
}
