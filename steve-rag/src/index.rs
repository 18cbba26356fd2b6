//! In-memory vector index with diversified (maximal marginal relevance) retrieval.
//!
//! [`VectorIndex`] is built once from embedded chunks and is read-only
//! afterwards, so any number of tasks can query a shared `Arc<VectorIndex>`
//! without locking.
//!
//! Similarity is cosine similarity for every index instance: between the query
//! and a candidate (relevance) and between two candidates (redundancy).

use std::collections::HashSet;

use tracing::debug;

use crate::document::{EmbeddedChunk, RetrievalResult};
use crate::error::{RagError, Result};

/// An append-once, read-many collection of embedded chunks.
///
/// # Example
///
/// ```rust,ignore
/// use steve_rag::VectorIndex;
///
/// let index = VectorIndex::build(embedded_chunks)?;
/// let results = index.query(&query_embedding, 6, 0.25)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    entries: Vec<EmbeddedChunk>,
    norms: Vec<f32>,
    dimensions: usize,
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity with precomputed norms. Returns 0.0 if either vector has zero magnitude.
fn cosine(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot / (norm_a * norm_b)
}

impl VectorIndex {
    /// An index with no entries. Every query against it returns nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build an index from embedded chunks, keeping their order.
    ///
    /// Entries repeating an earlier chunk identity (`source` + `sequence_index`)
    /// are dropped so that a query can never return the same chunk twice.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] if the vectors do not all share
    /// the dimensionality of the first one.
    pub fn build(entries: Vec<EmbeddedChunk>) -> Result<Self> {
        let dimensions = entries.first().map_or(0, |e| e.embedding.len());
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(entries.len());

        for entry in entries {
            if entry.embedding.len() != dimensions {
                return Err(RagError::DimensionMismatch {
                    expected: dimensions,
                    actual: entry.embedding.len(),
                });
            }
            if seen.insert(entry.chunk.id()) {
                kept.push(entry);
            } else {
                debug!(chunk.id = %entry.chunk.id(), "dropping duplicate chunk");
            }
        }

        let norms = kept.iter().map(|e| norm(&e.embedding)).collect();
        Ok(Self { entries: kept, norms, dimensions })
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dimensionality shared by all vectors, or 0 for an empty index.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// The stored entries in insertion order.
    pub fn entries(&self) -> &[EmbeddedChunk] {
        &self.entries
    }

    fn check_query(&self, query: &[f32]) -> Result<()> {
        if !self.is_empty() && query.len() != self.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }
        Ok(())
    }

    fn result(&self, i: usize, relevance: f32) -> RetrievalResult {
        let chunk = &self.entries[i].chunk;
        RetrievalResult { text: chunk.text.clone(), source: chunk.source.clone(), relevance }
    }

    /// Diversified retrieval of up to `k` entries.
    ///
    /// The first pick is always the most relevant entry. After that it
    /// repeatedly picks the unselected entry maximising
    /// `diversity * relevance - (1 - diversity) * redundancy`, where relevance is
    /// the cosine similarity to `query` and redundancy is the highest cosine
    /// similarity to any entry already picked. `diversity = 1.0` ranks purely
    /// by relevance; `diversity = 0.0` maximises spread. Ties go to the entry
    /// inserted first. `diversity` is clamped to `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] if a non-empty index is queried
    /// with a vector of the wrong length.
    pub fn query(&self, query: &[f32], k: usize, diversity: f32) -> Result<Vec<RetrievalResult>> {
        self.check_query(query)?;
        let diversity = diversity.clamp(0.0, 1.0);
        let query_norm = norm(query);
        let relevance: Vec<f32> = self
            .entries
            .iter()
            .zip(&self.norms)
            .map(|(e, &n)| cosine(query, query_norm, &e.embedding, n))
            .collect();

        let target = k.min(self.entries.len());
        let mut selected: Vec<usize> = Vec::with_capacity(target);
        let mut available = vec![true; self.entries.len()];
        let mut redundancy = vec![0.0f32; self.entries.len()];

        while selected.len() < target {
            let mut best: Option<(usize, f32)> = None;
            for i in (0..self.entries.len()).filter(|&i| available[i]) {
                let score = if selected.is_empty() {
                    relevance[i]
                } else {
                    diversity * relevance[i] - (1.0 - diversity) * redundancy[i]
                };
                if best.is_none_or(|(_, best_score)| score > best_score) {
                    best = Some((i, score));
                }
            }
            let Some((picked, _)) = best else { break };

            available[picked] = false;
            let picked_entry = &self.entries[picked];
            for j in (0..self.entries.len()).filter(|&j| available[j]) {
                let similarity = cosine(
                    &self.entries[j].embedding,
                    self.norms[j],
                    &picked_entry.embedding,
                    self.norms[picked],
                );
                if selected.is_empty() || similarity > redundancy[j] {
                    redundancy[j] = similarity;
                }
            }
            selected.push(picked);
        }

        Ok(selected.into_iter().map(|i| self.result(i, relevance[i])).collect())
    }

    /// Plain top-`k` retrieval ordered by descending relevance, ties by insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] on a query vector of the wrong length.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievalResult>> {
        self.check_query(query)?;
        let query_norm = norm(query);
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .zip(&self.norms)
            .enumerate()
            .map(|(i, (e, &n))| (i, cosine(query, query_norm, &e.embedding, n)))
            .collect();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored.into_iter().map(|(i, score)| self.result(i, score)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Chunk;

    fn entry(source: &str, seq: usize, embedding: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: Chunk {
                text: format!("{source} {seq}"),
                source: source.to_string(),
                sequence_index: seq,
                offset: 0,
            },
            embedding,
        }
    }

    #[test]
    fn build_rejects_mixed_dimensions() {
        let err = VectorIndex::build(vec![entry("a", 0, vec![1.0, 0.0]), entry("b", 0, vec![1.0])])
            .unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 2, actual: 1 }));
    }

    #[test]
    fn build_drops_duplicate_chunks() {
        let index =
            VectorIndex::build(vec![entry("a", 0, vec![1.0, 0.0]), entry("a", 0, vec![0.0, 1.0])])
                .unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn diversity_one_is_pure_relevance() {
        let index = VectorIndex::build(vec![
            entry("far", 0, vec![0.0, 1.0]),
            entry("near", 0, vec![1.0, 0.0]),
            entry("near_copy", 0, vec![0.99, 0.01]),
        ])
        .unwrap();
        let results = index.query(&[1.0, 0.0], 2, 1.0).unwrap();
        let sources: Vec<_> = results.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(sources, vec!["near", "near_copy"]);
    }

    #[test]
    fn low_diversity_skips_near_duplicates() {
        let index = VectorIndex::build(vec![
            entry("near", 0, vec![1.0, 0.0]),
            entry("near_copy", 0, vec![0.99, 0.01]),
            entry("other", 0, vec![0.5, 0.5]),
        ])
        .unwrap();
        let results = index.query(&[1.0, 0.0], 2, 0.25).unwrap();
        let sources: Vec<_> = results.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(sources, vec!["near", "other"]);
    }

    #[test]
    fn zero_diversity_still_starts_with_best_match() {
        let index = VectorIndex::build(vec![
            entry("irrelevant", 0, vec![0.0, 1.0]),
            entry("exact", 0, vec![1.0, 0.0]),
            entry("close", 0, vec![0.9, 0.1]),
        ])
        .unwrap();
        let results = index.query(&[1.0, 0.0], 2, 0.0).unwrap();
        let sources: Vec<_> = results.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(sources, vec!["exact", "irrelevant"]);
    }

    #[test]
    fn ties_go_to_first_inserted() {
        let index = VectorIndex::build(vec![
            entry("first", 0, vec![1.0, 0.0]),
            entry("second", 0, vec![1.0, 0.0]),
        ])
        .unwrap();
        let results = index.query(&[1.0, 0.0], 1, 0.5).unwrap();
        assert_eq!(results[0].source, "first");
    }

    #[test]
    fn empty_index_returns_nothing_for_any_query() {
        let index = VectorIndex::empty();
        assert!(index.query(&[1.0, 2.0, 3.0], 5, 0.5).unwrap().is_empty());
        assert!(index.search(&[1.0], 5).unwrap().is_empty());
    }

    #[test]
    fn query_rejects_wrong_dimension() {
        let index = VectorIndex::build(vec![entry("a", 0, vec![1.0, 0.0])]).unwrap();
        assert!(index.query(&[1.0, 0.0, 0.0], 1, 0.5).is_err());
    }
}
