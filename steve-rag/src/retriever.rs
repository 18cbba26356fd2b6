//! Query embedding plus diversified lookup in a [`VectorIndex`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use crate::document::RetrievalResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;

/// Placeholder text used as context when nothing was retrieved.
pub const EMPTY_CONTEXT: &str = "(no related documentation found)";

/// Embeds a query and fetches its diversified neighbours.
///
/// One `Retriever` fixes one operating point (`k`, `diversity`); the pipeline
/// holds one for recommendations and one for research questions.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    k: usize,
    diversity: f32,
    timeout: Duration,
}

impl Retriever {
    /// Create a retriever returning up to `k` results at the given diversity.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, k: usize, diversity: f32) -> Self {
        Self { embedder, k, diversity, timeout: Duration::from_secs(60) }
    }

    /// Bound the query embedding call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Maximum number of results per query.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Relevance/diversity balance.
    pub fn diversity(&self) -> f32 {
        self.diversity
    }

    /// Retrieve up to `k` chunks related to `query`.
    ///
    /// An empty index returns no results without calling the embedder.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Timeout`] or the embedder's error if the query
    /// cannot be embedded.
    pub async fn retrieve(&self, index: &VectorIndex, query: &str) -> Result<Vec<RetrievalResult>> {
        if index.is_empty() {
            debug!("index is empty, skipping retrieval");
            return Ok(Vec::new());
        }

        let embedding = tokio::time::timeout(self.timeout, self.embedder.embed(query))
            .await
            .map_err(|_| RagError::Timeout {
                operation: format!("query embedding ({})", self.embedder.name()),
                seconds: self.timeout.as_secs(),
            })?
            .inspect_err(|e| error!(error = %e, "query embedding failed"))?;

        let results = index.query(&embedding, self.k, self.diversity)?;
        debug!(k = self.k, diversity = self.diversity, result_count = results.len(), "retrieved context");
        Ok(results)
    }
}

/// Format retrieved chunks as the `{context}` of a prompt.
pub fn format_context(results: &[RetrievalResult]) -> String {
    if results.is_empty() {
        return EMPTY_CONTEXT.to_string();
    }
    results
        .iter()
        .map(|r| format!("[{}]\n{}", r.source, r.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_labels_each_chunk_with_its_source() {
        let results = vec![
            RetrievalResult { text: "Use PostgreSQL.\n".into(), source: "adr/1.md".into(), relevance: 0.9 },
            RetrievalResult { text: "Use Kafka.".into(), source: "adr/2.md".into(), relevance: 0.4 },
        ];
        assert_eq!(format_context(&results), "[adr/1.md]\nUse PostgreSQL.\n\n[adr/2.md]\nUse Kafka.");
    }

    #[test]
    fn empty_context_has_placeholder() {
        assert_eq!(format_context(&[]), EMPTY_CONTEXT);
    }
}
