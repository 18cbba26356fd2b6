//! The vectorization capability: turns text into embedding vectors.

use async_trait::async_trait;

use crate::error::Result;

/// A provider that generates vector embeddings from text input.
///
/// The indexer embeds chunk texts through [`embed_batch`](EmbeddingProvider::embed_batch)
/// and the retrieval step embeds the query through [`embed`](EmbeddingProvider::embed).
/// Every vector returned by one provider must have [`dimensions`](EmbeddingProvider::dimensions)
/// elements, and batch output must preserve input order.
///
/// # Example
///
/// ```rust,ignore
/// use steve_rag::EmbeddingProvider;
///
/// let embedding = provider.embed("switch the storage driver to sqlx").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs, one per input, in order.
    ///
    /// The default implementation calls [`embed`](EmbeddingProvider::embed)
    /// sequentially. Backends with native batching should override it.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;
}
