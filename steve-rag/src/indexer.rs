//! Builds the [`VectorIndex`] over a documentation directory, once per process.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::chunking::Chunker;
use crate::config::PipelineConfig;
use crate::document::{Chunk, Document, EmbeddedChunk};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::loader::load_documents;

/// Load → chunk → embed → build, memoised.
///
/// The first call to [`index`](Indexer::index) builds the index; concurrent
/// first calls wait for that single build and every later call returns the
/// same `Arc`. A failed build is not cached, so a later call retries.
pub struct Indexer {
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: PipelineConfig,
    index: OnceCell<Arc<VectorIndex>>,
}

impl Indexer {
    /// Create an indexer. Nothing is loaded until [`index`](Indexer::index) is called.
    pub fn new(
        chunker: Arc<dyn Chunker>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: PipelineConfig,
    ) -> Self {
        Self { chunker, embedder, config, index: OnceCell::new() }
    }

    /// Return the index over `docs_dir`, building it on first use.
    ///
    /// The directory is only read by the call that performs the build.
    ///
    /// # Errors
    ///
    /// Propagates embedding failures and timeouts from the build.
    pub async fn index(&self, docs_dir: &Path) -> Result<Arc<VectorIndex>> {
        self.index.get_or_try_init(|| async { self.build(docs_dir).await.map(Arc::new) }).await.cloned()
    }

    /// The index, if it has been built.
    pub fn get(&self) -> Option<Arc<VectorIndex>> {
        self.index.get().cloned()
    }

    /// Build a fresh index over `docs_dir`, bypassing the memo.
    ///
    /// A missing or empty directory yields an empty index.
    ///
    /// # Errors
    ///
    /// Propagates embedding failures and timeouts.
    pub async fn build(&self, docs_dir: &Path) -> Result<VectorIndex> {
        let root: PathBuf = docs_dir.to_path_buf();
        let extensions = self.config.document_extensions.clone();
        let documents = tokio::task::spawn_blocking(move || load_documents(&root, &extensions))
            .await
            .map_err(|e| RagError::PipelineError(format!("document loading task failed: {e}")))?;

        info!(docs_dir = %docs_dir.display(), document_count = documents.len(), "loaded documents");
        self.build_from_documents(&documents).await
    }

    /// Chunk and embed already-loaded documents.
    ///
    /// # Errors
    ///
    /// Propagates embedding failures and timeouts.
    pub async fn build_from_documents(&self, documents: &[Document]) -> Result<VectorIndex> {
        let chunks = self.chunker.split(documents);
        if chunks.is_empty() {
            info!("no chunks to embed, index is empty");
            return Ok(VectorIndex::empty());
        }

        let chunk_count = chunks.len();
        let embedded = self.embed_chunks(chunks).await?;
        let index = VectorIndex::build(embedded)?;

        info!(
            document_count = documents.len(),
            chunk_count,
            entry_count = index.len(),
            dimensions = index.dimensions(),
            "built vector index"
        );
        Ok(index)
    }

    async fn embed_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<EmbeddedChunk>> {
        let batch_size = self.config.embedding_batch_size.max(1);
        let timeout = self.config.embedding_timeout();
        let provider = self.embedder.name().to_string();

        let batches: Vec<Vec<Chunk>> = chunks.chunks(batch_size).map(<[Chunk]>::to_vec).collect();
        let batch_count = batches.len();

        let results: Vec<Result<Vec<EmbeddedChunk>>> = futures::stream::iter(batches)
            .map(|batch| {
                let embedder = Arc::clone(&self.embedder);
                let provider = provider.clone();
                async move {
                    let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
                    let vectors = tokio::time::timeout(timeout, embedder.embed_batch(&texts))
                        .await
                        .map_err(|_| RagError::Timeout {
                            operation: format!("embedding batch ({provider})"),
                            seconds: timeout.as_secs(),
                        })??;

                    if vectors.len() != batch.len() {
                        return Err(RagError::EmbeddingError {
                            provider,
                            message: format!(
                                "expected {} vectors, got {}",
                                batch.len(),
                                vectors.len()
                            ),
                            transient: false,
                        });
                    }
                    Ok(batch
                        .into_iter()
                        .zip(vectors)
                        .map(|(chunk, embedding)| EmbeddedChunk { chunk, embedding })
                        .collect())
                }
            })
            .buffered(self.config.embedding_concurrency.max(1))
            .collect()
            .await;

        let mut embedded = Vec::new();
        for result in results {
            embedded.extend(result.inspect_err(|e| error!(error = %e, "embedding failed during indexing"))?);
        }
        info!(batch_count, chunk_count = embedded.len(), "embedded chunks");
        Ok(embedded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::RecursiveChunker;
    use crate::mock::MockEmbeddingProvider;
    use async_trait::async_trait;

    /// Never answers.
    struct StalledEmbedder;

    #[async_trait]
    impl EmbeddingProvider for StalledEmbedder {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            std::future::pending().await
        }

        fn dimensions(&self) -> usize {
            16
        }
    }

    fn indexer(embedder: Arc<MockEmbeddingProvider>, batch_size: usize) -> Indexer {
        let config = PipelineConfig::builder()
            .chunk_size(40)
            .chunk_overlap(10)
            .embedding_batch_size(batch_size)
            .build()
            .unwrap();
        Indexer::new(Arc::new(RecursiveChunker::new(40, 10)), embedder, config)
    }

    #[tokio::test]
    async fn batches_preserve_chunk_order() {
        let embedder = Arc::new(MockEmbeddingProvider::new(16));
        let indexer = indexer(Arc::clone(&embedder), 2);
        let text = "one two three four five six seven eight nine ten eleven twelve thirteen";
        let index = indexer.build_from_documents(&[Document::new("a.md", text)]).await.unwrap();

        let chunks = RecursiveChunker::new(40, 10).chunk(&Document::new("a.md", text));
        assert_eq!(index.len(), chunks.len());
        for (entry, chunk) in index.entries().iter().zip(&chunks) {
            assert_eq!(&entry.chunk, chunk);
        }
        assert_eq!(embedder.calls(), chunks.len().div_ceil(2));
    }

    #[tokio::test]
    async fn no_documents_means_no_embedding_calls() {
        let embedder = Arc::new(MockEmbeddingProvider::new(16));
        let index = indexer(Arc::clone(&embedder), 4).build_from_documents(&[]).await.unwrap();
        assert!(index.is_empty());
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn failed_build_is_not_memoised() {
        let embedder = Arc::new(MockEmbeddingProvider::failing(16, "offline"));
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("adr.md"), "Use PostgreSQL.").unwrap();

        let indexer = indexer(embedder, 4);
        assert!(indexer.index(dir.path()).await.is_err());
        assert!(indexer.get().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_embedding_batch_times_out() {
        let config = PipelineConfig::builder().embedding_timeout_secs(1).build().unwrap();
        let indexer = Indexer::new(Arc::new(RecursiveChunker::new(40, 10)), Arc::new(StalledEmbedder), config);

        let err = indexer
            .build_from_documents(&[Document::new("a.md", "Use PostgreSQL for storage.")])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Timeout { seconds: 1, .. }), "unexpected error: {err}");
    }
}
