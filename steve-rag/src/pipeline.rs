//! ADR pipeline orchestrator.
//!
//! The [`AdrPipeline`] composes the [`Indexer`], the [`Summarizer`] and the
//! [`RecommendationChain`] around one documentation directory. The index is
//! built on first use and shared by every later call.
//!
//! # Example
//!
//! ```rust,ignore
//! use steve_rag::{AdrPipeline, PipelineConfig};
//!
//! let pipeline = AdrPipeline::builder()
//!     .config(PipelineConfig::default())
//!     .docs_dir("docs/adr")
//!     .embedding_provider(Arc::new(embedder))
//!     .generator(Arc::new(generator))
//!     .build()?;
//!
//! let report = pipeline.run(&diff).await?;
//! println!("{}", report.render());
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::audit::{AuditReport, Auditor};
use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::PipelineConfig;
use crate::document::Report;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::TextGenerator;
use crate::index::VectorIndex;
use crate::indexer::Indexer;
use crate::prompts::{NO_CHANGES_ANSWER, SEARCH_INSTRUCTION};
use crate::recommend::{RecommendationChain, RecommendationStream, build_query};
use crate::retriever::Retriever;
use crate::summarizer::Summarizer;

/// The ADR recommendation pipeline.
///
/// Runs index → summarize → recommend for a diff. Construct one via
/// [`AdrPipeline::builder()`].
pub struct AdrPipeline {
    config: PipelineConfig,
    docs_dir: PathBuf,
    indexer: Indexer,
    summarizer: Summarizer,
    recommender: RecommendationChain,
    librarian: RecommendationChain,
    auditor: Auditor,
}

impl AdrPipeline {
    /// Create a new [`AdrPipelineBuilder`].
    pub fn builder() -> AdrPipelineBuilder {
        AdrPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The documentation directory this pipeline indexes.
    pub fn docs_dir(&self) -> &Path {
        &self.docs_dir
    }

    /// Return the documentation index, building it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] if the index cannot be built.
    pub async fn index(&self) -> Result<Arc<VectorIndex>> {
        self.indexer.index(&self.docs_dir).await.map_err(|e| {
            error!(docs_dir = %self.docs_dir.display(), error = %e, "indexing failed");
            RagError::PipelineError(format!(
                "failed to index '{}': {e}",
                self.docs_dir.display()
            ))
        })
    }

    /// Stage 1 on its own: describe the decisions in `diff`.
    ///
    /// # Errors
    ///
    /// Propagates generation failures.
    pub async fn summarize(&self, diff: &str) -> Result<String> {
        self.summarizer.summarize(diff).await
    }

    /// Start a recommendation for `diff` and return its fragment stream.
    ///
    /// The index is built first. A blank diff yields a fixed answer without
    /// calling the generator.
    ///
    /// # Errors
    ///
    /// Fails if indexing fails, if stage 1 fails (unless `summary_fallback`
    /// is set), or if stage 2 cannot be started.
    pub async fn start(&self, diff: &str) -> Result<RecommendationStream> {
        let index = self.index().await?;

        if diff.trim().is_empty() {
            info!("diff is blank, skipping recommendation");
            return Ok(RecommendationStream::fixed(NO_CHANGES_ANSWER));
        }

        let description = match self.summarizer.summarize(diff).await {
            Ok(description) => description,
            Err(e) if self.config.summary_fallback => {
                warn!(error = %e, "summary failed, retrieving with the raw diff only");
                String::new()
            }
            Err(e) => {
                error!(error = %e, "summary failed");
                return Err(RagError::PipelineError(format!("failed to summarize diff: {e}")));
            }
        };

        let query = build_query(diff, &description);
        self.recommender.stream(&index, &query).await.map_err(|e| {
            error!(error = %e, "recommendation failed to start");
            RagError::PipelineError(format!("failed to start recommendation: {e}"))
        })
    }

    /// Run the whole pipeline for `diff` and collect the report.
    ///
    /// # Errors
    ///
    /// Fails on any fatal stage error, including a failure mid-stream.
    pub async fn run(&self, diff: &str) -> Result<Report> {
        let report = self.start(diff).await?.finish().await?;
        info!(answer_len = report.answer.len(), source_count = report.sources.len(), "pipeline completed");
        Ok(report)
    }

    /// Explain what the documentation says about `question`, streamed.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] for a blank question, and
    /// propagates indexing, retrieval and generation failures.
    pub async fn search(&self, question: &str) -> Result<RecommendationStream> {
        if question.trim().is_empty() {
            return Err(RagError::PipelineError("search question is empty".to_string()));
        }
        let index = self.index().await?;
        self.librarian.stream(&index, question.trim()).await
    }

    /// Audit how well the decisions in `diff` are documented.
    ///
    /// # Errors
    ///
    /// Propagates indexing, retrieval and generation failures.
    pub async fn audit(&self, diff: &str) -> Result<AuditReport> {
        let index = self.index().await?;
        self.auditor.audit(&index, diff).await
    }
}

/// Builder for constructing an [`AdrPipeline`].
///
/// `docs_dir`, `embedding_provider` and `generator` are required. Without an
/// explicit config the defaults are used; without an explicit chunker a
/// [`RecursiveChunker`] sized from the config is used.
#[derive(Default)]
pub struct AdrPipelineBuilder {
    config: Option<PipelineConfig>,
    docs_dir: Option<PathBuf>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    generator: Option<Arc<dyn TextGenerator>>,
    chunker: Option<Arc<dyn Chunker>>,
}

impl AdrPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the documentation directory.
    pub fn docs_dir(mut self, docs_dir: impl Into<PathBuf>) -> Self {
        self.docs_dir = Some(docs_dir.into());
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the text generator used by every stage.
    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Override the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Build the [`AdrPipeline`], validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or the
    /// configuration is invalid.
    pub fn build(self) -> Result<AdrPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let docs_dir =
            self.docs_dir.ok_or_else(|| RagError::ConfigError("docs_dir is required".to_string()))?;
        let embedder = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let generator = self
            .generator
            .ok_or_else(|| RagError::ConfigError("generator is required".to_string()))?;
        let chunker = self.chunker.unwrap_or_else(|| {
            Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap))
        });

        let policy = config.generation_policy();
        let embedding_timeout = config.embedding_timeout();
        let retriever = Retriever::new(Arc::clone(&embedder), config.retrieval_k, config.diversity)
            .with_timeout(embedding_timeout);
        let research =
            Retriever::new(Arc::clone(&embedder), config.research_k, config.research_diversity)
                .with_timeout(embedding_timeout);

        Ok(AdrPipeline {
            indexer: Indexer::new(chunker, embedder, config.clone()),
            summarizer: Summarizer::new(Arc::clone(&generator))
                .with_temperature(config.summarizer_temperature)
                .with_policy(policy),
            recommender: RecommendationChain::new(Arc::clone(&generator), retriever)
                .with_temperature(config.recommender_temperature)
                .with_policy(policy),
            librarian: RecommendationChain::new(Arc::clone(&generator), research.clone())
                .with_instruction(SEARCH_INSTRUCTION)
                .with_temperature(config.recommender_temperature)
                .with_policy(policy),
            auditor: Auditor::new(generator, research)
                .with_temperature(config.summarizer_temperature)
                .with_policy(policy),
            config,
            docs_dir,
        })
    }
}
