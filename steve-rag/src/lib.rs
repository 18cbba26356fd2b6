//! Retrieval-augmented ADR recommendations for code changes.
//!
//! This crate provides:
//! - Recursive character chunking of markdown documentation
//! - An in-memory vector index with diversified (MMR) retrieval
//! - A build-once indexer over a documentation directory
//! - The two-stage pipeline: summarize a diff, then stream a recommendation
//! - A documentation coverage audit and a librarian search
//!
//! Embedding and generation backends plug in through [`EmbeddingProvider`]
//! and [`TextGenerator`]. OpenAI-compatible backends live behind the
//! `openai` feature.

pub mod audit;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod indexer;
pub mod loader;
pub mod mock;
pub mod pipeline;
pub mod prompts;
pub mod recommend;
pub mod retriever;
pub mod summarizer;

#[cfg(feature = "openai")]
pub mod openai;

pub use audit::{AuditReport, Auditor, Coverage, Finding};
pub use chunking::{Chunker, RecursiveChunker};
pub use config::{PipelineConfig, PipelineConfigBuilder, Settings};
pub use document::{Chunk, Document, EmbeddedChunk, Report, RetrievalResult};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use generation::{CallPolicy, GenerationRequest, TextGenerator, TextStream, collect_text};
pub use index::VectorIndex;
pub use indexer::Indexer;
pub use loader::load_documents;
pub use pipeline::{AdrPipeline, AdrPipelineBuilder};
pub use recommend::{RecommendationChain, RecommendationStream, build_query};
pub use retriever::Retriever;
pub use summarizer::Summarizer;
