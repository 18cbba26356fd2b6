//! Error types for the `steve-rag` crate.

use thiserror::Error;

/// Errors that can occur while indexing documentation or generating a recommendation.
#[derive(Debug, Error)]
pub enum RagError {
    /// Missing or invalid configuration (credential, docs path, parameters).
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A single document could not be read.
    ///
    /// The indexer recovers from this by skipping the document.
    #[error("Failed to load '{path}': {message}")]
    LoadError {
        /// Path of the document that failed to load.
        path: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
        /// Whether the same request may succeed later (transport failure, 429, 5xx).
        transient: bool,
    },

    /// The text generation backend failed.
    #[error("Generation error ({provider}): {message}")]
    GenerationError {
        /// The generator that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
        /// Whether the same request may succeed later (transport failure, 429, 5xx).
        transient: bool,
    },

    /// An external call did not complete in time.
    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The configured limit in seconds.
        seconds: u64,
    },

    /// Vectors handed to the index do not share one dimensionality.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensionality of the first vector seen.
        expected: usize,
        /// Dimensionality of the offending vector.
        actual: usize,
    },

    /// An error in the pipeline orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

impl RagError {
    /// Whether retrying the same call may succeed.
    ///
    /// Timeouts always are. Backend errors are when they were raised as such.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::GenerationError { transient, .. } | Self::EmbeddingError { transient, .. } => {
                *transient
            }
            _ => false,
        }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_flagged_backend_errors_are_transient() {
        let generation = |transient| RagError::GenerationError {
            provider: "openai".into(),
            message: "API returned 401 Unauthorized".into(),
            transient,
        };
        assert!(!generation(false).is_transient());
        assert!(generation(true).is_transient());
        assert!(RagError::Timeout { operation: "generation".into(), seconds: 1 }.is_transient());
        assert!(!RagError::ConfigError("missing key".into()).is_transient());
        assert!(
            !RagError::EmbeddingError { provider: "p".into(), message: "m".into(), transient: false }
                .is_transient()
        );
    }
}
