//! Configuration for the ADR pipeline and the process environment.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::generation::CallPolicy;

/// Tunable parameters of one pipeline instance.
///
/// Two retrieval operating points are kept: `retrieval_k` / `diversity` for the
/// ADR recommendation, and `research_k` / `research_diversity` for audit and
/// search questions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Maximum number of characters shared by consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of chunks retrieved as recommendation context.
    pub retrieval_k: usize,
    /// Relevance/diversity balance for recommendation retrieval (1.0 = pure relevance).
    pub diversity: f32,
    /// Number of chunks retrieved per audit or search question.
    pub research_k: usize,
    /// Relevance/diversity balance for audit and search retrieval.
    pub research_diversity: f32,
    /// Sampling temperature of the summarizer.
    pub summarizer_temperature: f32,
    /// Sampling temperature of the recommendation chain.
    pub recommender_temperature: f32,
    /// Chunks per embedding request.
    pub embedding_batch_size: usize,
    /// Embedding requests in flight at once while indexing.
    pub embedding_concurrency: usize,
    /// Limit for one embedding request, in seconds.
    pub embedding_timeout_secs: u64,
    /// Limit for opening a generation and for each gap between fragments, in seconds.
    pub generation_timeout_secs: u64,
    /// Retries of a generation call on transient failures.
    pub generation_retries: u32,
    /// File extensions (without dot) treated as documentation.
    pub document_extensions: Vec<String>,
    /// Fall back to the raw diff as retrieval query when the summary fails.
    pub summary_fallback: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            retrieval_k: 6,
            diversity: 0.25,
            research_k: 4,
            research_diversity: 1.0,
            summarizer_temperature: 0.2,
            recommender_temperature: 0.2,
            embedding_batch_size: 64,
            embedding_concurrency: 4,
            embedding_timeout_secs: 60,
            generation_timeout_secs: 120,
            generation_retries: 2,
            document_extensions: vec!["md".to_string(), "markdown".to_string()],
            summary_fallback: false,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for constructing a [`PipelineConfig`].
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Timeout/retry policy for generation calls.
    pub fn generation_policy(&self) -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_secs(self.generation_timeout_secs),
            retries: self.generation_retries,
            ..CallPolicy::default()
        }
    }

    /// Limit for one embedding request.
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding_timeout_secs)
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| Err(RagError::ConfigError(message));
        if self.chunk_size == 0 {
            return fail("chunk_size must be greater than zero".to_string());
        }
        if self.chunk_overlap >= self.chunk_size {
            return fail(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            ));
        }
        if self.retrieval_k == 0 || self.research_k == 0 {
            return fail("retrieval_k and research_k must be greater than zero".to_string());
        }
        for (name, value) in
            [("diversity", self.diversity), ("research_diversity", self.research_diversity)]
        {
            if !(0.0..=1.0).contains(&value) {
                return fail(format!("{name} ({value}) must be within [0, 1]"));
            }
        }
        for (name, value) in [
            ("summarizer_temperature", self.summarizer_temperature),
            ("recommender_temperature", self.recommender_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return fail(format!("{name} ({value}) must be within [0, 2]"));
            }
        }
        if self.embedding_batch_size == 0 || self.embedding_concurrency == 0 {
            return fail(
                "embedding_batch_size and embedding_concurrency must be greater than zero"
                    .to_string(),
            );
        }
        if self.embedding_timeout_secs == 0 || self.generation_timeout_secs == 0 {
            return fail("timeouts must be greater than zero".to_string());
        }
        if self.generation_retries > MAX_GENERATION_RETRIES {
            return fail(format!(
                "generation_retries ({}) must be at most {MAX_GENERATION_RETRIES}",
                self.generation_retries
            ));
        }
        if self.document_extensions.is_empty() {
            return fail("at least one document extension is required".to_string());
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`PipelineConfig`].
#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of chunks retrieved for the recommendation.
    pub fn retrieval_k(mut self, k: usize) -> Self {
        self.config.retrieval_k = k;
        self
    }

    /// Set the relevance/diversity balance for the recommendation.
    pub fn diversity(mut self, diversity: f32) -> Self {
        self.config.diversity = diversity;
        self
    }

    /// Set the number of chunks retrieved per audit or search question.
    pub fn research_k(mut self, k: usize) -> Self {
        self.config.research_k = k;
        self
    }

    /// Set the relevance/diversity balance for audit and search.
    pub fn research_diversity(mut self, diversity: f32) -> Self {
        self.config.research_diversity = diversity;
        self
    }

    /// Set the summarizer temperature.
    pub fn summarizer_temperature(mut self, temperature: f32) -> Self {
        self.config.summarizer_temperature = temperature;
        self
    }

    /// Set the recommendation temperature.
    pub fn recommender_temperature(mut self, temperature: f32) -> Self {
        self.config.recommender_temperature = temperature;
        self
    }

    /// Set the number of chunks per embedding request.
    pub fn embedding_batch_size(mut self, size: usize) -> Self {
        self.config.embedding_batch_size = size;
        self
    }

    /// Set how many embedding requests may run at once.
    pub fn embedding_concurrency(mut self, concurrency: usize) -> Self {
        self.config.embedding_concurrency = concurrency;
        self
    }

    /// Set the embedding request timeout in seconds.
    pub fn embedding_timeout_secs(mut self, secs: u64) -> Self {
        self.config.embedding_timeout_secs = secs;
        self
    }

    /// Set the generation timeout in seconds.
    pub fn generation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.generation_timeout_secs = secs;
        self
    }

    /// Set the number of generation retries.
    pub fn generation_retries(mut self, retries: u32) -> Self {
        self.config.generation_retries = retries;
        self
    }

    /// Set the documentation file extensions.
    pub fn document_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.document_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Continue with the raw diff when the summary fails.
    pub fn summary_fallback(mut self, enabled: bool) -> Self {
        self.config.summary_fallback = enabled;
        self
    }

    /// Build the [`PipelineConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any parameter is out of range.
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Default chat model.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
/// Upper bound accepted for [`PipelineConfig::generation_retries`].
pub const MAX_GENERATION_RETRIES: u32 = 10;

/// Process-level settings read from the environment.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    /// Root of the documentation tree.
    pub docs_path: PathBuf,
    /// API credential for the model provider.
    pub api_key: String,
    /// Optional override of the provider base URL.
    pub base_url: Option<String>,
    /// Chat model name.
    pub chat_model: String,
    /// Embedding model name.
    pub embedding_model: String,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("docs_path", &self.docs_path)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("chat_model", &self.chat_model)
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

impl Settings {
    /// Read settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `OPENAI_API_KEY` or the docs path
    /// (`STEVE_DOCS_PATH`, falling back to `DOCS_PATH`) is missing or empty.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get("OPENAI_API_KEY").ok_or_else(|| {
            RagError::ConfigError("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        let docs_path = get("STEVE_DOCS_PATH").or_else(|| get("DOCS_PATH")).ok_or_else(|| {
            RagError::ConfigError(
                "STEVE_DOCS_PATH (or DOCS_PATH) environment variable not set".to_string(),
            )
        })?;

        Ok(Self {
            docs_path: PathBuf::from(docs_path),
            api_key,
            base_url: get("OPENAI_BASE_URL"),
            chat_model: get("STEVE_CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            embedding_model: get("STEVE_EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        let err = PipelineConfig::builder().chunk_size(100).chunk_overlap(100).build().unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn diversity_out_of_range_is_rejected() {
        assert!(PipelineConfig::builder().diversity(1.5).build().is_err());
        assert!(PipelineConfig::builder().research_diversity(-0.1).build().is_err());
    }

    #[test]
    fn retries_are_capped() {
        assert!(PipelineConfig::builder().generation_retries(MAX_GENERATION_RETRIES).build().is_ok());
        let err = PipelineConfig::builder().generation_retries(40).build().unwrap_err();
        assert!(err.to_string().contains("generation_retries"));
    }

    #[test]
    fn missing_api_key_names_the_variable() {
        let err = Settings::from_lookup(lookup(&[("STEVE_DOCS_PATH", "docs")])).unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn docs_path_falls_back_to_docs_path() {
        let settings =
            Settings::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-test"), ("DOCS_PATH", "adr")]))
                .unwrap();
        assert_eq!(settings.docs_path, PathBuf::from("adr"));
        assert_eq!(settings.chat_model, DEFAULT_CHAT_MODEL);
        assert!(!format!("{settings:?}").contains("sk-test"));
    }

    #[test]
    fn blank_docs_path_is_missing() {
        let err = Settings::from_lookup(lookup(&[("OPENAI_API_KEY", "k"), ("STEVE_DOCS_PATH", " ")]))
            .unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
    }
}
