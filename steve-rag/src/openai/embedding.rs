use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{DEFAULT_BASE_URL, PROVIDER, endpoint, error_detail, is_retryable};
use crate::config::{DEFAULT_EMBEDDING_MODEL, Settings};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// The dimensionality of `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

/// An [`EmbeddingProvider`] backed by the `/embeddings` endpoint.
///
/// # Example
///
/// ```rust,ignore
/// use steve_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new("sk-...")?;
/// let embedding = provider.embed("switch the storage driver").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for dimension truncation.
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a provider with the default model and base URL.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `api_key` is empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::ConfigError("OpenAI API key must not be empty".into()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
        })
    }

    /// Create a provider from process [`Settings`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the API key is empty.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let provider = Self::new(settings.api_key.as_str())?.with_model(settings.embedding_model.as_str());
        Ok(match &settings.base_url {
            Some(base_url) => provider.with_base_url(base_url.as_str()),
            None => provider,
        })
    }

    /// Point the provider at another OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Request truncated embeddings of `dims` elements.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

fn embedding_error(message: String, transient: bool) -> RagError {
    RagError::EmbeddingError { provider: PROVIDER.into(), message, transient }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| embedding_error("API returned empty response".into(), false))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding batch");

        let request_body =
            EmbeddingRequest { model: &self.model, input: texts, dimensions: self.request_dimensions };

        let response = self
            .client
            .post(endpoint(&self.base_url, "embeddings"))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                embedding_error(format!("request failed: {e}"), true)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = error_detail(response.text().await.unwrap_or_default());
            error!(provider = PROVIDER, %status, "API error");
            return Err(embedding_error(
                format!("API returned {status}: {detail}"),
                is_retryable(status),
            ));
        }

        let mut embedding_response: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            embedding_error(format!("failed to parse response: {e}"), false)
        })?;

        // The API reports each vector's input position; restore input order.
        embedding_response.data.sort_by_key(|d| d.index);
        Ok(embedding_response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
