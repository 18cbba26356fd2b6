//! Deterministic in-process backends for tests and offline runs.
//!
//! [`MockEmbeddingProvider`] hashes words into a fixed number of buckets, so
//! texts sharing vocabulary end up close in cosine space. [`MockGenerator`]
//! replays scripted replies and records every prompt it receives.

use std::collections::VecDeque;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::{GenerationRequest, TextGenerator, TextStream};

/// Bag-of-words embedder with hashed buckets.
#[derive(Debug)]
pub struct MockEmbeddingProvider {
    dimensions: usize,
    calls: AtomicUsize,
    failure: Option<String>,
}

impl MockEmbeddingProvider {
    /// Create an embedder producing vectors of `dimensions` elements.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1), calls: AtomicUsize::new(0), failure: None }
    }

    /// An embedder whose every call fails with `message`.
    pub fn failing(dimensions: usize, message: impl Into<String>) -> Self {
        Self { failure: Some(message.into()), ..Self::new(dimensions) }
    }

    /// Number of `embed` / `embed_batch` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() % self.dimensions as u64) as usize] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }

    fn check(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(RagError::EmbeddingError {
                provider: "mock".to_string(),
                message: message.clone(),
                transient: true,
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.check()?;
        Ok(self.vector(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.check()?;
        Ok(texts.iter().map(|text| self.vector(text)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Scripted text generator.
///
/// Replies are taken from the queue in order; once it is empty every call
/// gets the default reply. Streaming calls yield the reply word by word.
#[derive(Debug)]
pub struct MockGenerator {
    replies: Mutex<VecDeque<Result<String>>>,
    default_reply: String,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockGenerator {
    /// Create a generator that always answers `default_reply`.
    pub fn new(default_reply: impl Into<String>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            default_reply: default_reply.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A generator whose calls fail until replies are queued.
    pub fn failing(message: impl Into<String>) -> Self {
        let generator = Self::new("");
        generator.push_error(message);
        generator
    }

    /// Queue a reply for the next call.
    pub fn push_reply(&self, reply: impl Into<String>) -> &Self {
        lock(&self.replies).push_back(Ok(reply.into()));
        self
    }

    /// Queue a transient failure for the next call.
    pub fn push_error(&self, message: impl Into<String>) -> &Self {
        self.push_failure(message.into(), true)
    }

    /// Queue a failure that retrying cannot fix, like a rejected request.
    pub fn push_rejection(&self, message: impl Into<String>) -> &Self {
        self.push_failure(message.into(), false)
    }

    fn push_failure(&self, message: String, transient: bool) -> &Self {
        lock(&self.replies).push_back(Err(RagError::GenerationError {
            provider: "mock".to_string(),
            message,
            transient,
        }));
        self
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        lock(&self.requests).clone()
    }

    /// Rendered prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.requests).iter().map(GenerationRequest::render).collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl TextGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: GenerationRequest, stream: bool) -> Result<TextStream> {
        lock(&self.requests).push(request);
        let reply =
            lock(&self.replies).pop_front().unwrap_or_else(|| Ok(self.default_reply.clone()))?;

        let fragments: Vec<Result<String>> = if stream {
            reply.split_inclusive(' ').map(|word| Ok(word.to_string())).collect()
        } else {
            vec![Ok(reply)]
        };
        Ok(Box::pin(futures::stream::iter(fragments)))
    }
}
