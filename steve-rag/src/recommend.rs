//! Stage 2: retrieve related documentation and stream the ADR recommendation.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tracing::{error, info};

use crate::document::{Report, RetrievalResult, distinct_sources};
use crate::error::{RagError, Result};
use crate::generation::{CallPolicy, GenerationRequest, TextGenerator, TextStream, generate_with_policy};
use crate::index::VectorIndex;
use crate::prompts::RECOMMEND_INSTRUCTION;
use crate::retriever::{Retriever, format_context};

/// Build the retrieval query from a diff and its stage-1 description.
pub fn build_query(diff: &str, description: &str) -> String {
    let description = description.trim();
    if description.is_empty() {
        format!("Diff: {diff}")
    } else {
        format!("Description: {description} Diff: {diff}")
    }
}

/// A recommendation being generated.
///
/// Yields text fragments in generation order; the stream ending is the
/// completion signal. Fragments are accumulated so that [`finish`](Self::finish)
/// returns a [`Report`] whose `answer` equals their concatenation. After an
/// error the stream ends and the answer must be treated as incomplete.
/// Dropping the stream cancels generation.
pub struct RecommendationStream {
    context: Vec<RetrievalResult>,
    sources: Vec<String>,
    fragments: TextStream,
    answer: String,
    failure: Option<String>,
    done: bool,
}

impl RecommendationStream {
    /// Wrap a fragment stream generated from `context`.
    pub fn new(context: Vec<RetrievalResult>, fragments: TextStream) -> Self {
        let sources = distinct_sources(&context);
        Self { context, sources, fragments, answer: String::new(), failure: None, done: false }
    }

    /// A stream yielding a fixed answer with no context.
    pub fn fixed(answer: impl Into<String>) -> Self {
        let answer = answer.into();
        Self::new(Vec::new(), Box::pin(futures::stream::once(async move { Ok::<_, RagError>(answer) })))
    }

    /// The retrieved chunks used as context.
    pub fn context(&self) -> &[RetrievalResult] {
        &self.context
    }

    /// Distinct context sources, first-retrieved first.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Text received so far.
    pub fn partial_answer(&self) -> &str {
        &self.answer
    }

    /// Drain the remaining fragments and return the report.
    ///
    /// # Errors
    ///
    /// Returns the generation error if the stream failed, whether during this
    /// call or while the caller was consuming fragments.
    pub async fn finish(mut self) -> Result<Report> {
        while let Some(fragment) = self.next().await {
            fragment?;
        }
        if let Some(message) = self.failure {
            return Err(RagError::PipelineError(format!("recommendation incomplete: {message}")));
        }
        Ok(Report { answer: self.answer, sources: self.sources })
    }
}

impl Stream for RecommendationStream {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match this.fragments.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(fragment))) => {
                this.answer.push_str(&fragment);
                Poll::Ready(Some(Ok(fragment)))
            }
            Poll::Ready(Some(Err(e))) => {
                error!(error = %e, "recommendation stream failed");
                this.failure = Some(e.to_string());
                this.done = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Retrieval-grounded generation: the second stage of the pipeline.
///
/// The same chain type also serves the librarian search by swapping the
/// instruction and retriever.
///
/// # Example
///
/// ```rust,ignore
/// let chain = RecommendationChain::new(generator, Retriever::new(embedder, 6, 0.25));
/// let mut stream = chain.stream(&index, &build_query(&diff, &summary)).await?;
/// while let Some(fragment) = stream.next().await {
///     print!("{}", fragment?);
/// }
/// ```
pub struct RecommendationChain {
    generator: Arc<dyn TextGenerator>,
    retriever: Retriever,
    instruction: String,
    temperature: f32,
    policy: CallPolicy,
}

impl RecommendationChain {
    /// Create a chain with the ADR recommendation instruction.
    pub fn new(generator: Arc<dyn TextGenerator>, retriever: Retriever) -> Self {
        Self {
            generator,
            retriever,
            instruction: RECOMMEND_INSTRUCTION.to_string(),
            temperature: 0.2,
            policy: CallPolicy::default(),
        }
    }

    /// Replace the instruction. It should contain `{question}` and `{context}`.
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the timeout/retry policy.
    pub fn with_policy(mut self, policy: CallPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The retriever and its operating point.
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Retrieve context for `query_text` and start streaming the answer.
    ///
    /// # Errors
    ///
    /// Fails if the query cannot be embedded or the generation cannot be started.
    pub async fn stream(&self, index: &VectorIndex, query_text: &str) -> Result<RecommendationStream> {
        let context = self.retriever.retrieve(index, query_text).await?;

        let request = GenerationRequest::new(self.instruction.as_str())
            .with_variable("question", query_text)
            .with_variable("context", format_context(&context))
            .with_temperature(self.temperature);

        let fragments =
            generate_with_policy(self.generator.as_ref(), request, true, self.policy).await?;

        let stream = RecommendationStream::new(context, fragments);
        info!(
            generator = self.generator.name(),
            context_count = stream.context().len(),
            source_count = stream.sources().len(),
            "streaming recommendation"
        );
        Ok(stream)
    }

    /// Retrieve, generate, and collect the full report.
    ///
    /// # Errors
    ///
    /// Fails on retrieval or generation failure.
    pub async fn recommend(&self, index: &VectorIndex, query_text: &str) -> Result<Report> {
        self.stream(index, query_text).await?.finish().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_includes_description_when_present() {
        assert_eq!(build_query("+x", " swaps db "), "Description: swaps db Diff: +x");
        assert_eq!(build_query("+x", ""), "Diff: +x");
    }

    #[tokio::test]
    async fn finish_reports_accumulated_answer() {
        let items: Vec<Result<String>> = vec![Ok("No ".to_string()), Ok("ADR.".to_string())];
        let fragments: TextStream = Box::pin(futures::stream::iter(items));
        let stream = RecommendationStream::new(Vec::new(), fragments);
        let report = stream.finish().await.unwrap();
        assert_eq!(report.answer, "No ADR.");
        assert!(report.sources.is_empty());
    }

    #[tokio::test]
    async fn failure_seen_by_consumer_makes_finish_fail() {
        let fragments: TextStream = Box::pin(futures::stream::iter(vec![
            Ok("partial".to_string()),
            Err(RagError::GenerationError {
                provider: "test".into(),
                message: "boom".into(),
                transient: false,
            }),
            Ok("never".to_string()),
        ]));
        let mut stream = RecommendationStream::new(Vec::new(), fragments);
        assert_eq!(stream.next().await.unwrap().unwrap(), "partial");
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
        assert_eq!(stream.partial_answer(), "partial");
        assert!(stream.finish().await.is_err());
    }
}
