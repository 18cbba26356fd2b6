//! The generation capability: prompt in, streamed text out.
//!
//! [`TextGenerator`] is the seam every language-model backend plugs into.
//! Output is always a [`TextStream`] of fragments; non-streaming backends
//! simply yield a single fragment.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{RagError, Result};

/// A stream of generated text fragments.
///
/// Concatenating every fragment yields the full generated text. Dropping the
/// stream cancels the underlying generation.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A single prompt for a [`TextGenerator`].
///
/// `instruction` may contain `{name}` placeholders that [`render`](GenerationRequest::render)
/// replaces with entries from `variables`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The prompt template.
    pub instruction: String,
    /// Placeholder name → replacement text.
    pub variables: BTreeMap<String, String>,
    /// Sampling temperature. `None` uses the backend default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    /// Create a request from a prompt template.
    pub fn new(instruction: impl Into<String>) -> Self {
        Self { instruction: instruction.into(), ..Self::default() }
    }

    /// Bind a placeholder to a value.
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Substitute `{name}` placeholders in a single pass.
    ///
    /// Substituted values are never re-scanned, so a diff containing
    /// `{context}` is inserted verbatim. Braces that do not name a bound
    /// variable are left untouched.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.instruction.len());
        let mut rest = self.instruction.as_str();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let bound = after
                .find('}')
                .and_then(|close| self.variables.get(&after[..close]).map(|value| (close, value)));
            match bound {
                Some((close, value)) => {
                    out.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }

        out.push_str(rest);
        out
    }
}

/// A language-model backend that turns a prompt into text.
///
/// # Example
///
/// ```rust,ignore
/// use steve_rag::{GenerationRequest, TextGenerator, collect_text};
///
/// let request = GenerationRequest::new("Summarise: {diff}").with_variable("diff", diff);
/// let text = collect_text(generator.generate(request, false).await?).await?;
/// ```
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Start generating text for `request`.
    ///
    /// With `stream == true` fragments should be yielded as soon as the
    /// backend produces them.
    async fn generate(&self, request: GenerationRequest, stream: bool) -> Result<TextStream>;
}

/// Drain a [`TextStream`] into one string, failing on the first error.
pub async fn collect_text(mut stream: TextStream) -> Result<String> {
    let mut text = String::new();
    while let Some(fragment) = stream.next().await {
        text.push_str(&fragment?);
    }
    Ok(text)
}

/// Timeout and retry limits applied around a generation call.
#[derive(Debug, Clone, Copy)]
pub struct CallPolicy {
    /// Limit for the initial call and for each gap between fragments.
    pub timeout: Duration,
    /// Retries of the initial call on transient failures.
    pub retries: u32,
    /// Delay before the first retry; doubled on each further retry.
    pub backoff: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(120), retries: 2, backoff: Duration::from_millis(500) }
    }
}

/// Start a generation under `policy`.
///
/// Only the call that opens the stream is retried; once fragments have been
/// handed out a failure is final, because partial output may already be visible.
pub async fn generate_with_policy(
    generator: &dyn TextGenerator,
    request: GenerationRequest,
    stream: bool,
    policy: CallPolicy,
) -> Result<TextStream> {
    let seconds = policy.timeout.as_secs();
    let operation = format!("generation ({})", generator.name());
    let mut attempt = 0;

    loop {
        let result = match tokio::time::timeout(
            policy.timeout,
            generator.generate(request.clone(), stream),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(RagError::Timeout { operation: operation.clone(), seconds }),
        };

        match result {
            Ok(fragments) => return Ok(with_idle_timeout(fragments, policy.timeout, operation)),
            Err(e) if e.is_transient() && attempt < policy.retries => {
                let delay = backoff_delay(policy.backoff, attempt);
                attempt += 1;
                warn!(generator = generator.name(), attempt, error = %e, "retrying generation");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Wait before retry number `attempt + 1`: `base` doubled per earlier retry.
///
/// Saturates instead of overflowing for large attempt counts.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

/// Fail the stream if the gap between two fragments exceeds `limit`.
fn with_idle_timeout(stream: TextStream, limit: Duration, operation: String) -> TextStream {
    let seconds = limit.as_secs();
    Box::pin(tokio_stream::StreamExt::timeout(stream, limit).map(move |item| match item {
        Ok(fragment) => fragment,
        Err(_) => Err(RagError::Timeout { operation: operation.clone(), seconds }),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_bound_placeholders() {
        let request = GenerationRequest::new("Change: {question}\nContext: {context}")
            .with_variable("question", "swap driver")
            .with_variable("context", "ADR-1");
        assert_eq!(request.render(), "Change: swap driver\nContext: ADR-1");
    }

    #[test]
    fn render_leaves_unknown_braces_alone() {
        let request = GenerationRequest::new("fn main() { {x} }").with_variable("y", "1");
        assert_eq!(request.render(), "fn main() { {x} }");
    }

    #[test]
    fn render_does_not_rescan_values() {
        let request = GenerationRequest::new("{diff} / {context}")
            .with_variable("diff", "+ let s = \"{context}\";")
            .with_variable("context", "docs");
        assert_eq!(request.render(), "+ let s = \"{context}\"; / docs");
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 0), base);
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, 40), base.saturating_mul(u32::MAX));
        assert_eq!(backoff_delay(Duration::MAX, 2), Duration::MAX);
    }

    #[tokio::test]
    async fn collect_text_concatenates_fragments() {
        let items: Vec<Result<String>> =
            vec![Ok("a".to_string()), Ok("b".to_string()), Ok("c".to_string())];
        let stream: TextStream = Box::pin(futures::stream::iter(items));
        assert_eq!(collect_text(stream).await.unwrap(), "abc");
    }
}
