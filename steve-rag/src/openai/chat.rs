use async_stream::try_stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{DEFAULT_BASE_URL, PROVIDER, endpoint, error_detail, is_retryable};
use crate::config::{DEFAULT_CHAT_MODEL, Settings};
use crate::error::{RagError, Result};
use crate::generation::{GenerationRequest, TextGenerator, TextStream};

/// A [`TextGenerator`] backed by the `/chat/completions` endpoint.
///
/// The rendered prompt is sent as a single user message. Streaming requests
/// read the server-sent event stream and yield each content delta as a
/// fragment.
///
/// # Example
///
/// ```rust,ignore
/// use steve_rag::openai::OpenAIChatGenerator;
///
/// let generator = OpenAIChatGenerator::new("sk-...")?.with_model("gpt-4o-mini");
/// let mut fragments = generator.generate(request, true).await?;
/// ```
pub struct OpenAIChatGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAIChatGenerator {
    /// Create a generator with the default model and base URL.
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
            model: DEFAULT_CHAT_MODEL.into(),
        })
    }

    /// Create a generator from process [`Settings`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the API key is empty.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let generator = Self::new(settings.api_key.as_str())?.with_model(settings.chat_model.as_str());
        Ok(match &settings.base_url {
            Some(base_url) => generator.with_base_url(base_url.as_str()),
            None => generator,
        })
    }

    /// Point the generator at another OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the chat model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Deserialize)]
struct ChatContent {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: ChatContent,
}

fn generation_error(message: String, transient: bool) -> RagError {
    RagError::GenerationError { provider: PROVIDER.into(), message, transient }
}

/// What one line of the event stream means.
#[derive(Debug, PartialEq)]
enum SseEvent {
    /// A content delta.
    Delta(String),
    /// `data: [DONE]`.
    Done,
    /// Blank lines, comments, role-only deltas.
    Skip,
}

fn parse_sse_line(line: &str) -> Result<SseEvent> {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return Ok(SseEvent::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseEvent::Done);
    }

    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| generation_error(format!("failed to parse stream chunk: {e}"), false))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
        .map_or(SseEvent::Skip, SseEvent::Delta))
}

#[async_trait]
impl TextGenerator for OpenAIChatGenerator {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn generate(&self, request: GenerationRequest, stream: bool) -> Result<TextStream> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: request.render() }],
            stream,
            temperature: request.temperature,
        };
        debug!(provider = PROVIDER, model = %self.model, stream, "chat completion request");

        let response = self
            .client
            .post(endpoint(&self.base_url, "chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                generation_error(format!("request failed: {e}"), true)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = error_detail(response.text().await.unwrap_or_default());
            error!(provider = PROVIDER, %status, "API error");
            return Err(generation_error(
                format!("API returned {status}: {detail}"),
                is_retryable(status),
            ));
        }

        if !stream {
            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| generation_error(format!("failed to parse response: {e}"), false))?;
            let text = parsed
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .unwrap_or_default();
            return Ok(Box::pin(futures::stream::once(async move { Ok::<_, RagError>(text) })));
        }

        Ok(Box::pin(sse_fragments(Box::pin(response.bytes_stream()))))
    }
}

/// Turn the raw event-stream body into content fragments, ending at `[DONE]`.
fn sse_fragments<S, B>(mut bytes: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = reqwest::Result<B>> + Send + Unpin,
    B: AsRef<[u8]> + Send,
{
    try_stream! {
        let mut buffer: Vec<u8> = Vec::new();
        'read: while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| generation_error(format!("stream interrupted: {e}"), true))?;
            buffer.extend_from_slice(chunk.as_ref());

            while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                match parse_sse_line(&String::from_utf8_lossy(&line))? {
                    SseEvent::Delta(content) => yield content,
                    SseEvent::Done => break 'read,
                    SseEvent::Skip => {}
                }
            }
        }
    }
}
