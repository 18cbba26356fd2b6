//! OpenAI-compatible backends over the HTTP API.
//!
//! This module is only available when the `openai` feature is enabled.

mod chat;
mod embedding;

pub use chat::OpenAIChatGenerator;
pub use embedding::OpenAIEmbeddingProvider;

use serde::Deserialize;

/// The default OpenAI API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const PROVIDER: &str = "OpenAI";

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Pull the `error.message` out of an API error body, or return the body as is.
fn error_detail(body: String) -> String {
    serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body)
}

/// Whether a failed response may succeed if the request is sent again.
fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{path}", base_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_detail_prefers_api_message() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(error_detail(body.to_string()), "Incorrect API key provided");
        assert_eq!(error_detail("bad gateway".to_string()), "bad gateway");
    }

    #[test]
    fn only_throttling_and_server_errors_are_retryable() {
        use reqwest::StatusCode;
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_retryable(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        assert_eq!(endpoint("http://localhost:8080/v1/", "embeddings"), "http://localhost:8080/v1/embeddings");
    }
}
