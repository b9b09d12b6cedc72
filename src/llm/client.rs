/// OpenAI-compatible chat completion client.
///
/// This module provides `OpenAiClient` for making synchronous HTTP requests to a
/// chat completions endpoint, along with its error type and builder.
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4";

/// Errors that can occur when calling the completion service.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Network-related errors (connection failures, DNS resolution, etc.)
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Request or response timeout errors
    #[error("Request timed out")]
    Timeout(#[source] reqwest::Error),

    /// HTTP errors with status code
    #[error("HTTP error: status {status}")]
    Http { status: u16 },

    /// HTTP 429 carrying a `Retry-After` delay in seconds
    #[error("HTTP error: status 429 (retry after {}s)", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// The service answered but the payload was unusable
    #[error("Completion API error: {message}")]
    Api { message: String },

    /// Invalid URL configuration error
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The caller abandoned the request
    #[error("Request cancelled")]
    Cancelled,
}

impl LlmError {
    pub(crate) fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            LlmError::Timeout(error)
        } else {
            LlmError::Network(error)
        }
    }
}

/// Single-turn text completion.
///
/// Implementations hold no conversation state between calls. The trait exists so
/// the pipeline can be driven by mock clients in tests.
pub trait CompletionClient: Send + Sync {
    /// Sends `prompt` as a single user message and returns the model's reply.
    fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Builder for constructing `OpenAiClient` instances.
///
/// # Examples
///
/// ```
/// use litsynth::llm::OpenAiClientBuilder;
///
/// let client = OpenAiClientBuilder::new()
///     .api_key("sk-test")
///     .base_url("http://localhost:8000/v1")
///     .model("gpt-4")
///     .build()
///     .expect("Failed to create client");
/// assert_eq!(client.model(), "gpt-4");
/// ```
#[derive(Default)]
pub struct OpenAiClientBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout: Option<Duration>,
}

impl OpenAiClientBuilder {
    /// Creates a new `OpenAiClientBuilder` with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bearer token sent with every request.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the API base URL (e.g., "https://api.openai.com/v1").
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the model name used for completions.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the per-request timeout. Defaults to 60 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the `OpenAiClient` with the configured settings.
    ///
    /// # Environment Variables
    ///
    /// Unset fields fall back to `OPENAI_API_KEY`, `OPENAI_BASE_URL` and
    /// `LITSYNTH_MODEL`, then to built-in defaults (no key, the public OpenAI
    /// endpoint, `gpt-4`).
    pub fn build(self) -> Result<OpenAiClient, LlmError> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default();

        let base_url = self
            .base_url
            .or_else(|| std::env::var("OPENAI_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = base_url.trim_end_matches('/').to_string();

        let model = self
            .model
            .or_else(|| std::env::var("LITSYNTH_MODEL").ok())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        reqwest::Url::parse(&base_url)
            .map_err(|e| LlmError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout.unwrap_or(Duration::from_secs(60)))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(LlmError::Network)?;

        Ok(OpenAiClient {
            client,
            api_key,
            base_url,
            model,
        })
    }
}

/// Synchronous client for an OpenAI-compatible chat completions API.
///
/// Retries are not performed here; callers wrap `complete` with
/// [`complete_with_retry`](super::complete_with_retry).
pub struct OpenAiClient {
    client: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

impl OpenAiClient {
    /// Returns the base URL configured for this client.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the model name configured for this client.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns true if an API key was configured.
    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Lists model ids served by the endpoint (`GET {base}/models`).
    pub fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let url = format!("{}/models", self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .map_err(LlmError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(LlmError::Http {
                status: response.status().as_u16(),
            });
        }

        let body = response.text().map_err(LlmError::from_reqwest)?;
        let list: ModelList = serde_json::from_str(&body).map_err(LlmError::Serialization)?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }

    fn chat(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .map_err(LlmError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(status_error(&response));
        }

        let body = response.text().map_err(LlmError::from_reqwest)?;
        parse_chat_response(&body)
    }
}

impl CompletionClient for OpenAiClient {
    fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "Sending completion request");
        self.chat(prompt)
    }
}

/// Maps a non-success response to `LlmError`, keeping any `Retry-After` on a 429.
fn status_error(response: &reqwest::blocking::Response) -> LlmError {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        if let Some(retry_after) = retry_after(response.headers()) {
            return LlmError::RateLimited { retry_after };
        }
    }
    LlmError::Http {
        status: status.as_u16(),
    }
}

/// Reads a `Retry-After` header given in delta-seconds. HTTP-date values are ignored.
fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Extracts `choices[0].message.content` from a chat completions response body.
fn parse_chat_response(body: &str) -> Result<String, LlmError> {
    let parsed: ChatResponse = serde_json::from_str(body).map_err(LlmError::Serialization)?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| LlmError::Api {
            message: "Missing 'choices[0].message.content' in API response".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::error::Error;

    #[test]
    fn http_error_variant_with_status_code() {
        let error = LlmError::Http { status: 429 };
        let msg = format!("{}", error);
        assert!(msg.contains("HTTP error"));
        assert!(msg.contains("429"));
    }

    #[test]
    fn retry_after_reads_delta_seconds() {
        use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(12)));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn rate_limited_error_mentions_delay() {
        let error = LlmError::RateLimited {
            retry_after: Duration::from_secs(20),
        };
        let msg = error.to_string();
        assert!(msg.contains("429"));
        assert!(msg.contains("20s"));
    }

    #[test]
    fn serialization_error_variant_wraps_serde_errors() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error = LlmError::Serialization(json_error);
        assert!(format!("{}", error).contains("Serialization error"));
        assert!(error.source().is_some());
    }

    #[test]
    fn build_returns_error_if_invalid_url_provided() {
        let result = OpenAiClientBuilder::new()
            .api_key("k")
            .base_url("not-a-valid-url")
            .build();
        assert!(matches!(result, Err(LlmError::InvalidUrl(_))));
    }

    #[test]
    fn build_trims_trailing_slash() {
        let client = OpenAiClientBuilder::new()
            .api_key("k")
            .base_url("http://localhost:8000/v1/")
            .build()
            .unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000/v1");
    }

    #[test]
    #[serial]
    fn build_reads_environment_when_unset() {
        unsafe {
            std::env::set_var("OPENAI_BASE_URL", "http://env-host:9000/v1");
            std::env::set_var("LITSYNTH_MODEL", "env-model");
            std::env::set_var("OPENAI_API_KEY", "sk-env");
        }

        let client = OpenAiClientBuilder::new().build().unwrap();
        assert_eq!(client.base_url(), "http://env-host:9000/v1");
        assert_eq!(client.model(), "env-model");
        assert!(client.has_api_key());

        unsafe {
            std::env::remove_var("OPENAI_BASE_URL");
            std::env::remove_var("LITSYNTH_MODEL");
            std::env::remove_var("OPENAI_API_KEY");
        }
    }

    #[test]
    #[serial]
    fn builder_values_take_precedence_over_environment() {
        unsafe {
            std::env::set_var("LITSYNTH_MODEL", "env-model");
        }

        let client = OpenAiClientBuilder::new()
            .model("builder-model")
            .build()
            .unwrap();
        assert_eq!(client.model(), "builder-model");

        unsafe {
            std::env::remove_var("LITSYNTH_MODEL");
        }
    }

    #[test]
    fn parses_chat_completion_body() {
        let body = r#"{
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Gaps remain."}}]
        }"#;
        assert_eq!(parse_chat_response(body).unwrap(), "Gaps remain.");
    }

    #[test]
    fn empty_choices_is_an_api_error() {
        let result = parse_chat_response(r#"{"choices": []}"#);
        assert!(matches!(result, Err(LlmError::Api { .. })));
    }

    #[test]
    fn request_body_has_single_user_message() {
        let request = ChatRequest {
            model: "gpt-4",
            messages: [ChatMessage {
                role: "user",
                content: "hello",
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hello");
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn trait_can_be_implemented_by_mock_struct() {
        struct MockClient;

        impl CompletionClient for MockClient {
            fn complete(&self, prompt: &str) -> Result<String, LlmError> {
                Ok(format!("echo: {prompt}"))
            }
        }

        let client: &dyn CompletionClient = &MockClient;
        assert_eq!(client.complete("hi").unwrap(), "echo: hi");
    }
}
