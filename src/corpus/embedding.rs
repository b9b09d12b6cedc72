use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{CorpusError, send_json};

const DEFAULT_BASE_URL: &str = "http://localhost:8080/v1";
const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

/// Turns query text into a dense vector.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, CorpusError>;
}

/// Builder for [`EmbeddingClient`].
#[derive(Default)]
pub struct EmbeddingClientBuilder {
    base_url: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    timeout: Option<Duration>,
}

impl EmbeddingClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Optional bearer token; local embedding servers usually need none.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the client, falling back to `EMBEDDING_BASE_URL`, `EMBEDDING_MODEL`
    /// and `EMBEDDING_API_KEY` for unset fields.
    pub fn build(self) -> Result<EmbeddingClient, CorpusError> {
        let base_url = self
            .base_url
            .or_else(|| std::env::var("EMBEDDING_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let model = self
            .model
            .or_else(|| std::env::var("EMBEDDING_MODEL").ok())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_key = self
            .api_key
            .or_else(|| std::env::var("EMBEDDING_API_KEY").ok());

        reqwest::Url::parse(&base_url)
            .map_err(|e| CorpusError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout.unwrap_or(Duration::from_secs(30)))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(CorpusError::Network)?;

        Ok(EmbeddingClient {
            client,
            base_url,
            model,
            api_key,
        })
    }
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct EmbeddingClient {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: [&'a str; 1],
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Embedder for EmbeddingClient {
    fn embed(&self, text: &str) -> Result<Vec<f32>, CorpusError> {
        let url = format!("{}/embeddings", self.base_url);
        let mut request = self.client.post(&url).json(&EmbeddingRequest {
            input: [text],
            model: &self.model,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response: EmbeddingResponse = send_json(request)?;
        first_embedding(response)
    }
}

fn first_embedding(response: EmbeddingResponse) -> Result<Vec<f32>, CorpusError> {
    response
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CorpusError::Api {
            message: "Embedding response contained no vector".to_string(),
        })
}
