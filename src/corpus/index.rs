use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{CorpusError, send_json};
use crate::models::Match;

const CONTROL_PLANE_URL: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2024-07";

/// Similarity search over the excerpt corpus.
pub trait VectorIndex: Send + Sync {
    /// Returns up to `top_k` matches in the backend's order (descending score).
    fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<Match>, CorpusError>;
}

/// Builder for [`PineconeIndex`].
#[derive(Default)]
pub struct PineconeIndexBuilder {
    api_key: Option<String>,
    index_name: Option<String>,
    host: Option<String>,
    control_plane_url: Option<String>,
    timeout: Option<Duration>,
}

impl PineconeIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn index_name(mut self, name: impl Into<String>) -> Self {
        self.index_name = Some(name.into());
        self
    }

    /// Data-plane host. When unset it is looked up from the control plane on first use.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn control_plane_url(mut self, url: impl Into<String>) -> Self {
        self.control_plane_url = Some(url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<PineconeIndex, CorpusError> {
        let api_key = self.api_key.ok_or_else(|| CorpusError::Api {
            message: "Pinecone API key is required".to_string(),
        })?;
        let index_name = self.index_name.ok_or_else(|| CorpusError::Api {
            message: "Pinecone index name is required".to_string(),
        })?;

        let host = self.host.map(|h| normalize_host(&h)).transpose()?;
        let control_plane_url = self
            .control_plane_url
            .unwrap_or_else(|| CONTROL_PLANE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout.unwrap_or(Duration::from_secs(30)))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(CorpusError::Network)?;

        Ok(PineconeIndex {
            client,
            api_key,
            index_name,
            control_plane_url,
            host: Mutex::new(host),
        })
    }
}

/// Pinecone serverless/pod index accessed over its REST data plane.
pub struct PineconeIndex {
    client: reqwest::blocking::Client,
    api_key: String,
    index_name: String,
    control_plane_url: String,
    host: Mutex<Option<String>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<Match>,
}

#[derive(Deserialize)]
struct IndexDescription {
    host: String,
}

impl PineconeIndex {
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Returns the data-plane host, describing the index once if it was not configured.
    pub fn resolve_host(&self) -> Result<String, CorpusError> {
        let mut cached = self.host.lock().map_err(|_| CorpusError::Api {
            message: "Index host cache poisoned".to_string(),
        })?;
        if let Some(host) = cached.as_ref() {
            return Ok(host.clone());
        }

        let url = format!("{}/indexes/{}", self.control_plane_url, self.index_name);
        tracing::info!(index = %self.index_name, "Resolving Pinecone index host");
        let description: IndexDescription = send_json(
            self.client
                .get(&url)
                .header("Api-Key", &self.api_key)
                .header("X-Pinecone-API-Version", API_VERSION),
        )?;

        let host = normalize_host(&description.host)?;
        *cached = Some(host.clone());
        Ok(host)
    }
}

impl VectorIndex for PineconeIndex {
    fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<Match>, CorpusError> {
        let url = format!("{}/query", self.resolve_host()?);
        let response: QueryResponse = send_json(
            self.client
                .post(&url)
                .header("Api-Key", &self.api_key)
                .header("X-Pinecone-API-Version", API_VERSION)
                .json(&QueryRequest {
                    vector: embedding,
                    top_k,
                    include_metadata,
                }),
        )?;
        Ok(response.matches)
    }
}

/// Ensures the host carries a scheme and no trailing slash.
fn normalize_host(host: &str) -> Result<String, CorpusError> {
    let host = host.trim().trim_end_matches('/');
    let host = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    };
    reqwest::Url::parse(&host).map_err(|e| CorpusError::InvalidUrl(format!("{}: {}", host, e)))?;
    Ok(host)
}
