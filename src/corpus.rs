//! Corpus retrieval: query embedding plus vector similarity search.

mod embedding;
mod index;
mod retriever;

use thiserror::Error;

pub use embedding::{Embedder, EmbeddingClient, EmbeddingClientBuilder};
pub use index::{PineconeIndex, PineconeIndexBuilder, VectorIndex};
pub use retriever::CorpusRetriever;

/// Errors raised by the embedding service or the vector index.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Request timed out")]
    Timeout(#[source] reqwest::Error),

    #[error("HTTP error: status {status}")]
    Http { status: u16 },

    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("Backend error: {message}")]
    Api { message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl CorpusError {
    fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            CorpusError::Timeout(error)
        } else {
            CorpusError::Network(error)
        }
    }
}

/// Sends a prepared request and decodes a JSON body, mapping failures to `CorpusError`.
fn send_json<T: serde::de::DeserializeOwned>(
    request: reqwest::blocking::RequestBuilder,
) -> Result<T, CorpusError> {
    let response = request.send().map_err(CorpusError::from_reqwest)?;

    let status = response.status();
    if !status.is_success() {
        return Err(CorpusError::Http {
            status: status.as_u16(),
        });
    }

    let body = response.text().map_err(CorpusError::from_reqwest)?;
    serde_json::from_str(&body).map_err(CorpusError::Serialization)
}
