use std::sync::Arc;

use super::{CorpusError, Embedder, VectorIndex};
use crate::models::Match;

/// Embeds a query and runs one similarity search against the corpus index.
#[derive(Clone)]
pub struct CorpusRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl CorpusRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Returns up to `top_k` matches in the order the index produced them.
    ///
    /// An empty result is a valid outcome, not an error.
    pub fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<Match>, CorpusError> {
        let embedding = self.embedder.embed(query)?;
        let mut matches = self.index.search(&embedding, top_k, true)?;
        // Some backends ignore topK on small indexes.
        matches.truncate(top_k);
        tracing::info!(top_k, found = matches.len(), "Retrieved matches");
        Ok(matches)
    }
}
