//! Query-level error taxonomy.
//!
//! Batch summarization and grounding-review failures are not errors at this
//! level: they degrade into `BatchSummary::Failed` and
//! `GroundingReport::Unavailable` and the query continues.

use thiserror::Error;

use crate::corpus::CorpusError;
use crate::llm::LlmError;

/// Failures that stop a query.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing credentials or invalid settings; nothing was run.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The query was empty or whitespace only.
    #[error("Query cannot be empty")]
    EmptyQuery,

    /// Embedding or similarity search failed.
    #[error("Retrieval failed: {0}")]
    Retrieval(#[source] CorpusError),

    /// The final synthesis call failed after retries.
    #[error("Synthesis failed: {0}")]
    Synthesis(#[source] LlmError),

    /// The caller abandoned the query.
    #[error("Query cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Short message suitable for showing to the person who asked.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "The assistant is not configured; check credentials and settings.",
            Self::EmptyQuery => "Please enter a research question.",
            Self::Retrieval(_) => "Could not search the corpus.",
            Self::Synthesis(_) => "Could not synthesize an answer from the retrieved papers.",
            Self::Cancelled => "The query was cancelled.",
        }
    }

    /// True for errors caused by input or configuration rather than a backend.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::EmptyQuery)
    }
}
