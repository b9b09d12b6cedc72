//! Folds batch summaries into one cited answer.

use std::sync::Arc;

use super::types::{BatchSummary, Coverage, SynthesizedAnswer};
use crate::llm::{CancellationToken, CompletionClient, LlmError, RetryPolicy, complete_with_retry};
use crate::models::CitationSet;

/// Builds the second-stage prompt.
///
/// Summaries are joined in batch order. When `coverage` is degraded the prompt
/// also tells the model that part of the corpus was not read, so the
/// "More papers available" statement becomes mandatory.
pub fn synthesis_prompt(query: &str, summaries: &[BatchSummary], coverage: &Coverage) -> String {
    let joined = summaries
        .iter()
        .map(BatchSummary::prompt_text)
        .collect::<Vec<_>>()
        .join("\n\n");

    let coverage_note = if coverage.is_degraded() {
        format!(
            "\nCoverage note: only part of the {} retrieved excerpts reached these summaries \
             ({} batch(es) could not be summarized, {} excerpt(s) were shortened). \
             You MUST state \"More papers available\" in your answer.",
            coverage.total_matches, coverage.failed_batches, coverage.truncated_excerpts
        )
    } else {
        String::new()
    };

    format!(
        "You are a scientific assistant. Cite all information in line as [Author, Year].\n\
         Go through all papers to form a full answer,\n\
         and state \"More papers available\" when there are more papers that you didn't have the memory to go through.{coverage_note}\n\
         Based on the following summaries, synthesize a comprehensive answer to the question: {query}\n\
         \n\
         Summaries:\n\
         {joined}\n\
         \n\
         Answer:"
    )
}

/// Issues the single synthesis call for a query.
pub struct Synthesizer {
    client: Arc<dyn CompletionClient>,
    retry: RetryPolicy,
}

impl Synthesizer {
    pub fn new(client: Arc<dyn CompletionClient>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Produces the final answer and attaches the deduplicated citations.
    ///
    /// Failure here is fatal for the query; no partial answer is returned.
    pub fn synthesize(
        &self,
        query: &str,
        summaries: &[BatchSummary],
        citations: CitationSet,
        coverage: Coverage,
        cancel: &CancellationToken,
    ) -> Result<SynthesizedAnswer, LlmError> {
        let prompt = synthesis_prompt(query, summaries, &coverage);
        tracing::info!(
            summaries = summaries.len(),
            degraded = coverage.is_degraded(),
            prompt_chars = prompt.len(),
            "Synthesizing answer"
        );

        let answer = complete_with_retry(&self.client, &prompt, &self.retry, cancel)?;
        Ok(SynthesizedAnswer::new(answer, citations, coverage))
    }
}
