//! Per-batch gap summaries.

use std::sync::Arc;

use rayon::prelude::*;

use super::batching::{Batch, truncate};
use super::types::BatchSummary;
use crate::llm::{CancellationToken, CompletionClient, LlmError, RetryPolicy, complete_with_retry};

/// Prompt template for summarizing one batch of excerpts.
const PROMPT_TEMPLATE: &str = r#"You are a scientific assistant. Summarize key research gaps in {subject} based on the following context. Cite specific papers and authors where possible.

Context:
{context}

Answer:"#;

/// Joins the batch's excerpt texts, each cut to `max_chars`, with blank lines.
///
/// Matches without text are skipped. Returns the context and the number of
/// excerpts that were shortened.
pub fn build_batch_context(batch: &Batch<'_>, max_chars: usize) -> (String, usize) {
    let mut truncated = 0;
    let excerpts: Vec<&str> = batch
        .matches
        .iter()
        .filter_map(|m| m.text())
        .map(|text| {
            let cut = truncate(text, max_chars);
            if cut.len() < text.len() {
                truncated += 1;
            }
            cut
        })
        .collect();
    (excerpts.join("\n\n"), truncated)
}

/// Builds the summarization prompt for `subject` around an excerpt context.
pub fn summarization_prompt(subject: &str, context: &str) -> String {
    PROMPT_TEMPLATE
        .replace("{subject}", subject)
        .replace("{context}", context)
}

/// Result of summarizing every batch of one query.
#[derive(Debug)]
pub struct SummaryRun {
    /// One summary per batch, in batch order.
    pub summaries: Vec<BatchSummary>,
    pub truncated_excerpts: usize,
}

/// Summarizes batches of excerpts through the completion service.
pub struct BatchSummarizer {
    client: Arc<dyn CompletionClient>,
    subject: String,
    max_chars: usize,
    retry: RetryPolicy,
}

impl BatchSummarizer {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        subject: impl Into<String>,
        max_chars: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            subject: subject.into(),
            max_chars,
            retry,
        }
    }

    /// Summarizes one batch.
    ///
    /// Never fails: when retries are exhausted the batch yields
    /// [`BatchSummary::Failed`] so the gap stays visible downstream.
    pub fn summarize(&self, batch: &Batch<'_>, cancel: &CancellationToken) -> (BatchSummary, usize) {
        let (context, truncated) = build_batch_context(batch, self.max_chars);
        let prompt = summarization_prompt(&self.subject, &context);
        tracing::debug!(
            batch = batch.index,
            excerpts = batch.len(),
            prompt_chars = prompt.len(),
            "Summarizing batch"
        );

        let summary = match complete_with_retry(&self.client, &prompt, &self.retry, cancel) {
            Ok(text) => BatchSummary::Completed {
                batch_index: batch.index,
                text,
            },
            Err(error) => {
                if !matches!(error, LlmError::Cancelled) {
                    tracing::warn!(batch = batch.index, error = %error, "Batch summary failed, using placeholder");
                }
                BatchSummary::Failed {
                    batch_index: batch.index,
                    first_match: batch.offset,
                    match_count: batch.len(),
                    reason: error.to_string(),
                }
            }
        };
        (summary, truncated)
    }

    /// Summarizes all batches on `pool`, returning summaries in batch order.
    ///
    /// Batches are independent; the pool size bounds how many completion calls
    /// are in flight at once.
    pub fn summarize_all(
        &self,
        batches: &[Batch<'_>],
        pool: &rayon::ThreadPool,
        cancel: &CancellationToken,
    ) -> SummaryRun {
        let results: Vec<(BatchSummary, usize)> = pool.install(|| {
            batches
                .par_iter()
                .with_max_len(1)
                .map(|batch| self.summarize(batch, cancel))
                .collect()
        });

        let truncated_excerpts: usize = results.iter().map(|(_, t)| t).sum();
        SummaryRun {
            summaries: results.into_iter().map(|(s, _)| s).collect(),
            truncated_excerpts,
        }
    }
}
