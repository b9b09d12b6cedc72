//! Grounding review of a synthesized answer against the raw excerpts.

use std::sync::Arc;

use super::types::GroundingReport;
use crate::llm::{CancellationToken, CompletionClient, LlmError, RetryPolicy, complete_with_retry};
use crate::models::Match;

const SEPARATOR: &str = "\n\n";

/// Concatenates excerpt texts in retrieval order while the total stays within
/// `budget` characters (separators included).
///
/// Stops at the first excerpt that would overflow; no excerpt is ever cut.
pub fn build_review_context(matches: &[Match], budget: usize) -> String {
    let mut context = String::new();
    let mut used = 0;

    for text in matches.iter().filter_map(Match::text) {
        let separator = if context.is_empty() { 0 } else { SEPARATOR.len() };
        let next = used + separator + text.chars().count();
        if next > budget {
            break;
        }
        if separator > 0 {
            context.push_str(SEPARATOR);
        }
        context.push_str(text);
        used = next;
    }

    context
}

/// Builds the reviewer prompt.
pub fn review_prompt(query: &str, answer: &str, context: &str) -> String {
    format!(
        "You are a scientific reviewer. Evaluate whether the following answer is fully supported by the context.\n\
         Query: {query}\n\
         \n\
         Answer:\n\
         {answer}\n\
         \n\
         Context:\n\
         {context}\n\
         \n\
         Does the answer contain any unsupported claims, hallucinations, or fabricated citations? \
         If so, list them. Otherwise, say 'Fully grounded.'"
    )
}

/// Audits an answer for unsupported claims. Read-only: never alters the answer.
pub struct GroundingVerifier {
    client: Arc<dyn CompletionClient>,
    budget: usize,
    retry: RetryPolicy,
}

impl GroundingVerifier {
    pub fn new(client: Arc<dyn CompletionClient>, budget: usize, retry: RetryPolicy) -> Self {
        Self {
            client,
            budget,
            retry,
        }
    }

    /// Reviews `answer` against the original matches.
    ///
    /// A failed review call becomes [`GroundingReport::Unavailable`] instead of an error.
    pub fn verify(
        &self,
        query: &str,
        answer: &str,
        matches: &[Match],
        cancel: &CancellationToken,
    ) -> GroundingReport {
        let context = build_review_context(matches, self.budget);
        let prompt = review_prompt(query, answer, &context);
        tracing::info!(context_chars = context.len(), "Running grounding review");

        match complete_with_retry(&self.client, &prompt, &self.retry, cancel) {
            Ok(review) => GroundingReport::from_review(review),
            Err(error) => {
                if !matches!(error, LlmError::Cancelled) {
                    tracing::warn!(error = %error, "Grounding review unavailable");
                }
                GroundingReport::Unavailable(error.to_string())
            }
        }
    }
}
