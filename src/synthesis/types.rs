//! Types passed between synthesis stages.

use serde::Serialize;

use crate::models::CitationSet;

/// Outcome of summarizing one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchSummary {
    /// The model returned a summary for the batch.
    Completed { batch_index: usize, text: String },
    /// Every attempt failed; the batch is represented by a placeholder.
    Failed {
        batch_index: usize,
        first_match: usize,
        match_count: usize,
        reason: String,
    },
}

impl BatchSummary {
    pub fn batch_index(&self) -> usize {
        match self {
            Self::Completed { batch_index, .. } | Self::Failed { batch_index, .. } => *batch_index,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Text handed to the synthesis prompt.
    ///
    /// Failed batches become an explicit gap notice so the model does not claim
    /// coverage of excerpts it never saw.
    pub fn prompt_text(&self) -> String {
        match self {
            Self::Completed { text, .. } => text.clone(),
            Self::Failed {
                first_match,
                match_count,
                reason,
                ..
            } => format!(
                "[SUMMARY UNAVAILABLE: excerpts {}-{} ({} papers) could not be summarized ({}). \
                 Their content is NOT covered by these summaries.]",
                first_match + 1,
                first_match + match_count,
                match_count,
                reason
            ),
        }
    }
}

/// How much of the retrieved material actually reached the synthesis prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Coverage {
    pub total_matches: usize,
    pub failed_batches: usize,
    pub truncated_excerpts: usize,
}

impl Coverage {
    /// True when some retrieved material could not be summarized in full.
    pub fn is_degraded(&self) -> bool {
        self.failed_batches > 0 || self.truncated_excerpts > 0
    }
}

/// Final cited answer plus the deduplicated sources it was built from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesizedAnswer {
    answer: String,
    citations: CitationSet,
    coverage: Coverage,
}

impl SynthesizedAnswer {
    pub fn new(answer: String, citations: CitationSet, coverage: Coverage) -> Self {
        Self {
            answer,
            citations,
            coverage,
        }
    }

    /// The model's answer text, without the sources block.
    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn citations(&self) -> &CitationSet {
        &self.citations
    }

    pub fn coverage(&self) -> Coverage {
        self.coverage
    }

    /// Answer followed by a `Sources:` block, one citation per line.
    pub fn rendered(&self) -> String {
        format!("{}\n\nSources:\n{}", self.answer, self.citations.to_lines())
    }
}

/// Verdict of the grounding review. Advisory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum GroundingReport {
    /// The reviewer found every claim supported.
    Grounded(String),
    /// The reviewer listed unsupported claims.
    Flagged(String),
    /// The review call failed; the answer stands without a review.
    Unavailable(String),
}

impl GroundingReport {
    /// Classifies a reviewer reply as grounded or flagged.
    ///
    /// The status is a heuristic over free text: a reply is `Grounded` when its
    /// first sentence says "fully grounded" without a negation before it. The
    /// full reply is kept either way.
    pub fn from_review(text: String) -> Self {
        if states_fully_grounded(&text) {
            Self::Grounded(text)
        } else {
            Self::Flagged(text)
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Unavailable(_))
    }

    /// Text shown to the user.
    pub fn display_text(&self) -> &str {
        match self {
            Self::Grounded(text) | Self::Flagged(text) => text,
            Self::Unavailable(_) => "review unavailable",
        }
    }
}

const NEGATIONS: [&str; 7] = ["not", "isn't", "isn’t", "isnt", "never", "no", "cannot"];

fn states_fully_grounded(reply: &str) -> bool {
    let lowered = reply.to_lowercase();
    let first_sentence = lowered
        .split(['.', '!', '?', '\n'])
        .find(|s| s.chars().any(char::is_alphanumeric))
        .unwrap_or_default();
    let Some(at) = first_sentence.find("fully grounded") else {
        return false;
    };
    !first_sentence[..at]
        .split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '’'))
        .any(|word| NEGATIONS.contains(&word))
}
