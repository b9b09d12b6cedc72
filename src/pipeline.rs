//! End-to-end research question answering.
//!
//! `ResearchAssistant` wires the retriever, the batch summarizer, the
//! synthesizer and the optional grounding verifier into one call per query.

use std::sync::Arc;

use serde::Serialize;

use crate::config::PipelineConfig;
use crate::corpus::CorpusRetriever;
use crate::error::PipelineError;
use crate::llm::{CancellationToken, CompletionClient, LlmError};
use crate::models::{CitationSet, Match};
use crate::synthesis::{
    BatchSummarizer, Coverage, GroundingReport, GroundingVerifier, SynthesizedAnswer, Synthesizer,
    partition,
};

/// A completed answer with its optional review.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchReport {
    pub answer: SynthesizedAnswer,
    pub review: Option<GroundingReport>,
    pub match_count: usize,
    pub batch_count: usize,
}

/// Result of asking one question.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// The search returned nothing; no completion calls were made.
    NoRelevantDocuments,
    Answered(ResearchReport),
}

/// Builder for constructing `ResearchAssistant` instances.
#[derive(Default)]
pub struct ResearchAssistantBuilder {
    retriever: Option<CorpusRetriever>,
    client: Option<Arc<dyn CompletionClient>>,
    config: Option<PipelineConfig>,
}

impl ResearchAssistantBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the corpus retriever.
    pub fn retriever(mut self, retriever: CorpusRetriever) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Sets the completion client shared by every stage.
    pub fn client(mut self, client: Arc<dyn CompletionClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Overrides the default pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds the `ResearchAssistant`.
    ///
    /// Fails with [`PipelineError::Configuration`] if a collaborator is missing,
    /// the configuration is invalid, or the worker pool cannot be created.
    pub fn build(self) -> Result<ResearchAssistant, PipelineError> {
        let retriever = self
            .retriever
            .ok_or_else(|| PipelineError::Configuration("retriever must be set".to_string()))?;
        let client = self.client.ok_or_else(|| {
            PipelineError::Configuration("completion client must be set".to_string())
        })?;
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_concurrency)
            .thread_name(|i| format!("litsynth-summarize-{i}"))
            .build()
            .map_err(|e| PipelineError::Configuration(format!("worker pool: {e}")))?;

        Ok(ResearchAssistant {
            retriever,
            summarizer: BatchSummarizer::new(
                client.clone(),
                config.subject.clone(),
                config.batch_chars,
                config.retry,
            ),
            synthesizer: Synthesizer::new(client.clone(), config.retry),
            verifier: GroundingVerifier::new(client, config.review_chars, config.retry),
            pool,
            config,
        })
    }
}

/// Answers research questions from the literature corpus.
pub struct ResearchAssistant {
    retriever: CorpusRetriever,
    summarizer: BatchSummarizer,
    synthesizer: Synthesizer,
    verifier: GroundingVerifier,
    pool: rayon::ThreadPool,
    config: PipelineConfig,
}

impl ResearchAssistant {
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the full pipeline for `query`.
    ///
    /// Retrieval and synthesis failures abort the query. Failed batches are
    /// carried as placeholders and a failed review is reported as unavailable;
    /// neither stops the answer.
    pub fn ask(
        &self,
        query: &str,
        review: bool,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, PipelineError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PipelineError::EmptyQuery);
        }
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let matches = self
            .retriever
            .retrieve(query, self.config.top_k)
            .map_err(PipelineError::Retrieval)?;
        if matches.is_empty() {
            tracing::info!("No relevant documents found");
            return Ok(PipelineOutcome::NoRelevantDocuments);
        }

        let answer = self.answer_from_matches(query, &matches, cancel)?;

        let review = if review {
            Some(self.verifier.verify(query, &answer.rendered(), &matches, cancel))
        } else {
            None
        };
        // An abandoned query yields no answer, even if the last call completed.
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        Ok(PipelineOutcome::Answered(ResearchReport {
            match_count: matches.len(),
            batch_count: matches.len().div_ceil(self.config.batch_size),
            answer,
            review,
        }))
    }

    /// Summarizes `matches` batch by batch and synthesizes the cited answer.
    pub fn answer_from_matches(
        &self,
        query: &str,
        matches: &[Match],
        cancel: &CancellationToken,
    ) -> Result<SynthesizedAnswer, PipelineError> {
        let batches = partition(matches, self.config.batch_size);
        tracing::info!(
            matches = matches.len(),
            batches = batches.len(),
            "Summarizing batches"
        );

        let run = self.summarizer.summarize_all(&batches, &self.pool, cancel);
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let citations: CitationSet = batches.iter().flat_map(|b| b.citations()).collect();
        let coverage = Coverage {
            total_matches: matches.len(),
            failed_batches: run.summaries.iter().filter(|s| s.is_failed()).count(),
            truncated_excerpts: run.truncated_excerpts,
        };

        let answer = self
            .synthesizer
            .synthesize(query, &run.summaries, citations, coverage, cancel)
            .map_err(|error| match error {
                LlmError::Cancelled => PipelineError::Cancelled,
                other => PipelineError::Synthesis(other),
            })?;
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(answer)
    }
}
