//! End-to-end pipeline scenarios driven by in-process mock backends.
//!
//! Every collaborator is swapped for a mock through the public `litsynth::`
//! API, so these tests run without network access or credentials.
//!
//! To run locally:
//! ```bash
//! cargo test --test pipeline_scenarios
//! ```

use std::sync::{Arc, Mutex};

use litsynth::{
    CancellationToken, CompletionClient, CorpusError, CorpusRetriever, Embedder, GroundingReport,
    LlmError, Match, MatchMetadata, PipelineConfig, PipelineError, PipelineOutcome,
    ResearchAssistant, ResearchAssistantBuilder, ResearchReport, RetryPolicy, VectorIndex,
};

const SUMMARY_PREFIX: &str = "You are a scientific assistant. Summarize";
const SYNTHESIS_PREFIX: &str = "You are a scientific assistant. Cite";
const REVIEW_PREFIX: &str = "You are a scientific reviewer.";

// =============================================================================
// Mock backends
// =============================================================================

struct FixedEmbedder;

impl Embedder for FixedEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, CorpusError> {
        Ok(vec![0.25; 8])
    }
}

struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, CorpusError> {
        Err(CorpusError::Http { status: 500 })
    }
}

/// Returns a fixed result list and records the requested `top_k`.
struct FixedIndex {
    matches: Vec<Match>,
    requested: Mutex<Vec<usize>>,
}

impl FixedIndex {
    fn new(matches: Vec<Match>) -> Self {
        Self {
            matches,
            requested: Mutex::new(Vec::new()),
        }
    }
}

impl VectorIndex for FixedIndex {
    fn search(
        &self,
        _embedding: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<Match>, CorpusError> {
        assert!(include_metadata, "metadata must always be requested");
        self.requested.lock().unwrap().push(top_k);
        Ok(self.matches.iter().take(top_k).cloned().collect())
    }
}

type Responder = Box<dyn Fn(&str) -> Result<String, LlmError> + Send + Sync>;

/// Completion client that records every prompt and answers through a closure.
struct ScriptedClient {
    prompts: Mutex<Vec<String>>,
    respond: Responder,
}

impl ScriptedClient {
    fn new(respond: impl Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static) -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        }
    }

    /// Answers every prompt successfully with a stage-specific reply.
    fn cooperative() -> Self {
        Self::new(|prompt| {
            if prompt.starts_with(SUMMARY_PREFIX) {
                Ok("Gap: long-term monitoring is missing [Smith, 2021].".to_string())
            } else if prompt.starts_with(SYNTHESIS_PREFIX) {
                Ok("Monitoring remains the main gap [Smith, 2021].".to_string())
            } else {
                Ok("Fully grounded.".to_string())
            }
        })
    }

    fn prompts_with(&self, prefix: &str) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

impl CompletionClient for ScriptedClient {
    fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        (self.respond)(prompt)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// A paper whose excerpt carries a unique, greppable marker.
fn paper(i: usize) -> Match {
    Match::new(
        0.9 - i as f32 * 0.01,
        MatchMetadata {
            title: Some(format!("Paper {i:02}")),
            author: Some(format!("Author {i:02}")),
            publication_year: Some("2020".to_string()),
            text: Some(format!("body-of-paper-{i:02}")),
        },
    )
}

fn assistant_with(
    embedder: Arc<dyn Embedder>,
    index: Arc<FixedIndex>,
    client: Arc<ScriptedClient>,
) -> ResearchAssistant {
    ResearchAssistantBuilder::new()
        .retriever(CorpusRetriever::new(embedder, index))
        .client(client)
        .config(PipelineConfig {
            retry: RetryPolicy::immediate(2),
            ..Default::default()
        })
        .build()
        .expect("failed to build assistant")
}

fn expect_answer(outcome: PipelineOutcome) -> ResearchReport {
    match outcome {
        PipelineOutcome::Answered(report) => report,
        PipelineOutcome::NoRelevantDocuments => panic!("expected an answer"),
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn thirty_matches_make_six_summaries_and_one_synthesis() {
    let index = Arc::new(FixedIndex::new((0..30).map(paper).collect()));
    let client = Arc::new(ScriptedClient::cooperative());
    let assistant = assistant_with(Arc::new(FixedEmbedder), index.clone(), client.clone());

    let report = expect_answer(
        assistant
            .ask("What limits ocean alkalinity enhancement?", false, &CancellationToken::new())
            .unwrap(),
    );

    assert_eq!(*index.requested.lock().unwrap(), vec![30]);
    assert_eq!(client.prompts_with(SUMMARY_PREFIX).len(), 6);
    assert_eq!(client.prompts_with(SYNTHESIS_PREFIX).len(), 1);
    assert_eq!(client.call_count(), 7);
    assert_eq!(report.match_count, 30);
    assert_eq!(report.batch_count, 6);
    assert!(report.review.is_none());
    assert_eq!(report.answer.citations().len(), 30);
    assert!(!report.answer.coverage().is_degraded());

    // Each summarization prompt holds exactly its own five excerpts.
    let summaries = client.prompts_with(SUMMARY_PREFIX);
    for batch in 0..6 {
        let owner = summaries
            .iter()
            .find(|p| p.contains(&format!("body-of-paper-{:02}", batch * 5)))
            .expect("batch prompt missing");
        for i in 0..30 {
            let marker = format!("body-of-paper-{i:02}");
            assert_eq!(owner.contains(&marker), i / 5 == batch, "{marker}");
        }
    }
}

#[test]
fn synthesis_sees_summaries_in_batch_order() {
    let index = Arc::new(FixedIndex::new((0..15).map(paper).collect()));
    let client = Arc::new(ScriptedClient::new(|prompt| {
        if prompt.starts_with(SUMMARY_PREFIX) {
            let first = prompt
                .find("body-of-paper-")
                .map(|at| &prompt[at..at + 16])
                .unwrap_or("none");
            Ok(format!("summary starting at {first}"))
        } else {
            Ok("answer".to_string())
        }
    }));
    let assistant = assistant_with(Arc::new(FixedEmbedder), index, client.clone());

    assistant
        .ask("q", false, &CancellationToken::new())
        .unwrap();

    let synthesis = &client.prompts_with(SYNTHESIS_PREFIX)[0];
    let positions: Vec<usize> = ["00", "05", "10"]
        .iter()
        .map(|n| {
            synthesis
                .find(&format!("summary starting at body-of-paper-{n}"))
                .expect("summary missing from synthesis prompt")
        })
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn zero_matches_short_circuit_without_completion_calls() {
    let index = Arc::new(FixedIndex::new(Vec::new()));
    let client = Arc::new(ScriptedClient::cooperative());
    let assistant = assistant_with(Arc::new(FixedEmbedder), index, client.clone());

    let outcome = assistant
        .ask("anything about kelp?", true, &CancellationToken::new())
        .unwrap();

    assert!(matches!(outcome, PipelineOutcome::NoRelevantDocuments));
    assert_eq!(client.call_count(), 0);
}

#[test]
fn textless_match_is_cited_but_not_summarized() {
    let textless: Match = serde_json::from_str(
        r#"{
            "id": "doc-1",
            "score": 0.87,
            "metadata": {"title": "Ocean Alkalinity", "author": "Smith", "publication_year": 2021}
        }"#,
    )
    .unwrap();
    let index = Arc::new(FixedIndex::new(vec![textless, paper(1)]));
    let client = Arc::new(ScriptedClient::cooperative());
    let assistant = assistant_with(Arc::new(FixedEmbedder), index, client.clone());

    let report = expect_answer(
        assistant
            .ask("alkalinity gaps", false, &CancellationToken::new())
            .unwrap(),
    );

    let lines: Vec<&str> = report.answer.citations().iter().map(|c| c.as_str()).collect();
    assert!(lines.contains(&"Ocean Alkalinity by Smith (2021)"));

    let summaries = client.prompts_with(SUMMARY_PREFIX);
    assert_eq!(summaries.len(), 1);
    let context = summaries[0]
        .split("Context:\n")
        .nth(1)
        .and_then(|rest| rest.split("\n\nAnswer:").next())
        .unwrap();
    assert_eq!(context, "body-of-paper-01");
    assert!(report.answer.rendered().contains("Sources:\nOcean Alkalinity by Smith (2021)"));
}

#[test]
fn duplicate_papers_are_cited_once() {
    let mut chunk = paper(3);
    chunk.metadata.as_mut().unwrap().text = Some("second chunk of paper three".to_string());
    let index = Arc::new(FixedIndex::new(vec![paper(3), paper(4), chunk]));
    let client = Arc::new(ScriptedClient::cooperative());
    let assistant = assistant_with(Arc::new(FixedEmbedder), index, client);

    let report = expect_answer(assistant.ask("q", false, &CancellationToken::new()).unwrap());

    let rendered = report.answer.rendered();
    assert_eq!(report.answer.citations().len(), 2);
    assert_eq!(rendered.matches("Paper 03 by Author 03 (2020)").count(), 1);
}

#[test]
fn failed_batch_becomes_placeholder_and_answer_is_still_produced() {
    let index = Arc::new(FixedIndex::new((0..10).map(paper).collect()));
    let client = Arc::new(ScriptedClient::new(|prompt| {
        if prompt.starts_with(SUMMARY_PREFIX) && prompt.contains("body-of-paper-05") {
            Err(LlmError::Http { status: 503 })
        } else if prompt.starts_with(SUMMARY_PREFIX) {
            Ok("Gap: dosing trials are short.".to_string())
        } else {
            Ok("Trials are short [Author 00, 2020]. More papers available.".to_string())
        }
    }));
    let assistant = assistant_with(Arc::new(FixedEmbedder), index, client.clone());

    let report = expect_answer(assistant.ask("q", false, &CancellationToken::new()).unwrap());

    // Failing batch tried twice, healthy batch once.
    let failing: Vec<_> = client
        .prompts_with(SUMMARY_PREFIX)
        .into_iter()
        .filter(|p| p.contains("body-of-paper-05"))
        .collect();
    assert_eq!(failing.len(), 2);
    assert_eq!(client.prompts_with(SUMMARY_PREFIX).len(), 3);

    let synthesis = &client.prompts_with(SYNTHESIS_PREFIX)[0];
    assert!(synthesis.contains("More papers available"));
    assert!(synthesis.contains("SUMMARY UNAVAILABLE: excerpts 6-10"));
    assert!(synthesis.contains("Gap: dosing trials are short."));

    assert_eq!(report.answer.coverage().failed_batches, 1);
    assert!(report.answer.coverage().is_degraded());
    // Citations still cover the failed batch's papers.
    assert_eq!(report.answer.citations().len(), 10);
}

#[test]
fn failed_review_reports_unavailable_and_keeps_the_answer() {
    let index = Arc::new(FixedIndex::new((0..3).map(paper).collect()));
    let client = Arc::new(ScriptedClient::new(|prompt| {
        if prompt.starts_with(REVIEW_PREFIX) {
            Err(LlmError::Http { status: 500 })
        } else {
            Ok("Grounded text [Author 00, 2020].".to_string())
        }
    }));
    let assistant = assistant_with(Arc::new(FixedEmbedder), index, client.clone());

    let report = expect_answer(assistant.ask("q", true, &CancellationToken::new()).unwrap());

    assert_eq!(report.answer.answer(), "Grounded text [Author 00, 2020].");
    let review = report.review.expect("review requested");
    assert!(matches!(review, GroundingReport::Unavailable(_)));
    assert_eq!(review.display_text(), "review unavailable");
    assert_eq!(client.prompts_with(REVIEW_PREFIX).len(), 2);
}

#[test]
fn successful_review_audits_rendered_answer() {
    let index = Arc::new(FixedIndex::new((0..2).map(paper).collect()));
    let client = Arc::new(ScriptedClient::cooperative());
    let assistant = assistant_with(Arc::new(FixedEmbedder), index, client.clone());

    let report = expect_answer(assistant.ask("q", true, &CancellationToken::new()).unwrap());

    assert!(matches!(report.review, Some(GroundingReport::Grounded(_))));
    let review = &client.prompts_with(REVIEW_PREFIX)[0];
    assert!(review.contains("Sources:\nPaper 00 by Author 00 (2020)"));
    assert!(review.contains("body-of-paper-00\n\nbody-of-paper-01"));
}

#[test]
fn synthesis_failure_aborts_the_query() {
    let index = Arc::new(FixedIndex::new((0..4).map(paper).collect()));
    let client = Arc::new(ScriptedClient::new(|prompt| {
        if prompt.starts_with(SYNTHESIS_PREFIX) {
            Err(LlmError::Http { status: 502 })
        } else {
            Ok("summary".to_string())
        }
    }));
    let assistant = assistant_with(Arc::new(FixedEmbedder), index, client.clone());

    let error = assistant
        .ask("q", true, &CancellationToken::new())
        .unwrap_err();

    assert!(matches!(error, PipelineError::Synthesis(LlmError::Http { status: 502 })));
    assert!(!error.is_user_error());
    assert!(client.prompts_with(REVIEW_PREFIX).is_empty());
}

#[test]
fn retrieval_failure_is_reported_before_any_completion() {
    let index = Arc::new(FixedIndex::new((0..4).map(paper).collect()));
    let client = Arc::new(ScriptedClient::cooperative());
    let assistant = assistant_with(Arc::new(FailingEmbedder), index.clone(), client.clone());

    let error = assistant
        .ask("q", false, &CancellationToken::new())
        .unwrap_err();

    assert!(matches!(error, PipelineError::Retrieval(_)));
    assert_eq!(error.user_message(), "Could not search the corpus.");
    assert!(index.requested.lock().unwrap().is_empty());
    assert_eq!(client.call_count(), 0);
}

#[test]
fn oversized_excerpts_are_truncated_and_flagged() {
    let mut long = paper(0);
    long.metadata.as_mut().unwrap().text = Some("x".repeat(3500));
    let index = Arc::new(FixedIndex::new(vec![long, paper(1)]));
    let client = Arc::new(ScriptedClient::cooperative());
    let assistant = assistant_with(Arc::new(FixedEmbedder), index, client.clone());

    let report = expect_answer(assistant.ask("q", false, &CancellationToken::new()).unwrap());

    let summary = &client.prompts_with(SUMMARY_PREFIX)[0];
    assert!(summary.contains(&"x".repeat(3000)));
    assert!(!summary.contains(&"x".repeat(3001)));
    assert_eq!(report.answer.coverage().truncated_excerpts, 1);
    assert!(client.prompts_with(SYNTHESIS_PREFIX)[0].contains("You MUST state"));
}

#[test]
fn cancelling_during_slow_synthesis_returns_promptly() {
    use std::time::{Duration, Instant};

    let index = Arc::new(FixedIndex::new((0..3).map(paper).collect()));
    let client = Arc::new(ScriptedClient::new(|prompt| {
        if prompt.starts_with(SYNTHESIS_PREFIX) {
            std::thread::sleep(Duration::from_secs(3));
        }
        Ok("reply".to_string())
    }));
    let assistant = assistant_with(Arc::new(FixedEmbedder), index, client.clone());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let watcher = Arc::clone(&client);
    let canceller = std::thread::spawn(move || {
        // Cancel once the synthesis request is in flight.
        while watcher.prompts_with(SYNTHESIS_PREFIX).is_empty() {
            std::thread::sleep(Duration::from_millis(10));
        }
        trigger.cancel();
    });

    let start = Instant::now();
    let error = assistant.ask("q", true, &cancel).unwrap_err();
    canceller.join().unwrap();

    assert!(matches!(error, PipelineError::Cancelled));
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(client.prompts_with(REVIEW_PREFIX).is_empty());
}
