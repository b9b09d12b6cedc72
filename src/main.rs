use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use litsynth::{
    CancellationToken, Citation, CorpusRetriever, EmbeddingClientBuilder, OpenAiClientBuilder,
    PineconeIndexBuilder, PipelineError, PipelineOutcome, ResearchAssistantBuilder, ResearchReport,
    Settings,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

const NO_DOCUMENTS: &str = "No relevant documents found.";

/// Conventional exit status for a process stopped by SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// litsynth - cited research answers from a literature corpus
#[derive(Parser)]
#[command(name = "litsynth")]
#[command(about = "Answer research questions with cited syntheses of a literature corpus")]
#[command(version)]
struct Cli {
    /// Log pipeline progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Ask a research question
    Ask(AskCommand),
    /// Check credentials and backend connectivity
    Doctor,
}

/// Ask a research question
#[derive(Parser)]
struct AskCommand {
    /// The research question
    #[arg(value_name = "QUERY")]
    query: String,

    /// Also run a grounding review of the answer
    #[arg(short, long)]
    review: bool,

    /// Number of excerpts to retrieve
    #[arg(long, value_name = "N")]
    top_k: Option<usize>,

    /// Excerpts per summarization call
    #[arg(long, value_name = "N")]
    batch_size: Option<usize>,

    /// Summarization calls in flight at once
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match &cli.command {
        Commands::Ask(cmd) => handle_ask(cmd),
        Commands::Doctor => handle_doctor(),
    };

    if let Err(e) = result {
        let exit_code = if is_user_error(&e) {
            1
        } else if matches!(
            e.downcast_ref::<PipelineError>(),
            Some(PipelineError::Cancelled)
        ) {
            INTERRUPTED_EXIT_CODE
        } else {
            2
        };
        match e.downcast_ref::<PipelineError>() {
            Some(pipeline_error) => {
                eprintln!("Error: {}", pipeline_error.user_message());
                eprintln!("  {e:#}");
            }
            None => eprintln!("Error: {e:#}"),
        }
        std::process::exit(exit_code);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Determines if an error is a user error (vs a backend failure).
fn is_user_error(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<PipelineError>()
        .is_some_and(PipelineError::is_user_error)
}

fn handle_doctor() -> Result<()> {
    if litsynth::doctor::run_health_checks() {
        Ok(())
    } else {
        anyhow::bail!("One or more health checks failed")
    }
}

/// Handles the ask command: loads settings, wires the backends, runs the pipeline.
fn handle_ask(cmd: &AskCommand) -> Result<()> {
    if cmd.query.trim().is_empty() {
        return Err(PipelineError::EmptyQuery.into());
    }

    let mut settings = Settings::from_env()?;
    if let Some(top_k) = cmd.top_k {
        settings.pipeline.top_k = top_k;
    }
    if let Some(batch_size) = cmd.batch_size {
        settings.pipeline.batch_size = batch_size;
    }
    if let Some(concurrency) = cmd.concurrency {
        settings.pipeline.max_concurrency = concurrency;
    }

    let assistant = build_assistant(&settings)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    ctrlc::set_handler(move || {
        if first_interrupt(&on_interrupt) {
            eprintln!("Cancelling query; press Ctrl-C again to exit immediately");
        } else {
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    })
    .context("Failed to install Ctrl-C handler")?;

    let outcome = assistant.ask(&cmd.query, cmd.review, &cancel)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&JsonOutput::from(&outcome))?);
        return Ok(());
    }

    match outcome {
        PipelineOutcome::NoRelevantDocuments => println!("{NO_DOCUMENTS}"),
        PipelineOutcome::Answered(report) => print_report(&report),
    }
    Ok(())
}

/// Cancels the query. Returns false if it was already cancelled by an earlier Ctrl-C.
fn first_interrupt(cancel: &CancellationToken) -> bool {
    let repeated = cancel.is_cancelled();
    cancel.cancel();
    !repeated
}

/// Machine-readable form of one `ask` run.
#[derive(Debug, Serialize)]
struct JsonOutput<'a> {
    answer: &'a str,
    citations: Vec<&'a Citation>,
    degraded: bool,
    review: Option<&'a str>,
}

impl<'a> From<&'a PipelineOutcome> for JsonOutput<'a> {
    fn from(outcome: &'a PipelineOutcome) -> Self {
        match outcome {
            PipelineOutcome::NoRelevantDocuments => Self {
                answer: NO_DOCUMENTS,
                citations: Vec::new(),
                degraded: false,
                review: None,
            },
            PipelineOutcome::Answered(report) => Self {
                answer: report.answer.answer(),
                citations: report.answer.citations().iter().collect(),
                degraded: report.answer.coverage().is_degraded(),
                review: report.review.as_ref().map(|r| r.display_text()),
            },
        }
    }
}

fn build_assistant(settings: &Settings) -> Result<litsynth::ResearchAssistant> {
    let mut completion = OpenAiClientBuilder::new()
        .api_key(&settings.openai_api_key)
        .timeout(settings.request_timeout);
    if let Some(url) = &settings.openai_base_url {
        completion = completion.base_url(url);
    }
    if let Some(model) = &settings.model {
        completion = completion.model(model);
    }
    let completion = completion
        .build()
        .context("Failed to create completion client")?;

    let mut embedding = EmbeddingClientBuilder::new().timeout(settings.request_timeout);
    if let Some(url) = &settings.embedding_base_url {
        embedding = embedding.base_url(url);
    }
    if let Some(model) = &settings.embedding_model {
        embedding = embedding.model(model);
    }
    if let Some(key) = &settings.embedding_api_key {
        embedding = embedding.api_key(key);
    }
    let embedding = embedding
        .build()
        .context("Failed to create embedding client")?;

    let mut index = PineconeIndexBuilder::new()
        .api_key(&settings.pinecone_api_key)
        .index_name(&settings.pinecone_index_name)
        .timeout(settings.request_timeout);
    if let Some(host) = &settings.pinecone_index_host {
        index = index.host(host);
    }
    let index = index.build().context("Failed to create index client")?;

    let assistant = ResearchAssistantBuilder::new()
        .retriever(CorpusRetriever::new(Arc::new(embedding), Arc::new(index)))
        .client(Arc::new(completion))
        .config(settings.pipeline.clone())
        .build()?;
    Ok(assistant)
}

fn print_report(report: &ResearchReport) {
    println!("Synthesized Answer");
    println!("==================");
    println!("{}", report.answer.rendered());

    if let Some(review) = &report.review {
        println!();
        println!("Grounding Review");
        println!("================");
        println!("{}", review.display_text());
    }
}
