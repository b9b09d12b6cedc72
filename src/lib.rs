pub mod config;
pub mod corpus;
pub mod doctor;
pub mod error;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod synthesis;

pub use config::{PipelineConfig, Settings};
pub use corpus::{
    CorpusError, CorpusRetriever, Embedder, EmbeddingClient, EmbeddingClientBuilder,
    PineconeIndex, PineconeIndexBuilder, VectorIndex,
};
pub use error::PipelineError;
pub use llm::{
    CancellationToken, CompletionClient, LlmError, OpenAiClient, OpenAiClientBuilder, RetryPolicy,
};
pub use models::{Citation, CitationSet, Match, MatchMetadata};
pub use pipeline::{PipelineOutcome, ResearchAssistant, ResearchAssistantBuilder, ResearchReport};
pub use synthesis::{BatchSummary, Coverage, GroundingReport, SynthesizedAnswer};
