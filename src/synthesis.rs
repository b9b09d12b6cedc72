//! Retrieval-to-answer synthesis.
//!
//! Matches are split into fixed-size batches, each batch is summarized by the
//! completion service, the summaries are folded into one cited answer, and an
//! optional review pass checks that answer against the raw excerpts.

mod batching;
mod summarizer;
mod synthesizer;
mod types;
mod verifier;

pub use batching::{Batch, partition, truncate};
pub use summarizer::{BatchSummarizer, SummaryRun, build_batch_context, summarization_prompt};
pub use synthesizer::{Synthesizer, synthesis_prompt};
pub use types::{BatchSummary, Coverage, GroundingReport, SynthesizedAnswer};
pub use verifier::{GroundingVerifier, build_review_context, review_prompt};
