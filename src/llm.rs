/// Language-model completion client.
///
/// This module provides a blocking HTTP client for OpenAI-compatible chat
/// completion endpoints, plus retry, backoff and cancellation helpers shared by
/// every pipeline stage that calls the model.
mod client;
mod retry;

pub use client::{CompletionClient, LlmError, OpenAiClient, OpenAiClientBuilder};
pub use retry::{
    CancellationToken, RetryPolicy, complete_abortable, complete_with_retry, retry_with_backoff,
};
