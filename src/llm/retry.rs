//! Bounded retry with exponential backoff, and cooperative cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use super::{CompletionClient, LlmError};

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Upper bound on a server-requested `Retry-After` wait.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Shared flag that lets the caller abandon in-flight work.
///
/// Clones observe the same flag. Once cancelled a token stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration`, waking early if the token is cancelled.
    ///
    /// Returns `false` if the sleep was cut short by cancellation.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(CANCEL_POLL_INTERVAL.min(deadline - now));
        }
    }
}

/// How many times a completion call is attempted and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles for each following retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// A policy that retries immediately. Used by tests and offline tooling.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

/// Runs `f` until it succeeds, a non-retryable error occurs, attempts run out,
/// or `cancel` fires.
///
/// Delays follow `policy` (1s, 2s, 4s, ... with the default policy). Only
/// transient errors are retried: network failures, timeouts, HTTP 429 and 5xx.
pub fn retry_with_backoff<F, T>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut f: F,
) -> Result<T, LlmError>
where
    F: FnMut() -> Result<T, LlmError>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }

        let error = match f() {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !should_retry(&error) || attempt >= max_attempts {
            return Err(error);
        }

        let delay = retry_delay(policy, attempt, &error);
        tracing::warn!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Completion request failed, retrying"
        );

        if !cancel.sleep(delay) {
            return Err(LlmError::Cancelled);
        }
        attempt += 1;
    }
}

/// Calls `client.complete(prompt)` under `policy`.
///
/// Each attempt runs through [`complete_abortable`], so cancelling the token
/// also abandons an attempt that is already waiting on the service.
pub fn complete_with_retry(
    client: &Arc<dyn CompletionClient>,
    prompt: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<String, LlmError> {
    retry_with_backoff(policy, cancel, || complete_abortable(client, prompt, cancel))
}

/// Runs one `complete` call on a worker thread and waits for its reply,
/// returning [`LlmError::Cancelled`] as soon as `cancel` fires.
///
/// An abandoned call keeps running until the client returns or its HTTP
/// timeout expires; its reply is dropped.
pub fn complete_abortable(
    client: &Arc<dyn CompletionClient>,
    prompt: &str,
    cancel: &CancellationToken,
) -> Result<String, LlmError> {
    if cancel.is_cancelled() {
        return Err(LlmError::Cancelled);
    }

    let (sender, receiver) = mpsc::channel();
    let worker = Arc::clone(client);
    let prompt = prompt.to_owned();
    thread::Builder::new()
        .name("litsynth-completion".to_string())
        .spawn(move || {
            // The receiver is gone if the caller gave up.
            sender.send(worker.complete(&prompt)).ok();
        })
        .map_err(|e| LlmError::Api {
            message: format!("could not start completion worker: {e}"),
        })?;

    loop {
        match receiver.recv_timeout(CANCEL_POLL_INTERVAL) {
            Ok(result) => return result,
            Err(RecvTimeoutError::Timeout) => {
                if cancel.is_cancelled() {
                    tracing::info!("Abandoning in-flight completion request");
                    return Err(LlmError::Cancelled);
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(LlmError::Api {
                    message: "completion worker exited without a reply".to_string(),
                });
            }
        }
    }
}

/// Wait before the next attempt. A server-supplied `Retry-After` replaces the
/// policy delay, capped at [`MAX_RETRY_AFTER`].
fn retry_delay(policy: &RetryPolicy, attempt: u32, error: &LlmError) -> Duration {
    match error {
        LlmError::RateLimited { retry_after } => (*retry_after).min(MAX_RETRY_AFTER),
        _ => policy.delay_after(attempt),
    }
}

/// Returns `true` for transient errors worth another attempt.
fn should_retry(error: &LlmError) -> bool {
    match error {
        LlmError::Network(_) => true,
        LlmError::Timeout(_) => true,
        LlmError::Http { status } => *status == 429 || (500..600).contains(status),
        LlmError::RateLimited { .. } => true,
        LlmError::Serialization(_) => false,
        LlmError::Api { .. } => false,
        LlmError::InvalidUrl(_) => false,
        LlmError::Cancelled => false,
    }
}
