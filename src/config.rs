//! Runtime settings loaded from the environment.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::PipelineError;
use crate::llm::RetryPolicy;

pub const DEFAULT_TOP_K: usize = 30;
pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const DEFAULT_BATCH_CHARS: usize = 3000;
pub const DEFAULT_REVIEW_CHARS: usize = 6000;
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_SUBJECT: &str = "mCDR";
pub const DEFAULT_INDEX_NAME: &str = "ices-database-assistant";

const REDACTED: &str = "<redacted>";

/// Tunables for one run of the retrieval-to-synthesis pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Matches requested from the similarity search.
    pub top_k: usize,
    /// Matches per summarization call.
    pub batch_size: usize,
    /// Per-excerpt character budget inside a batch prompt.
    pub batch_chars: usize,
    /// Cumulative character budget for the grounding review context.
    pub review_chars: usize,
    /// Summarization calls allowed in flight at once.
    pub max_concurrency: usize,
    pub retry: RetryPolicy,
    /// Research area named in the summarization prompt.
    pub subject: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_chars: DEFAULT_BATCH_CHARS,
            review_chars: DEFAULT_REVIEW_CHARS,
            max_concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
            subject: DEFAULT_SUBJECT.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Rejects values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let positive = [
            ("top_k", self.top_k),
            ("batch_size", self.batch_size),
            ("batch_chars", self.batch_chars),
            ("review_chars", self.review_chars),
            ("max_concurrency", self.max_concurrency),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(PipelineError::Configuration(format!(
                    "{name} must be at least 1"
                )));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(PipelineError::Configuration(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything needed to construct the backend clients and the pipeline.
///
/// `Debug` output redacts the API keys.
#[derive(Clone)]
pub struct Settings {
    pub openai_api_key: String,
    pub openai_base_url: Option<String>,
    pub model: Option<String>,
    pub pinecone_api_key: String,
    pub pinecone_index_name: String,
    pub pinecone_index_host: Option<String>,
    pub embedding_base_url: Option<String>,
    pub embedding_model: Option<String>,
    pub embedding_api_key: Option<String>,
    pub request_timeout: Duration,
    pub pipeline: PipelineConfig,
}

impl Settings {
    /// Loads settings from the process environment (after reading `.env`).
    ///
    /// Fails with [`PipelineError::Configuration`] when `OPENAI_API_KEY` or
    /// `PINECONE_API_KEY` is missing or a numeric setting does not parse.
    pub fn from_env() -> Result<Self, PipelineError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let openai_api_key = get("OPENAI_API_KEY");
        let pinecone_api_key = get("PINECONE_API_KEY");
        let (openai_api_key, pinecone_api_key) = match (openai_api_key, pinecone_api_key) {
            (Some(openai), Some(pinecone)) => (openai, pinecone),
            (openai, pinecone) => {
                let missing: Vec<&str> = [
                    openai.is_none().then_some("OPENAI_API_KEY"),
                    pinecone.is_none().then_some("PINECONE_API_KEY"),
                ]
                .into_iter()
                .flatten()
                .collect();
                return Err(PipelineError::Configuration(format!(
                    "Missing API keys: set {} as environment variables",
                    missing.join(" and ")
                )));
            }
        };

        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            top_k: parse_or(&get, "LITSYNTH_TOP_K", defaults.top_k)?,
            batch_size: parse_or(&get, "LITSYNTH_BATCH_SIZE", defaults.batch_size)?,
            batch_chars: parse_or(&get, "LITSYNTH_BATCH_CHARS", defaults.batch_chars)?,
            review_chars: parse_or(&get, "LITSYNTH_REVIEW_CHARS", defaults.review_chars)?,
            max_concurrency: parse_or(&get, "LITSYNTH_CONCURRENCY", defaults.max_concurrency)?,
            retry: RetryPolicy {
                max_attempts: parse_or(&get, "LITSYNTH_MAX_ATTEMPTS", defaults.retry.max_attempts)?,
                ..defaults.retry
            },
            subject: get("LITSYNTH_SUBJECT").unwrap_or(defaults.subject),
        };
        pipeline.validate()?;

        let timeout_secs: u64 = parse_or(&get, "LITSYNTH_TIMEOUT_SECS", 60)?;

        Ok(Settings {
            openai_api_key,
            openai_base_url: get("OPENAI_BASE_URL"),
            model: get("LITSYNTH_MODEL"),
            pinecone_api_key,
            pinecone_index_name: get("PINECONE_INDEX_NAME")
                .unwrap_or_else(|| DEFAULT_INDEX_NAME.to_string()),
            pinecone_index_host: get("PINECONE_INDEX_HOST"),
            embedding_base_url: get("EMBEDDING_BASE_URL"),
            embedding_model: get("EMBEDDING_MODEL"),
            embedding_api_key: get("EMBEDDING_API_KEY"),
            request_timeout: Duration::from_secs(timeout_secs.max(1)),
            pipeline,
        })
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("openai_api_key", &REDACTED)
            .field("openai_base_url", &self.openai_base_url)
            .field("model", &self.model)
            .field("pinecone_api_key", &REDACTED)
            .field("pinecone_index_name", &self.pinecone_index_name)
            .field("pinecone_index_host", &self.pinecone_index_host)
            .field("embedding_base_url", &self.embedding_base_url)
            .field("embedding_model", &self.embedding_model)
            .field(
                "embedding_api_key",
                &self.embedding_api_key.as_ref().map(|_| REDACTED),
            )
            .field("request_timeout", &self.request_timeout)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, PipelineError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e| {
            PipelineError::Configuration(format!("{key}={raw:?} is not valid: {e}"))
        }),
    }
}
