//! Health checks for litsynth.
//!
//! Provides the `doctor` command functionality:
//! - Credential and settings validation
//! - Completion endpoint connectivity
//! - Embedding endpoint connectivity
//! - Vector index host resolution

use crate::config::Settings;
use crate::corpus::{Embedder, EmbeddingClientBuilder, PineconeIndexBuilder};
use crate::llm::OpenAiClientBuilder;

// ANSI color codes for terminal output
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

/// Health status for a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Component is healthy
    Ok,
    /// Component has a warning but is functional
    Warning(String),
    /// Component is not functional
    Error(String),
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, HealthStatus::Ok)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, HealthStatus::Error(_))
    }
}

/// Result of checking one backend.
#[derive(Debug, Clone)]
pub struct ComponentHealth {
    pub name: &'static str,
    pub status: HealthStatus,
    /// Endpoint or other detail shown dimmed under the status line.
    pub detail: Option<String>,
}

impl ComponentHealth {
    fn new(name: &'static str, status: HealthStatus, detail: Option<String>) -> Self {
        Self {
            name,
            status,
            detail,
        }
    }
}

/// Performs all health checks and prints results.
///
/// Returns `true` when no component reported an error.
pub fn run_health_checks() -> bool {
    let components = match Settings::from_env() {
        Ok(settings) => vec![
            ComponentHealth::new("Configuration", HealthStatus::Ok, None),
            check_completion(&settings),
            check_embedding(&settings),
            check_index(&settings),
        ],
        Err(e) => vec![ComponentHealth::new(
            "Configuration",
            HealthStatus::Error(e.to_string()),
            None,
        )],
    };

    print_health_report(&components);
    components.iter().all(|c| !c.status.is_error())
}

fn check_completion(settings: &Settings) -> ComponentHealth {
    let mut builder = OpenAiClientBuilder::new()
        .api_key(&settings.openai_api_key)
        .timeout(settings.request_timeout);
    if let Some(url) = &settings.openai_base_url {
        builder = builder.base_url(url);
    }
    if let Some(model) = &settings.model {
        builder = builder.model(model);
    }

    let client = match builder.build() {
        Ok(c) => c,
        Err(e) => {
            return ComponentHealth::new(
                "Completion",
                HealthStatus::Error(format!("Failed to build client: {}", e)),
                None,
            );
        }
    };

    let detail = Some(format!("{} ({})", client.base_url(), client.model()));
    let status = match client.list_models() {
        Ok(models) if models.iter().any(|m| m == client.model()) => HealthStatus::Ok,
        Ok(_) => HealthStatus::Warning(format!("Model {} not listed by endpoint", client.model())),
        Err(e) => HealthStatus::Error(format!("Connection failed: {}", e)),
    };
    ComponentHealth::new("Completion", status, detail)
}

fn check_embedding(settings: &Settings) -> ComponentHealth {
    let mut builder = EmbeddingClientBuilder::new().timeout(settings.request_timeout);
    if let Some(url) = &settings.embedding_base_url {
        builder = builder.base_url(url);
    }
    if let Some(model) = &settings.embedding_model {
        builder = builder.model(model);
    }
    if let Some(key) = &settings.embedding_api_key {
        builder = builder.api_key(key);
    }

    let client = match builder.build() {
        Ok(c) => c,
        Err(e) => {
            return ComponentHealth::new(
                "Embedding",
                HealthStatus::Error(format!("Failed to build client: {}", e)),
                None,
            );
        }
    };

    let detail = Some(format!("{} ({})", client.base_url(), client.model()));
    let status = match client.embed("health check") {
        Ok(vector) => {
            tracing::debug!(dimension = vector.len(), "Embedding endpoint answered");
            HealthStatus::Ok
        }
        Err(e) => HealthStatus::Error(format!("Connection failed: {}", e)),
    };
    ComponentHealth::new("Embedding", status, detail)
}

fn check_index(settings: &Settings) -> ComponentHealth {
    let mut builder = PineconeIndexBuilder::new()
        .api_key(&settings.pinecone_api_key)
        .index_name(&settings.pinecone_index_name)
        .timeout(settings.request_timeout);
    if let Some(host) = &settings.pinecone_index_host {
        builder = builder.host(host);
    }

    let index = match builder.build() {
        Ok(i) => i,
        Err(e) => {
            return ComponentHealth::new(
                "Vector index",
                HealthStatus::Error(format!("Failed to build client: {}", e)),
                None,
            );
        }
    };

    match index.resolve_host() {
        Ok(host) => ComponentHealth::new(
            "Vector index",
            HealthStatus::Ok,
            Some(format!("{} @ {}", index.index_name(), host)),
        ),
        Err(e) => ComponentHealth::new(
            "Vector index",
            HealthStatus::Error(format!("Could not resolve index host: {}", e)),
            Some(index.index_name().to_string()),
        ),
    }
}

fn status_symbol(status: &HealthStatus) -> &'static str {
    match status {
        HealthStatus::Ok => "\u{2713}",
        HealthStatus::Warning(_) => "!",
        HealthStatus::Error(_) => "\u{2717}",
    }
}

fn status_color(status: &HealthStatus) -> &'static str {
    match status {
        HealthStatus::Ok => GREEN,
        HealthStatus::Warning(_) => YELLOW,
        HealthStatus::Error(_) => RED,
    }
}

fn status_text(status: &HealthStatus) -> &str {
    match status {
        HealthStatus::Ok => "OK",
        HealthStatus::Warning(w) => w,
        HealthStatus::Error(e) => e,
    }
}

fn print_health_report(components: &[ComponentHealth]) {
    println!("{}litsynth doctor{}", BOLD, RESET);
    println!();

    for component in components {
        println!("{}{}{}", BOLD, component.name, RESET);
        println!(
            "  {}{}{} Status: {}",
            status_color(&component.status),
            status_symbol(&component.status),
            RESET,
            status_text(&component.status)
        );
        if let Some(detail) = &component.detail {
            println!("    {}{}{}", DIM, detail, RESET);
        }
        println!();
    }
}
