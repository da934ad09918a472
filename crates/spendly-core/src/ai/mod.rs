//! Pluggable AI backend abstraction
//!
//! The model-backed oracles used by the bot: expense extraction,
//! categorization, analytics query parsing and budget command parsing.
//!
//! # Architecture
//!
//! - `AIBackend` trait: defines the interface for all AI operations
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OllamaBackend`, `OpenAICompatibleBackend`, `MockBackend`
//!
//! Every answer passes through `parsing`, so callers only ever see validated
//! `ExtractedExpense`, `QueryParse` and `BudgetCommandParse` values.
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_BACKEND`: Backend to use (ollama, openai_compatible, mock). Default: ollama
//! - `OLLAMA_HOST`: Ollama server URL (required for ollama backend)
//! - `OLLAMA_MODEL`: Default model name (default: llama3.2)
//! - `OPENAI_COMPATIBLE_HOST`: Server URL (required for openai_compatible backend).
//!   Gemini works through its OpenAI-compatible endpoint.
//! - `OPENAI_COMPATIBLE_MODEL`: Model name (default: gpt-4o-mini)
//! - `OPENAI_COMPATIBLE_API_KEY`: API key if required (optional)

mod mock;
mod ollama;
mod openai_compatible;
pub mod parsing;
pub mod types;

pub use mock::MockBackend;
pub use ollama::OllamaBackend;
pub use openai_compatible::OpenAICompatibleBackend;
pub use types::*;

use std::collections::HashMap;
use std::future::Future;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::warn;

use crate::error::{Error, Result};
use crate::models::Category;
use crate::prompts::{PromptId, PromptLibrary};

/// Timeout applied to every model HTTP call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait defining the interface for all AI backends
///
/// Backends should be Send + Sync to allow use across async tasks.
#[async_trait]
pub trait AIBackend: Send + Sync {
    /// Pull structured expense fields out of free text or OCR output
    ///
    /// Retried internally according to the backend's `RetryPolicy`.
    async fn extract_expense(&self, text: &str) -> Result<ExtractedExpense>;

    /// Ask for a category name; single attempt, the answer is not validated here
    async fn categorize_expense(&self, text: &str, vendor: &str, amount: f64) -> Result<String>;

    /// Turn an analytics question into a structured query
    async fn parse_expense_query(&self, query: &str, today: NaiveDate) -> Result<QueryParse>;

    /// Turn a budget instruction into category/amount/period
    async fn parse_budget_command(&self, command: &str) -> Result<BudgetCommandParse>;

    /// Check if the backend is available
    async fn health_check(&self) -> bool;

    /// Get the model name (for logging)
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Fixed-backoff retry for oracle calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Run `op` until it succeeds or attempts run out, returning the last error
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    warn!(operation, attempt, error = %e, "AI call failed, retrying");
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Category vocabulary as a bulleted list for prompts
pub(crate) fn category_list() -> String {
    Category::KNOWN
        .iter()
        .map(|c| format!("- {}", c.as_str()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a prompt from a shared library
pub(crate) fn render_prompt(
    prompts: &RwLock<PromptLibrary>,
    id: PromptId,
    vars: &HashMap<&str, &str>,
) -> Result<String> {
    let mut prompts = prompts
        .write()
        .map_err(|_| Error::Ai("Failed to acquire prompt library lock".into()))?;
    prompts.render(id, vars)
}

/// Concrete AI client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
/// All variants implement the same AIBackend operations.
#[derive(Clone)]
pub enum AIClient {
    /// Ollama backend (HTTP API)
    Ollama(OllamaBackend),
    /// OpenAI-compatible backend (Gemini, vLLM, LocalAI, llama-server, etc.)
    OpenAICompatible(OpenAICompatibleBackend),
    /// Mock backend for testing and offline use
    Mock(MockBackend),
}

impl AIClient {
    /// Create an AI client from environment variables
    ///
    /// Checks `AI_BACKEND` to determine which backend to use:
    /// - `ollama` (default): Uses OLLAMA_HOST and OLLAMA_MODEL
    /// - `openai_compatible`: Uses OPENAI_COMPATIBLE_HOST and OPENAI_COMPATIBLE_MODEL
    /// - `mock`: Heuristic offline backend
    ///
    /// Returns None if the required environment variables are not set.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("AI_BACKEND").unwrap_or_else(|_| "ollama".to_string());

        match backend.to_lowercase().as_str() {
            "ollama" => OllamaBackend::from_env().map(AIClient::Ollama),
            "openai_compatible" | "openai" | "gemini" | "vllm" | "localai" | "llamacpp" => {
                OpenAICompatibleBackend::from_env().map(AIClient::OpenAICompatible)
            }
            "mock" => Some(AIClient::Mock(MockBackend::new())),
            _ => {
                warn!(backend = %backend, "Unknown AI_BACKEND, falling back to ollama");
                OllamaBackend::from_env().map(AIClient::Ollama)
            }
        }
    }

    /// Create an Ollama backend directly
    pub fn ollama(host: &str, model: &str) -> Self {
        AIClient::Ollama(OllamaBackend::new(host, model))
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }

    /// Short backend label for health output
    pub fn backend_name(&self) -> &'static str {
        match self {
            AIClient::Ollama(_) => "ollama",
            AIClient::OpenAICompatible(_) => "openai_compatible",
            AIClient::Mock(_) => "mock",
        }
    }
}

// Implement AIBackend for AIClient by delegating to the inner backend
#[async_trait]
impl AIBackend for AIClient {
    async fn extract_expense(&self, text: &str) -> Result<ExtractedExpense> {
        match self {
            AIClient::Ollama(b) => b.extract_expense(text).await,
            AIClient::OpenAICompatible(b) => b.extract_expense(text).await,
            AIClient::Mock(b) => b.extract_expense(text).await,
        }
    }

    async fn categorize_expense(&self, text: &str, vendor: &str, amount: f64) -> Result<String> {
        match self {
            AIClient::Ollama(b) => b.categorize_expense(text, vendor, amount).await,
            AIClient::OpenAICompatible(b) => b.categorize_expense(text, vendor, amount).await,
            AIClient::Mock(b) => b.categorize_expense(text, vendor, amount).await,
        }
    }

    async fn parse_expense_query(&self, query: &str, today: NaiveDate) -> Result<QueryParse> {
        match self {
            AIClient::Ollama(b) => b.parse_expense_query(query, today).await,
            AIClient::OpenAICompatible(b) => b.parse_expense_query(query, today).await,
            AIClient::Mock(b) => b.parse_expense_query(query, today).await,
        }
    }

    async fn parse_budget_command(&self, command: &str) -> Result<BudgetCommandParse> {
        match self {
            AIClient::Ollama(b) => b.parse_budget_command(command).await,
            AIClient::OpenAICompatible(b) => b.parse_budget_command(command).await,
            AIClient::Mock(b) => b.parse_budget_command(command).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AIClient::Ollama(b) => b.health_check().await,
            AIClient::OpenAICompatible(b) => b.health_check().await,
            AIClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::Ollama(b) => b.model(),
            AIClient::OpenAICompatible(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::Ollama(b) => b.host(),
            AIClient::OpenAICompatible(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}
