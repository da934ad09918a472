//! Ollama backend implementation
//!
//! HTTP client for the Ollama `/api/generate` endpoint, using the prompt
//! library for customizable prompts.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::prompts::{PromptId, PromptLibrary};

use super::parsing::{parse_budget_response, parse_extraction, parse_query_response};
use super::types::{BudgetCommandParse, ExtractedExpense, QueryParse};
use super::{category_list, render_prompt, AIBackend, RetryPolicy, DEFAULT_TIMEOUT};

/// Ollama backend
#[derive(Clone)]
pub struct OllamaBackend {
    http_client: Client,
    base_url: String,
    model: String,
    prompts: Arc<RwLock<PromptLibrary>>,
    retry: RetryPolicy,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    pub fn new(base_url: &str, model: &str) -> Self {
        let http_client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            prompts: Arc::new(RwLock::new(PromptLibrary::new())),
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Create from environment variables
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OLLAMA_HOST").ok()?;
        let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string());
        Some(Self::new(&host, &model))
    }

    /// Single non-streaming generate call
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
        };

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Ai(format!("Ollama API error {}: {}", status, body)));
        }

        let ollama_response: OllamaResponse = response.json().await?;
        debug!("Ollama response: {}", ollama_response.response);

        Ok(ollama_response.response)
    }
}

/// Request to Ollama API
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
}

/// Response from Ollama API
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[async_trait]
impl AIBackend for OllamaBackend {
    async fn extract_expense(&self, text: &str) -> Result<ExtractedExpense> {
        let mut vars = HashMap::new();
        vars.insert("text", text);
        let prompt = render_prompt(&self.prompts, PromptId::ExtractExpense, &vars)?;

        self.retry
            .run("extract_expense", || async {
                let response = self.generate(&prompt).await?;
                parse_extraction(&response)
            })
            .await
    }

    async fn categorize_expense(&self, text: &str, vendor: &str, amount: f64) -> Result<String> {
        let amount = amount.to_string();
        let categories = category_list();
        let mut vars = HashMap::new();
        vars.insert("text", text);
        vars.insert("vendor", vendor);
        vars.insert("amount", amount.as_str());
        vars.insert("categories", categories.as_str());
        let prompt = render_prompt(&self.prompts, PromptId::CategorizeExpense, &vars)?;

        let response = self.generate(&prompt).await?;
        Ok(response.trim().to_string())
    }

    async fn parse_expense_query(&self, query: &str, today: NaiveDate) -> Result<QueryParse> {
        let today_str = today.format("%Y-%m-%d").to_string();
        let categories = category_list();
        let mut vars = HashMap::new();
        vars.insert("query", query);
        vars.insert("today", today_str.as_str());
        vars.insert("categories", categories.as_str());
        let prompt = render_prompt(&self.prompts, PromptId::ParseExpenseQuery, &vars)?;

        self.retry
            .run("parse_expense_query", || async {
                let response = self.generate(&prompt).await?;
                parse_query_response(&response, today)
            })
            .await
    }

    async fn parse_budget_command(&self, command: &str) -> Result<BudgetCommandParse> {
        let categories = category_list();
        let mut vars = HashMap::new();
        vars.insert("command", command);
        vars.insert("categories", categories.as_str());
        let prompt = render_prompt(&self.prompts, PromptId::ParseBudgetCommand, &vars)?;

        self.retry
            .run("parse_budget_command", || async {
                let response = self.generate(&prompt).await?;
                parse_budget_response(&response)
            })
            .await
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockOllamaServer;
    use std::time::Duration;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_extract_expense_against_mock_server() {
        let server = MockOllamaServer::start(r#"{"total": "50", "vendor": "ccd"}"#).await;
        let backend = OllamaBackend::new(&server.url(), "test").with_retry(fast_retry());

        let extracted = backend.extract_expense("50rs coffee at ccd").await.unwrap();
        assert_eq!(extracted.total, 50.0);
        assert_eq!(extracted.vendor, "ccd");
        assert!(backend.health_check().await);
    }

    #[tokio::test]
    async fn test_extract_expense_retries_then_fails() {
        let server = MockOllamaServer::start("I could not find an amount").await;
        let backend = OllamaBackend::new(&server.url(), "test").with_retry(fast_retry());

        assert!(backend.extract_expense("hello").await.is_err());
        assert_eq!(server.request_count(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_unhealthy() {
        let backend = OllamaBackend::new("http://127.0.0.1:9", "test").with_retry(RetryPolicy::none());
        assert!(!backend.health_check().await);
        assert!(backend.categorize_expense("x", "y", 1.0).await.is_err());
    }
}
