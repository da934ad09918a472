//! OpenAI-compatible backend implementation
//!
//! Works with any server that implements the OpenAI chat completions API:
//! - Gemini (https://generativelanguage.googleapis.com/v1beta/openai)
//! - vLLM (http://localhost:8000)
//! - LocalAI / llama-server (http://localhost:8080)
//!
//! # Configuration
//!
//! Environment variables:
//! - `OPENAI_COMPATIBLE_HOST`: Server URL (required)
//! - `OPENAI_COMPATIBLE_MODEL`: Model name (default: gpt-4o-mini)
//! - `OPENAI_COMPATIBLE_API_KEY`: API key if required (optional)

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

/// OpenAI-compatible backend
///
/// ```rust,ignore
/// // Gemini
/// export OPENAI_COMPATIBLE_HOST="https://generativelanguage.googleapis.com/v1beta/openai"
/// export OPENAI_COMPATIBLE_MODEL="gemini-1.5-flash"
/// export OPENAI_COMPATIBLE_API_KEY="..."
///
/// // vLLM
/// export OPENAI_COMPATIBLE_HOST="http://192.168.1.100:8000"
/// export OPENAI_COMPATIBLE_MODEL="meta-llama/Llama-3.2-3B-Instruct"
/// ```
#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    prompts: Arc<RwLock<PromptLibrary>>,
    retry: RetryPolicy,
}

impl OpenAICompatibleBackend {
    /// Create a new OpenAI-compatible backend
    pub fn new(base_url: &str, model: &str) -> Self {
        let http_client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: None,
            prompts: Arc::new(RwLock::new(PromptLibrary::new())),
            retry: RetryPolicy::default(),
        }
    }

    /// Create with an API key
    pub fn with_api_key(base_url: &str, model: &str, api_key: &str) -> Self {
        let mut backend = Self::new(base_url, model);
        backend.api_key = Some(api_key.to_string());
        backend
    }

    /// Override the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Create from environment variables
    ///
    /// Required: `OPENAI_COMPATIBLE_HOST`
    /// Optional: `OPENAI_COMPATIBLE_MODEL` (default: gpt-4o-mini)
    /// Optional: `OPENAI_COMPATIBLE_API_KEY`
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OPENAI_COMPATIBLE_HOST").ok()?;
        let model = std::env::var("OPENAI_COMPATIBLE_MODEL")
            .unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let api_key = std::env::var("OPENAI_COMPATIBLE_API_KEY").ok();

        let mut backend = Self::new(&host, &model);
        backend.api_key = api_key;
        Some(backend)
    }

    /// Hosts that already carry a versioned prefix (Gemini's `/v1beta/openai`)
    /// take `/chat/completions` directly.
    fn endpoint(&self, path: &str) -> String {
        if self.base_url.ends_with("/v1") || self.base_url.ends_with("/openai") {
            format!("{}/{}", self.base_url, path)
        } else {
            format!("{}/v1/{}", self.base_url, path)
        }
    }

    /// Make a chat completion request
    async fn chat_completion(&self, prompt: &str) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: Some(0.1),
            stream: false,
        };

        let mut req_builder = self
            .http_client
            .post(self.endpoint("chat/completions"))
            .json(&request);

        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.bearer_auth(api_key);
        }

        let response = req_builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Ai(format!("OpenAI API error {}: {}", status, body)));
        }

        let chat_response: ChatCompletionResponse = response.json().await?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Ai("No response from OpenAI API".into()))?;
        debug!("OpenAI-compatible response: {}", content);
        Ok(content)
    }
}

/// OpenAI chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

/// Chat message
#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// OpenAI chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[async_trait]
impl AIBackend for OpenAICompatibleBackend {
    async fn extract_expense(&self, text: &str) -> Result<ExtractedExpense> {
        let mut vars = HashMap::new();
        vars.insert("text", text);
        let prompt = render_prompt(&self.prompts, PromptId::ExtractExpense, &vars)?;

        self.retry
            .run("extract_expense", || async {
                let response = self.chat_completion(&prompt).await?;
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

        let response = self.chat_completion(&prompt).await?;
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
                let response = self.chat_completion(&prompt).await?;
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
                let response = self.chat_completion(&prompt).await?;
                parse_budget_response(&response)
            })
            .await
    }

    async fn health_check(&self) -> bool {
        let mut req_builder = self.http_client.get(self.endpoint("models"));
        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.bearer_auth(api_key);
        }

        match req_builder.send().await {
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
