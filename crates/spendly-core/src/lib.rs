//! Spendly Core Library
//!
//! Shared functionality for the Spendly WhatsApp expense assistant:
//! - Database access and migrations
//! - Pluggable AI backends (Ollama, OpenAI-compatible, mock)
//! - Keyword and AI expense categorization
//! - Budgets with period windows and threshold alerts
//! - Natural-language spending queries
//! - Per-user message rate limiting
//! - Outbound channels (Twilio, Cloudinary, Google Vision) behind traits
//! - The conversation router tying it all together

pub mod ai;
pub mod analytics;
pub mod budget;
pub mod categorize;
pub mod channels;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod intent;
pub mod messages;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod rate_limit;
pub mod router;

/// Test utilities including mock servers and channel fakes
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{AIBackend, AIClient, ExtractedExpense, ExtractionConfidence, MockBackend};
pub use analytics::QueryAnalytics;
pub use budget::{AlertLevel, BudgetAlert, BudgetEvaluator, BudgetUsage};
pub use categorize::{Categorization, CategorizationMethod, Categorizer};
pub use channels::{Channels, LoginLinkIssuer, Messenger};
pub use clock::{Clock, LocalCalendar, SystemClock};
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use intent::{Command, Intent};
pub use models::*;
pub use pipeline::{ExpensePipeline, PipelineOutcome};
pub use prompts::{Prompt, PromptId, PromptLibrary};
pub use rate_limit::{RateLimitConfig, RateLimitDecision, RateLimiter};
pub use router::{ConversationRouter, HandleOutcome, InboundMessage, Route, RouterSettings};
