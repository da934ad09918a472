//! Mock backend for testing
//!
//! By default answers with cheap regex heuristics, which also makes it usable
//! as an offline backend (`AI_BACKEND=mock`). Tests can script any answer or
//! force any operation to fail, and read back how often each was called.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;

use crate::categorize::keyword_categorize;
use crate::error::{Error, Result};
use crate::models::Category;

use super::parsing::{BUDGET_NOT_UNDERSTOOD, INVALID_AMOUNT};
use super::types::{
    AnalysisType, BudgetCommand, BudgetCommandParse, ExtractedExpense, ExtractionConfidence,
    ParsedQuery, QueryParse,
};
use super::AIBackend;

static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)").expect("valid regex")
});

static VENDOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:at|from|to|@)\s+([a-z][\w&']*(?:\s+[a-z][\w&']*)?)").expect("valid regex")
});

static TOP_N_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\btop\s+(\d+)").expect("valid regex"));

const VENDOR_STOPWORDS: &[&str] = &["for", "on", "today", "yesterday", "and", "with"];

/// Everyday words mapped onto the category vocabulary
const CATEGORY_SYNONYMS: &[(&str, Category)] = &[
    ("food", Category::FoodAndDining),
    ("dining", Category::FoodAndDining),
    ("restaurant", Category::FoodAndDining),
    ("eating out", Category::FoodAndDining),
    ("transport", Category::Transportation),
    ("travel", Category::Transportation),
    ("cab", Category::Transportation),
    ("fuel", Category::Transportation),
    ("shopping", Category::Shopping),
    ("grocer", Category::Groceries),
    ("entertainment", Category::Entertainment),
    ("movie", Category::Entertainment),
    ("health", Category::Healthcare),
    ("medic", Category::Healthcare),
    ("utilit", Category::Utilities),
    ("bill", Category::Utilities),
    ("education", Category::Education),
    ("personal care", Category::PersonalCare),
    ("gym", Category::PersonalCare),
    ("beauty", Category::PersonalCare),
];

fn category_from_words(text: &str) -> Option<Category> {
    let lower = text.to_lowercase();
    CATEGORY_SYNONYMS
        .iter()
        .find(|(word, _)| lower.contains(word))
        .map(|(_, category)| *category)
}

fn first_amount(text: &str) -> Option<f64> {
    AMOUNT_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
}

/// Scripted behaviour for one operation
#[derive(Clone, Debug, Default)]
enum Scripted<T> {
    #[default]
    Heuristic,
    Reply(T),
    Fail,
}

#[derive(Debug, Default)]
struct CallCounts {
    extract: AtomicUsize,
    categorize: AtomicUsize,
    query: AtomicUsize,
    budget: AtomicUsize,
}

/// Mock AI backend for testing
#[derive(Clone)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    extraction: Scripted<ExtractedExpense>,
    category: Scripted<String>,
    query: Scripted<QueryParse>,
    budget: Scripted<BudgetCommandParse>,
    calls: Arc<CallCounts>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a new mock backend (healthy, heuristic answers)
    pub fn new() -> Self {
        Self {
            healthy: true,
            extraction: Scripted::Heuristic,
            category: Scripted::Heuristic,
            query: Scripted::Heuristic,
            budget: Scripted::Heuristic,
            calls: Arc::new(CallCounts::default()),
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            ..Self::new()
        }
    }

    /// Always return this extraction
    pub fn with_extraction(mut self, extracted: ExtractedExpense) -> Self {
        self.extraction = Scripted::Reply(extracted);
        self
    }

    /// Make every extraction fail
    pub fn failing_extraction(mut self) -> Self {
        self.extraction = Scripted::Fail;
        self
    }

    /// Always answer categorization with this raw string
    pub fn with_category(mut self, answer: &str) -> Self {
        self.category = Scripted::Reply(answer.to_string());
        self
    }

    /// Make every categorization call fail
    pub fn failing_categorization(mut self) -> Self {
        self.category = Scripted::Fail;
        self
    }

    /// Always return this query parse
    pub fn with_query(mut self, parse: QueryParse) -> Self {
        self.query = Scripted::Reply(parse);
        self
    }

    /// Make every query parse fail
    pub fn failing_query(mut self) -> Self {
        self.query = Scripted::Fail;
        self
    }

    /// Always return this budget command parse
    pub fn with_budget_command(mut self, parse: BudgetCommandParse) -> Self {
        self.budget = Scripted::Reply(parse);
        self
    }

    pub fn extract_calls(&self) -> usize {
        self.calls.extract.load(Ordering::SeqCst)
    }

    pub fn categorize_calls(&self) -> usize {
        self.calls.categorize.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> usize {
        self.calls.query.load(Ordering::SeqCst)
    }

    pub fn budget_calls(&self) -> usize {
        self.calls.budget.load(Ordering::SeqCst)
    }

    fn heuristic_extraction(text: &str) -> Result<ExtractedExpense> {
        let total = first_amount(text)
            .ok_or_else(|| Error::Ai(format!("No amount found in: {}", text)))?;

        let vendor = VENDOR_RE
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| {
                m.as_str()
                    .split_whitespace()
                    .take_while(|w| !VENDOR_STOPWORDS.contains(&w.to_lowercase().as_str()))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "Unknown".to_string());

        Ok(ExtractedExpense {
            total,
            vendor,
            date: None,
            items: Vec::new(),
            confidence: ExtractionConfidence::Medium,
        })
    }

    fn heuristic_query(query: &str, today: NaiveDate) -> QueryParse {
        let lower = query.to_lowercase();
        let month_start = today.with_day(1).unwrap_or(today);

        let (timeframe, start_date, end_date) = if lower.contains("yesterday") {
            let day = today - Duration::days(1);
            ("yesterday", day, day)
        } else if lower.contains("today") {
            ("today", today, today)
        } else if lower.contains("last week") {
            (
                "last week",
                today - Duration::days(13),
                today - Duration::days(7),
            )
        } else if lower.contains("week") {
            ("this week", today - Duration::days(6), today)
        } else if lower.contains("last month") {
            let end = month_start - Duration::days(1);
            ("last month", end.with_day(1).unwrap_or(end), end)
        } else if lower.contains("year") {
            (
                "this year",
                NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today),
                today,
            )
        } else {
            ("this month", month_start, today)
        };

        let limit = TOP_N_RE
            .captures(&lower)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok());

        let analysis_type = if lower.contains("top") {
            AnalysisType::Top
        } else if lower.contains("breakdown") {
            AnalysisType::Breakdown
        } else if lower.contains("how much") || lower.contains("total") {
            AnalysisType::Total
        } else {
            AnalysisType::Summary
        };

        QueryParse::Valid(ParsedQuery {
            timeframe: Some(timeframe.to_string()),
            category: category_from_words(&lower).map(|c| c.as_str().to_string()),
            analysis_type,
            start_date,
            end_date,
            limit,
        })
    }

    fn heuristic_budget(command: &str) -> BudgetCommandParse {
        let lower = command.to_lowercase();

        let Some(category) = category_from_words(&lower) else {
            return BudgetCommandParse::Invalid(BUDGET_NOT_UNDERSTOOD.to_string());
        };

        let amount = match first_amount(&lower) {
            Some(amount) if amount > 0.0 => amount,
            _ => return BudgetCommandParse::Invalid(INVALID_AMOUNT.to_string()),
        };

        let period = if lower.contains("daily") || lower.contains("day") {
            "daily"
        } else if lower.contains("weekly") || lower.contains("week") {
            "weekly"
        } else {
            "monthly"
        };

        BudgetCommandParse::Valid(BudgetCommand {
            category: category.as_str().to_string(),
            amount,
            period: period.to_string(),
        })
    }
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn extract_expense(&self, text: &str) -> Result<ExtractedExpense> {
        self.calls.extract.fetch_add(1, Ordering::SeqCst);
        match &self.extraction {
            Scripted::Heuristic => Self::heuristic_extraction(text),
            Scripted::Reply(extracted) => Ok(extracted.clone()),
            Scripted::Fail => Err(Error::Ai("mock extraction failure".into())),
        }
    }

    async fn categorize_expense(&self, text: &str, vendor: &str, _amount: f64) -> Result<String> {
        self.calls.categorize.fetch_add(1, Ordering::SeqCst);
        match &self.category {
            Scripted::Heuristic => {
                let guess = keyword_categorize(text, vendor);
                Ok(guess.category.as_str().to_string())
            }
            Scripted::Reply(answer) => Ok(answer.clone()),
            Scripted::Fail => Err(Error::Ai("mock categorization failure".into())),
        }
    }

    async fn parse_expense_query(&self, query: &str, today: NaiveDate) -> Result<QueryParse> {
        self.calls.query.fetch_add(1, Ordering::SeqCst);
        match &self.query {
            Scripted::Heuristic => Ok(Self::heuristic_query(query, today)),
            Scripted::Reply(parse) => Ok(parse.clone()),
            Scripted::Fail => Err(Error::Ai("mock query failure".into())),
        }
    }

    async fn parse_budget_command(&self, command: &str) -> Result<BudgetCommandParse> {
        self.calls.budget.fetch_add(1, Ordering::SeqCst);
        match &self.budget {
            Scripted::Heuristic => Ok(Self::heuristic_budget(command)),
            Scripted::Reply(parse) => Ok(parse.clone()),
            Scripted::Fail => Err(Error::Ai("mock budget failure".into())),
        }
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}
