//! AI backend response types
//!
//! These types are backend-agnostic and used across all AI implementations.
//! Model output is first read into loose `Raw*` shapes, then validated into
//! the typed results below (see `parsing`).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// How sure the extractor was about its reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionConfidence {
    High,
    #[default]
    Medium,
    Low,
}

impl std::str::FromStr for ExtractionConfidence {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(format!("Unknown confidence: {}", s)),
        }
    }
}

/// Structured expense fields pulled out of a message or receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedExpense {
    /// Always finite and non-negative
    pub total: f64,
    pub vendor: String,
    /// Date as written on the receipt, if any
    pub date: Option<String>,
    pub items: Vec<String>,
    pub confidence: ExtractionConfidence,
}

impl ExtractedExpense {
    /// Vendor for display, `None` when the extractor did not find one
    pub fn known_vendor(&self) -> Option<&str> {
        let vendor = self.vendor.trim();
        if vendor.is_empty() || vendor.eq_ignore_ascii_case("unknown") {
            None
        } else {
            Some(vendor)
        }
    }
}

/// Extraction payload exactly as a model may send it
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RawExtraction {
    #[serde(default)]
    pub total: Option<serde_json::Value>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub items: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub confidence: Option<String>,
}

/// Aggregation requested by an analytics question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    Total,
    #[default]
    Summary,
    Top,
    Breakdown,
}

impl AnalysisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Total => "total",
            Self::Summary => "summary",
            Self::Top => "top",
            Self::Breakdown => "breakdown",
        }
    }
}

impl std::str::FromStr for AnalysisType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "total" => Ok(Self::Total),
            "summary" => Ok(Self::Summary),
            "top" => Ok(Self::Top),
            "breakdown" => Ok(Self::Breakdown),
            _ => Err(format!("Unknown analysis type: {}", s)),
        }
    }
}

/// A structured analytics query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuery {
    /// Human label for the period, e.g. "this month"
    pub timeframe: Option<String>,
    pub category: Option<String>,
    pub analysis_type: AnalysisType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub limit: Option<usize>,
}

/// Outcome of asking the model to parse an analytics question
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParse {
    Valid(ParsedQuery),
    Invalid(String),
}

/// Query payload exactly as a model may send it
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawQuery {
    #[serde(default)]
    pub timeframe: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub analysis_type: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub limit: Option<serde_json::Value>,
    #[serde(default)]
    pub is_valid: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A budget-setting instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetCommand {
    pub category: String,
    pub amount: f64,
    /// Unvalidated; checked when the budget is set
    pub period: String,
}

/// Outcome of asking the model to parse a budget command
#[derive(Debug, Clone, PartialEq)]
pub enum BudgetCommandParse {
    Valid(BudgetCommand),
    Invalid(String),
}

/// Budget payload exactly as a model may send it
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawBudgetCommand {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub amount: Option<serde_json::Value>,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub is_valid: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
}
