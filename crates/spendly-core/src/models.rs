//! Domain models for Spendly

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A WhatsApp user, keyed by phone number
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub phone_number: String,
    pub name: Option<String>,
    /// Cleared once the onboarding welcome has been sent
    pub is_first_time: bool,
    pub created_at: DateTime<Utc>,
}

/// Expense categories understood by the categorizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Food & Dining")]
    FoodAndDining,
    Transportation,
    Shopping,
    Groceries,
    Entertainment,
    Healthcare,
    Utilities,
    Education,
    #[serde(rename = "Personal Care")]
    PersonalCare,
    Miscellaneous,
    /// Only assigned when extraction fails on an image
    Uncategorized,
}

impl Category {
    /// Categories the AI oracle may answer with
    pub const KNOWN: [Category; 10] = [
        Self::FoodAndDining,
        Self::Transportation,
        Self::Shopping,
        Self::Groceries,
        Self::Entertainment,
        Self::Healthcare,
        Self::Utilities,
        Self::Education,
        Self::PersonalCare,
        Self::Miscellaneous,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FoodAndDining => "Food & Dining",
            Self::Transportation => "Transportation",
            Self::Shopping => "Shopping",
            Self::Groceries => "Groceries",
            Self::Entertainment => "Entertainment",
            Self::Healthcare => "Healthcare",
            Self::Utilities => "Utilities",
            Self::Education => "Education",
            Self::PersonalCare => "Personal Care",
            Self::Miscellaneous => "Miscellaneous",
            Self::Uncategorized => "Uncategorized",
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    /// Exact match on the display name
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::KNOWN
            .iter()
            .chain(std::iter::once(&Self::Uncategorized))
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown category: {}", s))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Expense source - how it was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseSource {
    /// Typed into WhatsApp
    #[default]
    Whatsapp,
    /// Entered through the dashboard upload form
    Manual,
    /// Receipt photo sent over WhatsApp
    Image,
}

impl ExpenseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Whatsapp => "whatsapp",
            Self::Manual => "manual",
            Self::Image => "image",
        }
    }
}

impl std::str::FromStr for ExpenseSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "whatsapp" => Ok(Self::Whatsapp),
            "manual" => Ok(Self::Manual),
            "image" => Ok(Self::Image),
            _ => Err(format!("Unknown expense source: {}", s)),
        }
    }
}

impl std::fmt::Display for ExpenseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recorded expense
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub user_id: i64,
    pub amount: f64,
    pub category: String,
    pub description: Option<String>,
    pub source: ExpenseSource,
    pub raw_text: Option<String>,
    pub image_url: Option<String>,
    /// Extraction payload as returned by the model, after validation
    pub structured_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Expense {
    /// Vendor parsed back out of a `Vendor: X | Date: Y` description
    pub fn vendor(&self) -> Option<&str> {
        let description = self.description.as_deref()?;
        let rest = description.strip_prefix("Vendor: ")?;
        let vendor = rest.split(" | ").next()?.trim();
        if vendor.is_empty() || vendor == "N/A" {
            None
        } else {
            Some(vendor)
        }
    }
}

/// New expense for insertion
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub user_id: i64,
    pub amount: f64,
    pub category: String,
    pub description: Option<String>,
    pub source: ExpenseSource,
    pub raw_text: Option<String>,
    pub image_url: Option<String>,
    pub structured_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Budget period kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl BudgetPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

impl std::str::FromStr for BudgetPeriod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            _ => Err("Invalid period. Use monthly, weekly, or daily".to_string()),
        }
    }
}

impl std::fmt::Display for BudgetPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A per-user, per-category spending envelope for one period instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub id: i64,
    pub user_id: i64,
    pub category: String,
    pub amount: f64,
    pub period: BudgetPeriod,
    pub start_date: DateTime<Utc>,
    /// Inclusive end of the window
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
    pub alert_threshold: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Budget {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start_date <= at && at <= self.end_date
    }
}

/// New budget for insertion
#[derive(Debug, Clone)]
pub struct NewBudget {
    pub user_id: i64,
    pub category: String,
    pub amount: f64,
    pub period: BudgetPeriod,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub alert_threshold: f64,
    pub created_at: DateTime<Utc>,
}

/// Dashboard statistics for one month
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseStats {
    pub total_amount: f64,
    pub total_expenses: i64,
    /// Category name -> amount
    pub categories: BTreeMap<String, f64>,
    /// `YYYY-MM-DD` -> amount
    pub daily_spending: BTreeMap<String, f64>,
}
