//! Inbound text classification
//!
//! Order is fixed: exact command vocabulary, then greetings, then the
//! natural-language patterns (budget patterns before analytics), and anything
//! left is an expense description.

use std::sync::LazyLock;

use regex::Regex;

/// Fixed commands with a dedicated handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    Summary,
    Today,
    Week,
    Categories,
    ListBudgets,
    BudgetStatus,
    BudgetHelp,
    Login,
}

impl Command {
    /// Exact (case-insensitive, trimmed) match against the vocabulary
    pub fn parse(text: &str) -> Option<Self> {
        let command = match text.trim().to_lowercase().as_str() {
            "help" => Self::Help,
            "summary" => Self::Summary,
            "today" => Self::Today,
            "week" => Self::Week,
            "categories" => Self::Categories,
            "budgets" | "list budgets" => Self::ListBudgets,
            "budget status" => Self::BudgetStatus,
            "budget" => Self::BudgetHelp,
            "login" | "dashboard" => Self::Login,
            _ => return None,
        };
        Some(command)
    }
}

/// What an inbound text message is asking for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Command(Command),
    Greeting,
    BudgetCommand(String),
    NaturalQuery(String),
    Expense(String),
}

const GREETINGS: &[&str] = &["hi", "hello", "hey", "start", "begin"];

static BUDGET_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"(?i)set.*budget", r"(?i)budget.*for"]
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
});

static QUERY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)how much.*spen[dt].*on",
        r"(?i)show.*total.*expenses",
        r"(?i)show.*expenses?",
        r"(?i)expenses.*for.*month",
        r"(?i)expenses.*this.*month",
        r"(?i)top.*categories",
        r"(?i)spend.*this",
        r"(?i)spend.*last",
        r"(?i)total.*spent",
        r"(?i)expenses? for",
        r"(?i)spending.*on",
        r"(?i)breakdown",
        r"(?i)monthly.*expenses",
        r"(?i)weekly.*expenses",
        r"(?i)daily.*expenses",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

pub fn is_greeting(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    GREETINGS.contains(&lower.as_str())
}

pub fn is_budget_command(text: &str) -> bool {
    BUDGET_PATTERNS.iter().any(|p| p.is_match(text))
}

pub fn is_natural_query(text: &str) -> bool {
    QUERY_PATTERNS.iter().any(|p| p.is_match(text))
}

/// Classify a non-empty text message
pub fn classify(text: &str) -> Intent {
    if let Some(command) = Command::parse(text) {
        return Intent::Command(command);
    }
    if is_greeting(text) {
        return Intent::Greeting;
    }

    let text = text.trim().to_string();
    if is_budget_command(&text) {
        Intent::BudgetCommand(text)
    } else if is_natural_query(&text) {
        Intent::NaturalQuery(text)
    } else {
        Intent::Expense(text)
    }
}
