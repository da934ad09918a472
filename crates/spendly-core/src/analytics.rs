//! Spending reports: natural-language questions and the fixed report commands
//!
//! Aggregation is plain sum/group-by over the fetched rows.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::ai::{AIBackend, AIClient, AnalysisType, ParsedQuery, QueryParse};
use crate::clock::LocalCalendar;
use crate::db::{Database, ExpenseFilter};
use crate::error::Result;
use crate::messages::format_currency;
use crate::models::Expense;

pub const QUERY_EXAMPLES: &str = "*Try these examples:*
• \"How much did I spend on food this month?\"
• \"Show my total expenses for July\"
• \"Top 3 categories last week\"
• \"My shopping expenses today\"";

const DEFAULT_TOP_LIMIT: usize = 5;
const MEDALS: [&str; 4] = ["🥇", "🥈", "🥉", "🏅"];

pub fn analytics_help() -> String {
    format!(
        "📊 *Expense Analytics Help*\n\n{QUERY_EXAMPLES}\n\n*Supported formats:*\n• Time: today, this week, this month, July 2025\n• Categories: food, transport, shopping, etc.\n• Analysis: total, summary, top categories"
    )
}

/// Category totals, largest first (ties by name)
pub fn category_totals(expenses: &[Expense]) -> Vec<(String, f64)> {
    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    for expense in expenses {
        let category = if expense.category.trim().is_empty() {
            "Uncategorized".to_string()
        } else {
            expense.category.clone()
        };
        *totals.entry(category).or_default() += expense.amount;
    }
    let mut sorted: Vec<(String, f64)> = totals.into_iter().collect();
    sorted.sort_by(|a, b| b.1.total_cmp(&a.1));
    sorted
}

fn percentage(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        part / total * 100.0
    } else {
        0.0
    }
}

fn medal(index: usize) -> &'static str {
    MEDALS.get(index).copied().unwrap_or("🏅")
}

fn vendor_label(expense: &Expense) -> &str {
    expense.vendor().unwrap_or("Unknown")
}

fn period_header(timeframe: Option<&str>, category: Option<&str>) -> String {
    let mut header = String::new();
    if let Some(timeframe) = timeframe {
        header.push_str(&format!("📅 Period: {timeframe}\n"));
    }
    if let Some(category) = category {
        header.push_str(&format!("🏷️ Category: {category}\n"));
    }
    if !header.is_empty() {
        header.push('\n');
    }
    header
}

fn no_data(timeframe: Option<&str>, category: Option<&str>) -> String {
    format!(
        "📊 *No expenses found*\n\n{}Start tracking your expenses! 💪",
        period_header(timeframe, category)
    )
}

fn bullet_list(expenses: &[Expense]) -> String {
    expenses
        .iter()
        .map(|e| format!("• ₹{} - {}", format_currency(e.amount), vendor_label(e)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Answers spending questions for one store and calendar
#[derive(Clone)]
pub struct QueryAnalytics {
    db: Database,
    calendar: LocalCalendar,
}

impl QueryAnalytics {
    pub fn new(db: Database, calendar: LocalCalendar) -> Self {
        Self { db, calendar }
    }

    /// Parse a question with the oracle and answer it
    ///
    /// Never fails: parse and storage errors become explanatory replies.
    pub async fn answer(&self, ai: &AIClient, query: &str, user_id: i64, now: DateTime<Utc>) -> String {
        if query.trim().is_empty() {
            return analytics_help();
        }

        let today = self.calendar.today(now);
        let parsed = match ai.parse_expense_query(query, today).await {
            Ok(QueryParse::Valid(parsed)) => parsed,
            Ok(QueryParse::Invalid(reason)) => {
                return format!("❌ *Query not understood*\n\n{reason}\n\n{QUERY_EXAMPLES}");
            }
            Err(e) => {
                warn!(error = %e, "Query parsing failed");
                return Self::analysis_failed();
            }
        };

        match self.execute(&parsed, user_id) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Query execution failed");
                Self::analysis_failed()
            }
        }
    }

    fn analysis_failed() -> String {
        format!(
            "❌ *Analysis failed*\n\nSorry, I couldn't process your query. Please try again or use one of these formats:\n\n{QUERY_EXAMPLES}"
        )
    }

    /// Run a structured query against the user's expenses
    pub fn execute(&self, query: &ParsedQuery, user_id: i64) -> Result<String> {
        let start = self.calendar.start_of_day(query.start_date);
        let end = self.calendar.end_of_day(query.end_date);
        let category = query.category.as_deref();
        let filter = ExpenseFilter::new()
            .user(user_id)
            .category_contains(category)
            .created_between(start, end);
        let expenses = self.db.list_expenses(&filter)?;
        let timeframe = query.timeframe.as_deref();

        if expenses.is_empty() {
            return Ok(no_data(timeframe, category));
        }

        Ok(match query.analysis_type {
            AnalysisType::Total => total_report(&expenses, timeframe, category),
            AnalysisType::Top => top_report(
                &expenses,
                timeframe,
                query.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_TOP_LIMIT),
            ),
            AnalysisType::Summary | AnalysisType::Breakdown => {
                summary_report(&expenses, timeframe, category)
            }
        })
    }

    /// `summary`: the last ten expenses
    pub fn summary(&self, user_id: i64, now: DateTime<Utc>) -> Result<String> {
        let expenses = self
            .db
            .list_expenses(&ExpenseFilter::new().user(user_id).limit(10))?;

        if expenses.is_empty() {
            return Ok("📊 *Your Expense Summary*

No expenses tracked yet! Start by sending me your first expense:
• Text: \"50rs coffee at cafe\"
• Or send a bill photo 📷

Let's start tracking! 💪"
                .to_string());
        }

        let today = self.calendar.today(now);
        let total: f64 = expenses.iter().map(|e| e.amount).sum();
        let today_total: f64 = expenses
            .iter()
            .filter(|e| self.calendar.today(e.created_at) == today)
            .map(|e| e.amount)
            .sum();
        let recent: Vec<Expense> = expenses.iter().take(5).cloned().collect();

        Ok(format!(
            "📊 *Your Expense Summary*

💰 *Total Expenses:* ₹{total:.2}
📅 *Today's Spending:* ₹{today_total:.2}
📈 *Total Entries:* {}

*Recent Expenses:*
{}

Type 'categories' for breakdown or keep tracking! 🚀",
            expenses.len(),
            bullet_list(&recent),
        ))
    }

    /// `today`: everything since local midnight
    pub fn today(&self, user_id: i64, now: DateTime<Utc>) -> Result<String> {
        let today = self.calendar.today(now);
        let filter = ExpenseFilter::new().user(user_id).created_between(
            self.calendar.start_of_day(today),
            self.calendar.end_of_day(today),
        );
        let expenses = self.db.list_expenses(&filter)?;

        if expenses.is_empty() {
            return Ok("📅 *Today's Expenses*

No expenses tracked today yet!

Start tracking:
• \"50rs coffee\"
• Send a bill photo 📷"
                .to_string());
        }

        let total: f64 = expenses.iter().map(|e| e.amount).sum();
        Ok(format!(
            "📅 *Today's Expenses ({})*

💰 *Total:* ₹{total:.2}
📊 *Entries:* {}

{}

Keep it up! 🎯",
            self.calendar.display_date(now),
            expenses.len(),
            bullet_list(&expenses),
        ))
    }

    /// `week`: the last seven days
    pub fn week(&self, user_id: i64, now: DateTime<Utc>) -> Result<String> {
        let filter = ExpenseFilter::new()
            .user(user_id)
            .created_between(now - Duration::days(7), now);
        let expenses = self.db.list_expenses(&filter)?;

        if expenses.is_empty() {
            return Ok("📊 *This Week's Expenses*

No expenses this week yet!

Start tracking your spending! 💪"
                .to_string());
        }

        let total: f64 = expenses.iter().map(|e| e.amount).sum();
        let top = category_totals(&expenses)
            .into_iter()
            .take(5)
            .map(|(category, amount)| format!("• {}: ₹{}", category, format_currency(amount)))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(format!(
            "📊 *This Week's Expenses*

💰 *Total:* ₹{total:.2}
📈 *Daily Average:* ₹{:.2}
📊 *Entries:* {}

*Top Categories:*
{top}

Type 'categories' for detailed breakdown! 📈",
            total / 7.0,
            expenses.len(),
        ))
    }

    /// `categories`: all-time totals, top eight
    pub fn categories(&self, user_id: i64) -> Result<String> {
        let expenses = self.db.list_expenses(&ExpenseFilter::new().user(user_id))?;

        if expenses.is_empty() {
            return Ok("📊 *Category Breakdown*

No expenses to categorize yet!

Start tracking to see your spending patterns! 🎯"
                .to_string());
        }

        let totals = category_totals(&expenses);
        let total: f64 = totals.iter().map(|(_, amount)| amount).sum();
        let lines = totals
            .iter()
            .take(8)
            .map(|(category, amount)| {
                format!(
                    "• {}: ₹{:.2} ({:.1}%)",
                    category,
                    amount,
                    percentage(*amount, total)
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        Ok(format!(
            "📊 *Category Breakdown*

💰 *Total Spending:* ₹{total:.2}

{lines}

Keep tracking to optimize your spending! 🎯"
        ))
    }
}

fn total_report(expenses: &[Expense], timeframe: Option<&str>, category: Option<&str>) -> String {
    let total: f64 = expenses.iter().map(|e| e.amount).sum();
    let count = expenses.len();
    let average = total / count as f64;

    format!(
        "💰 *Total Expenses*\n\n{}💵 *Amount:* ₹{}\n📊 *Transactions:* {}\n📈 *Average:* ₹{}",
        period_header(timeframe, category),
        format_currency(total),
        count,
        format_currency(average),
    )
}

fn summary_report(expenses: &[Expense], timeframe: Option<&str>, category: Option<&str>) -> String {
    let total: f64 = expenses.iter().map(|e| e.amount).sum();

    let mut response = format!(
        "📊 *Expense Summary*\n\n{}💰 *Total:* ₹{}\n📈 *Transactions:* {}\n\n*Top Categories:*\n",
        period_header(timeframe, category),
        format_currency(total),
        expenses.len(),
    );

    for (index, (name, amount)) in category_totals(expenses).iter().take(5).enumerate() {
        response.push_str(&format!(
            "{}. {}: ₹{} ({:.1}%)\n",
            index + 1,
            name,
            format_currency(*amount),
            percentage(*amount, total)
        ));
    }

    // Rows arrive newest first
    if category.is_none() {
        response.push_str("\n*Recent Transactions:*\n");
        for expense in expenses.iter().take(3) {
            response.push_str(&format!(
                "• ₹{} - {}\n",
                format_currency(expense.amount),
                vendor_label(expense)
            ));
        }
    }

    response.trim_end().to_string()
}

fn top_report(expenses: &[Expense], timeframe: Option<&str>, limit: usize) -> String {
    let totals = category_totals(expenses);
    let total: f64 = totals.iter().map(|(_, amount)| amount).sum();

    let mut response = format!(
        "🏆 *Top {} Categories*\n\n{}💰 *Total Spending:* ₹{}\n\n",
        limit,
        period_header(timeframe, None),
        format_currency(total),
    );

    for (index, (name, amount)) in totals.iter().take(limit).enumerate() {
        response.push_str(&format!(
            "{} *{}*\n₹{} ({:.1}%)\n\n",
            medal(index),
            name,
            format_currency(*amount),
            percentage(*amount, total)
        ));
    }

    response.trim_end().to_string()
}
