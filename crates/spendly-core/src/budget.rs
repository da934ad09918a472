//! Budget envelopes: setting, rollover, alerts and status
//!
//! A budget covers one window of its period (calendar month, Sunday-start
//! week, or day in the local calendar). Spend is the sum of the user's
//! expenses whose category contains the budget's category, case-insensitively,
//! inside that window.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::ai::{AIBackend, AIClient, BudgetCommandParse};
use crate::clock::LocalCalendar;
use crate::db::{Database, ExpenseFilter};
use crate::error::{Error, Result};
use crate::messages::format_currency;
use crate::models::{Budget, BudgetPeriod, Expense, NewBudget};

pub const DEFAULT_ALERT_THRESHOLD: f64 = 0.8;

pub const BUDGET_EXAMPLES: &str = "*Examples:*
• \"Set budget for food as 5000 this month\"
• \"Set travel budget 3000 monthly\"
• \"Budget 2000 for shopping weekly\"";

pub fn budget_help() -> String {
    format!(
        "💰 *Budget Help*\n\n{BUDGET_EXAMPLES}\n\n*Commands:*\n• 'budget status' - View all budgets\n• 'list budgets' - List your budgets"
    )
}

/// One period instance, both ends inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// The window of `period` that contains `now`
pub fn period_window(
    period: BudgetPeriod,
    now: DateTime<Utc>,
    calendar: &LocalCalendar,
) -> BudgetWindow {
    let today = calendar.today(now);
    let (first, last) = match period {
        BudgetPeriod::Monthly => (
            LocalCalendar::month_start(today),
            LocalCalendar::month_end(today),
        ),
        BudgetPeriod::Weekly => {
            let start = LocalCalendar::week_start(today);
            (start, start + chrono::Duration::days(6))
        }
        BudgetPeriod::Daily => (today, today),
    };
    BudgetWindow {
        start: calendar.start_of_day(first),
        end: calendar.end_of_day(last),
    }
}

/// Result of a set-budget request
#[derive(Debug, Clone, PartialEq)]
pub enum SetBudgetOutcome {
    Created(Budget),
    /// An active budget already covered this window; its amount changed
    Updated(Budget),
}

impl SetBudgetOutcome {
    pub fn budget(&self) -> &Budget {
        match self {
            Self::Created(b) | Self::Updated(b) => b,
        }
    }

    pub fn message(&self) -> String {
        let (heading, budget) = match self {
            Self::Created(b) => ("Budget Set!", b),
            Self::Updated(b) => ("Budget Updated!", b),
        };
        format!(
            "✅ *{heading}*\n\n🏷️ Category: {}\n💰 Amount: ₹{}\n📅 Period: {}\n⏰ Alert at: {:.0}% (₹{})\n\nI'll keep track for you! 🎯",
            budget.category,
            format_currency(budget.amount),
            budget.period,
            budget.alert_threshold * 100.0,
            format_currency(budget.amount * budget.alert_threshold),
        )
    }
}

/// Spend against one budget
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetUsage {
    pub budget: Budget,
    pub spent: f64,
    pub remaining: f64,
    pub percentage: f64,
    pub expense_count: i64,
}

impl BudgetUsage {
    fn status_icon(&self) -> &'static str {
        if self.percentage >= 100.0 {
            "🔴"
        } else if self.percentage >= 80.0 {
            "🟡"
        } else {
            "🟢"
        }
    }

    fn format_status(&self) -> String {
        format!(
            "{} *{}*\n💰 Budget: ₹{}\n💸 Spent: ₹{} ({:.1}%)\n💵 Remaining: ₹{}\n📅 Period: {}\n\n",
            self.status_icon(),
            self.budget.category,
            format_currency(self.budget.amount),
            format_currency(self.spent),
            self.percentage,
            format_currency(self.remaining),
            self.budget.period,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    /// Crossed the alert threshold
    Warning,
    /// At or past 100%
    Exceeded,
}

/// Alert raised by a new expense
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetAlert {
    pub level: AlertLevel,
    pub usage: BudgetUsage,
}

impl BudgetAlert {
    fn from_usage(usage: BudgetUsage) -> Option<Self> {
        let level = if usage.percentage >= 100.0 {
            AlertLevel::Exceeded
        } else if usage.percentage >= usage.budget.alert_threshold * 100.0 {
            AlertLevel::Warning
        } else {
            return None;
        };
        Some(Self { level, usage })
    }

    pub fn message(&self) -> String {
        let (heading, footer) = match self.level {
            AlertLevel::Exceeded => ("🚨 *BUDGET EXCEEDED!*", "⚠️ You've exceeded your budget!"),
            AlertLevel::Warning => ("⚠️ *BUDGET ALERT!*", "🎯 Approaching your limit!"),
        };
        let usage = &self.usage;
        format!(
            "{heading}\n\n🏷️ {}\n💰 Budget: ₹{}\n💸 Spent: ₹{} ({:.1}%)\n📅 Period: {}\n\n{footer}",
            usage.budget.category,
            format_currency(usage.budget.amount),
            format_currency(usage.spent),
            usage.percentage,
            usage.budget.period,
        )
    }
}

/// Budget operations for one store and calendar
#[derive(Clone)]
pub struct BudgetEvaluator {
    db: Database,
    calendar: LocalCalendar,
}

impl BudgetEvaluator {
    pub fn new(db: Database, calendar: LocalCalendar) -> Self {
        Self { db, calendar }
    }

    /// Create a budget for the current window, or update the one already there
    ///
    /// Validation failures come back as `Error::InvalidData` carrying the
    /// user-facing reason.
    pub fn set_budget(
        &self,
        user_id: i64,
        category: &str,
        amount: f64,
        period: &str,
        now: DateTime<Utc>,
    ) -> Result<SetBudgetOutcome> {
        let category = category.trim();
        if category.is_empty() {
            return Err(Error::InvalidData("Category is required".into()));
        }
        if !amount.is_finite() || amount <= 0.0 {
            return Err(Error::InvalidData("Amount must be greater than 0".into()));
        }
        let period: BudgetPeriod = period.parse().map_err(Error::InvalidData)?;

        let window = period_window(period, now, &self.calendar);

        let (budget, created) = self.db.upsert_budget(&NewBudget {
            user_id,
            category: category.to_string(),
            amount,
            period,
            start_date: window.start,
            end_date: window.end,
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
            created_at: now,
        })?;

        if created {
            info!(budget_id = budget.id, category, amount, %period, "Budget created");
            Ok(SetBudgetOutcome::Created(budget))
        } else {
            info!(budget_id = budget.id, category, amount, "Budget updated");
            Ok(SetBudgetOutcome::Updated(budget))
        }
    }

    /// Move lapsed budgets onto the window containing `now`
    ///
    /// A lapsed budget whose next window is already taken by another active
    /// budget for the same category and period is deactivated instead.
    /// Returns how many budgets changed.
    pub fn roll_forward(&self, user_id: i64, now: DateTime<Utc>) -> Result<usize> {
        let mut changed = 0;
        for budget in self.db.list_active_budgets(user_id)? {
            if budget.end_date >= now {
                continue;
            }
            let window = period_window(budget.period, now, &self.calendar);
            if !self
                .db
                .move_budget_window(&budget, window.start, window.end, now)?
            {
                info!(budget_id = budget.id, "Lapsed budget retired, window already taken");
            }
            changed += 1;
        }
        if changed > 0 {
            info!(user_id, changed, "Rolled lapsed budgets forward");
        }
        Ok(changed)
    }

    /// Spend to date against `budget` within its window
    pub fn usage(&self, budget: &Budget) -> Result<BudgetUsage> {
        let filter = ExpenseFilter::new()
            .user(budget.user_id)
            .category_contains(Some(&budget.category))
            .created_between(budget.start_date, budget.end_date);
        let spent = self.db.sum_expenses(&filter)?;
        let expense_count = self.db.count_expenses(&filter)?;
        let percentage = if budget.amount > 0.0 {
            spent / budget.amount * 100.0
        } else {
            0.0
        };

        Ok(BudgetUsage {
            budget: budget.clone(),
            spent,
            remaining: budget.amount - spent,
            percentage,
            expense_count,
        })
    }

    /// Alerts raised by `expense`, in budget order
    pub fn check_alerts(
        &self,
        user_id: i64,
        expense: &Expense,
        now: DateTime<Utc>,
    ) -> Result<Vec<BudgetAlert>> {
        self.roll_forward(user_id, now)?;

        let mut alerts = Vec::new();
        for budget in self.db.current_budgets(user_id, None, now)? {
            if !categories_overlap(&expense.category, &budget.category) {
                continue;
            }
            if let Some(alert) = BudgetAlert::from_usage(self.usage(&budget)?) {
                alerts.push(alert);
            }
        }
        Ok(alerts)
    }

    /// Formatted usage report, optionally for one category
    pub fn status(&self, user_id: i64, category: Option<&str>, now: DateTime<Utc>) -> Result<String> {
        self.roll_forward(user_id, now)?;
        let budgets = self.db.current_budgets(user_id, category, now)?;

        if budgets.is_empty() {
            return Ok(match category {
                Some(category) => format!(
                    "📊 *No budget set for {category}*\n\nSet one with: 'Set budget for {category} as 5000 this month'"
                ),
                None => format!("📊 *No budgets set yet*\n\nCreate your first budget:\n{BUDGET_EXAMPLES}"),
            });
        }

        let mut response = match category {
            Some(category) => format!("📊 *Budget Status - {category}*\n\n"),
            None => "📊 *All Budget Status*\n\n".to_string(),
        };
        for budget in &budgets {
            response.push_str(&self.usage(budget)?.format_status());
        }
        Ok(response.trim_end().to_string())
    }

    /// Formatted list of active budgets
    pub fn list(&self, user_id: i64, now: DateTime<Utc>) -> Result<String> {
        self.roll_forward(user_id, now)?;
        let budgets = self.db.list_active_budgets(user_id)?;

        if budgets.is_empty() {
            return Ok(format!(
                "📊 *No budgets set*\n\nCreate your first budget:\n{BUDGET_EXAMPLES}"
            ));
        }

        let mut response = "📊 *Your Budgets*\n\n".to_string();
        for budget in &budgets {
            response.push_str(&format!(
                "🏷️ *{}*\n💰 ₹{} {}\n🔔 Alert at {:.0}%\n\n",
                budget.category,
                format_currency(budget.amount),
                budget.period,
                budget.alert_threshold * 100.0,
            ));
        }
        response.push_str("Type 'budget status' to see current usage!");
        Ok(response)
    }

    /// Parse a natural-language budget instruction and apply it
    ///
    /// Always produces a reply; failures become explanatory messages.
    pub async fn handle_command(
        &self,
        ai: &AIClient,
        command: &str,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> String {
        if command.trim().is_empty() {
            return budget_help();
        }

        let parsed = match ai.parse_budget_command(command).await {
            Ok(BudgetCommandParse::Valid(parsed)) => parsed,
            Ok(BudgetCommandParse::Invalid(reason)) => {
                return format!("❌ *Invalid budget command*\n\n{reason}\n\n{BUDGET_EXAMPLES}");
            }
            Err(e) => {
                warn!(error = %e, "Budget command parsing failed");
                return format!(
                    "❌ *Budget setup failed*\n\nSorry, I couldn't process your budget command. Please try again.\n\n{BUDGET_EXAMPLES}"
                );
            }
        };

        match self.set_budget(user_id, &parsed.category, parsed.amount, &parsed.period, now) {
            Ok(outcome) => outcome.message(),
            Err(Error::InvalidData(reason)) => format!("❌ *Invalid budget*\n\n{reason}"),
            Err(e) => {
                warn!(error = %e, "Budget setting failed");
                "❌ Failed to set budget. Please try again.".to_string()
            }
        }
    }
}

/// Case-insensitive substring match in either direction
fn categories_overlap(expense_category: &str, budget_category: &str) -> bool {
    let expense_category = expense_category.trim().to_lowercase();
    let budget_category = budget_category.trim().to_lowercase();
    if expense_category.is_empty() || budget_category.is_empty() {
        return false;
    }
    expense_category.contains(&budget_category) || budget_category.contains(&expense_category)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{BudgetCommand, MockBackend};
    use crate::models::{ExpenseSource, NewExpense};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    fn setup() -> (Database, BudgetEvaluator, i64) {
        let db = Database::in_memory().unwrap();
        let (user, _) = db.get_or_create_user("+919800000001", now()).unwrap();
        let evaluator = BudgetEvaluator::new(db.clone(), LocalCalendar::utc());
        (db, evaluator, user.id)
    }

    fn record(db: &Database, user_id: i64, amount: f64, category: &str, at: DateTime<Utc>) -> Expense {
        db.insert_expense(&NewExpense {
            user_id,
            amount,
            category: category.to_string(),
            description: None,
            source: ExpenseSource::Whatsapp,
            raw_text: None,
            image_url: None,
            structured_data: None,
            created_at: at,
        })
        .unwrap()
    }

    #[test]
    fn test_period_windows() {
        let cal = LocalCalendar::utc();
        let monthly = period_window(BudgetPeriod::Monthly, now(), &cal);
        assert_eq!(monthly.start, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(
            monthly.end,
            Utc.with_ymd_and_hms(2024, 3, 31, 23, 59, 59).unwrap() + Duration::milliseconds(999)
        );

        let weekly = period_window(BudgetPeriod::Weekly, now(), &cal);
        assert_eq!(weekly.start, Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap());
        assert_eq!(weekly.end.date_naive().to_string(), "2024-03-16");

        let daily = period_window(BudgetPeriod::Daily, now(), &cal);
        assert_eq!(daily.start, Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap());
        assert!(daily.end < Utc.with_ymd_and_hms(2024, 3, 16, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_set_budget_creates_then_updates() {
        let (db, evaluator, user_id) = setup();

        let outcome = evaluator
            .set_budget(user_id, "Food & Dining", 5000.0, "monthly", now())
            .unwrap();
        assert!(matches!(outcome, SetBudgetOutcome::Created(_)));
        assert_eq!(outcome.budget().alert_threshold, DEFAULT_ALERT_THRESHOLD);
        assert!(outcome.message().contains("Budget Set!"));

        let outcome = evaluator
            .set_budget(user_id, "Food & Dining", 6000.0, "MONTHLY", now() + Duration::days(3))
            .unwrap();
        assert!(matches!(outcome, SetBudgetOutcome::Updated(_)));
        assert!(outcome.message().contains("Budget Updated!"));
        assert!(outcome.message().contains("₹6,000"));

        let budgets = db.list_active_budgets(user_id).unwrap();
        assert_eq!(budgets.len(), 1);
        assert_eq!(budgets[0].amount, 6000.0);
    }

    #[test]
    fn test_concurrent_set_budget_keeps_one_active_budget() {
        use std::sync::{Arc, Barrier};

        let (db, evaluator, user_id) = setup();

        // Duplicate webhook deliveries land on separate pooled connections
        for round in 0..20 {
            let barrier = Arc::new(Barrier::new(8));
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let evaluator = evaluator.clone();
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        evaluator.set_budget(
                            user_id,
                            "Food & Dining",
                            5000.0 + i as f64,
                            "monthly",
                            now(),
                        )
                    })
                })
                .collect();

            let created = handles
                .into_iter()
                .map(|h| h.join().unwrap().unwrap())
                .filter(|outcome| matches!(outcome, SetBudgetOutcome::Created(_)))
                .count();
            assert_eq!(created, usize::from(round == 0));
            assert_eq!(db.list_active_budgets(user_id).unwrap().len(), 1);
        }
    }

    #[test]
    fn test_set_budget_validation() {
        let (_, evaluator, user_id) = setup();
        let err = |category: &str, amount: f64, period: &str| {
            match evaluator.set_budget(user_id, category, amount, period, now()) {
                Err(Error::InvalidData(reason)) => reason,
                other => panic!("expected invalid data, got {:?}", other),
            }
        };
        assert_eq!(err(" ", 100.0, "monthly"), "Category is required");
        assert_eq!(err("Food", 0.0, "monthly"), "Amount must be greater than 0");
        assert_eq!(err("Food", -5.0, "monthly"), "Amount must be greater than 0");
        assert_eq!(
            err("Food", 100.0, "yearly"),
            "Invalid period. Use monthly, weekly, or daily"
        );
    }

    #[test]
    fn test_alert_thresholds() {
        let (db, evaluator, user_id) = setup();
        evaluator
            .set_budget(user_id, "Food & Dining", 5000.0, "monthly", now())
            .unwrap();

        let first = record(&db, user_id, 2000.0, "Food & Dining", now());
        assert!(evaluator.check_alerts(user_id, &first, now()).unwrap().is_empty());

        let second = record(&db, user_id, 2000.0, "Food & Dining", now());
        let alerts = evaluator.check_alerts(user_id, &second, now()).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, AlertLevel::Warning);
        assert!(alerts[0].message().starts_with("⚠️ *BUDGET ALERT!*"));

        let third = record(&db, user_id, 2000.0, "Food & Dining", now());
        let alerts = evaluator.check_alerts(user_id, &third, now()).unwrap();
        assert_eq!(alerts[0].level, AlertLevel::Exceeded);
        assert!(alerts[0].message().contains("(120.0%)"));
    }

    #[test]
    fn test_budget_category_is_substring_of_expense_category() {
        let (db, evaluator, user_id) = setup();
        evaluator.set_budget(user_id, "food", 100.0, "daily", now()).unwrap();

        let expense = record(&db, user_id, 90.0, "Food & Dining", now());
        let alerts = evaluator.check_alerts(user_id, &expense, now()).unwrap();
        assert_eq!(alerts.len(), 1);

        // Unrelated category raises nothing
        let other = record(&db, user_id, 500.0, "Shopping", now());
        assert!(evaluator.check_alerts(user_id, &other, now()).unwrap().is_empty());
    }

    #[test]
    fn test_expenses_outside_window_do_not_count() {
        let (db, evaluator, user_id) = setup();
        evaluator
            .set_budget(user_id, "Shopping", 1000.0, "monthly", now())
            .unwrap();
        record(&db, user_id, 5000.0, "Shopping", now() - Duration::days(30));
        let expense = record(&db, user_id, 100.0, "Shopping", now());
        assert!(evaluator.check_alerts(user_id, &expense, now()).unwrap().is_empty());
    }

    #[test]
    fn test_roll_forward_moves_lapsed_budget() {
        let (db, evaluator, user_id) = setup();
        evaluator
            .set_budget(user_id, "Groceries", 3000.0, "monthly", now())
            .unwrap();

        let next_month = Utc.with_ymd_and_hms(2024, 4, 2, 9, 0, 0).unwrap();
        assert_eq!(evaluator.roll_forward(user_id, next_month).unwrap(), 1);

        let budgets = db.current_budgets(user_id, None, next_month).unwrap();
        assert_eq!(budgets.len(), 1);
        assert_eq!(
            budgets[0].start_date,
            Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(evaluator.roll_forward(user_id, next_month).unwrap(), 0);
    }

    #[test]
    fn test_roll_forward_deactivates_when_window_taken() {
        let (db, evaluator, user_id) = setup();
        evaluator
            .set_budget(user_id, "Groceries", 3000.0, "monthly", now())
            .unwrap();
        let next_month = Utc.with_ymd_and_hms(2024, 4, 2, 9, 0, 0).unwrap();
        // Insert the April budget directly so the March one is still lapsed
        let window = period_window(BudgetPeriod::Monthly, next_month, &LocalCalendar::utc());
        db.insert_budget(&NewBudget {
            user_id,
            category: "Groceries".into(),
            amount: 4000.0,
            period: BudgetPeriod::Monthly,
            start_date: window.start,
            end_date: window.end,
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
            created_at: next_month,
        })
        .unwrap();

        evaluator.roll_forward(user_id, next_month).unwrap();
        let active = db.list_active_budgets(user_id).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].amount, 4000.0);
    }

    #[test]
    fn test_status_and_list() {
        let (db, evaluator, user_id) = setup();
        assert!(evaluator
            .status(user_id, None, now())
            .unwrap()
            .starts_with("📊 *No budgets set yet*"));
        assert!(evaluator
            .status(user_id, Some("Food"), now())
            .unwrap()
            .contains("No budget set for Food"));

        evaluator
            .set_budget(user_id, "Food & Dining", 1000.0, "weekly", now())
            .unwrap();
        evaluator
            .set_budget(user_id, "Shopping", 1000.0, "monthly", now())
            .unwrap();
        record(&db, user_id, 850.0, "Food & Dining", now());

        let status = evaluator.status(user_id, None, now()).unwrap();
        assert!(status.starts_with("📊 *All Budget Status*"));
        assert!(status.contains("🟡 *Food & Dining*"));
        assert!(status.contains("🟢 *Shopping*"));
        assert!(status.contains("💵 Remaining: ₹150"));

        let list = evaluator.list(user_id, now()).unwrap();
        assert!(list.contains("💰 ₹1,000 weekly"));
        assert!(list.contains("🔔 Alert at 80%"));
    }

    #[tokio::test]
    async fn test_handle_command() {
        let (_, evaluator, user_id) = setup();
        let ai = AIClient::Mock(MockBackend::new().with_budget_command(BudgetCommandParse::Valid(
            BudgetCommand {
                category: "Transportation".into(),
                amount: 3000.0,
                period: "monthly".into(),
            },
        )));
        let reply = evaluator
            .handle_command(&ai, "set travel budget 3000 monthly", user_id, now())
            .await;
        assert!(reply.contains("Budget Set!"));
        assert!(reply.contains("Transportation"));

        let ai = AIClient::Mock(
            MockBackend::new()
                .with_budget_command(BudgetCommandParse::Invalid("Invalid amount".into())),
        );
        let reply = evaluator
            .handle_command(&ai, "set budget for food", user_id, now())
            .await;
        assert!(reply.starts_with("❌ *Invalid budget command*\n\nInvalid amount"));

        let ai = AIClient::Mock(MockBackend::new().with_budget_command(BudgetCommandParse::Valid(
            BudgetCommand {
                category: "Food".into(),
                amount: 100.0,
                period: "yearly".into(),
            },
        )));
        let reply = evaluator
            .handle_command(&ai, "set budget for food 100 yearly", user_id, now())
            .await;
        assert!(reply.contains("Invalid period"));
    }
}
