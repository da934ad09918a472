//! Per-user listings (expenses, budgets)

use anyhow::Result;
use chrono::Utc;
use spendly_core::budget::BudgetEvaluator;
use spendly_core::config::Config;
use spendly_core::db::{Database, ExpenseFilter};
use spendly_core::models::User;

use super::truncate;

fn find_user(db: &Database, phone: &str) -> Result<Option<User>> {
    let user = db.get_user_by_phone(phone)?;
    if user.is_none() {
        println!("No user found for {}", phone);
    }
    Ok(user)
}

pub fn cmd_expenses(db: &Database, phone: &str, limit: i64) -> Result<()> {
    let Some(user) = find_user(db, phone)? else {
        return Ok(());
    };

    let expenses = db.list_expenses(&ExpenseFilter::new().user(user.id).limit(limit.max(1)))?;
    if expenses.is_empty() {
        println!("No expenses recorded for {} yet.", phone);
        return Ok(());
    }

    println!();
    println!(
        "{:>6}  {:<16}  {:>10}  {:<16}  {:<8}  Description",
        "ID", "Date", "Amount", "Category", "Source"
    );
    println!("{}", "─".repeat(84));

    for expense in &expenses {
        println!(
            "{:>6}  {:<16}  {:>10.2}  {:<16}  {:<8}  {}",
            expense.id,
            expense.created_at.format("%Y-%m-%d %H:%M"),
            expense.amount,
            truncate(&expense.category, 16),
            expense.source.as_str(),
            truncate(expense.description.as_deref().unwrap_or(""), 30),
        );
    }

    let total: f64 = expenses.iter().map(|e| e.amount).sum();
    println!();
    println!("Showing {} expense(s), total ₹{:.2}", expenses.len(), total);

    Ok(())
}

pub fn cmd_budgets(db: &Database, config: &Config, phone: &str) -> Result<()> {
    let Some(user) = find_user(db, phone)? else {
        return Ok(());
    };

    let budgets = BudgetEvaluator::new(db.clone(), config.calendar());
    println!();
    println!("{}", budgets.status(user.id, None, Utc::now())?);

    Ok(())
}
