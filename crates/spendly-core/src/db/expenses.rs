//! Expense operations

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::params;

use super::expense_filter::ExpenseFilter;
use super::{format_datetime, parse_datetime, Database};
use crate::error::Result;
use crate::models::{Expense, ExpenseStats, NewExpense};

const EXPENSE_COLUMNS: &str = "e.id, e.user_id, e.amount, e.category, e.description, e.source, \
     e.raw_text, e.image_url, e.structured_data, e.created_at";

impl Database {
    /// Insert an expense and return the stored row
    ///
    /// No deduplication: the same message sent twice records twice.
    pub fn insert_expense(&self, expense: &NewExpense) -> Result<Expense> {
        let conn = self.conn()?;

        let structured = expense
            .structured_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        conn.execute(
            r#"
            INSERT INTO expenses (user_id, amount, category, description, source, raw_text, image_url, structured_data, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                expense.user_id,
                expense.amount,
                expense.category,
                expense.description,
                expense.source.as_str(),
                expense.raw_text,
                expense.image_url,
                structured,
                format_datetime(expense.created_at),
            ],
        )?;

        let id = conn.last_insert_rowid();

        Ok(Expense {
            id,
            user_id: expense.user_id,
            amount: expense.amount,
            category: expense.category.clone(),
            description: expense.description.clone(),
            source: expense.source,
            raw_text: expense.raw_text.clone(),
            image_url: expense.image_url.clone(),
            structured_data: expense.structured_data.clone(),
            created_at: expense.created_at,
        })
    }

    /// List expenses matching a filter, newest first
    pub fn list_expenses(&self, filter: &ExpenseFilter) -> Result<Vec<Expense>> {
        let conn = self.conn()?;
        let built = filter.build();

        let sql = format!(
            "SELECT {} FROM expenses e {} ORDER BY e.created_at DESC, e.id DESC {}",
            EXPENSE_COLUMNS, built.where_clause, built.page_clause
        );

        let mut stmt = conn.prepare(&sql)?;
        let params_refs = built.params_refs();
        let expenses = stmt
            .query_map(params_refs.as_slice(), Self::row_to_expense)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(expenses)
    }

    /// Count expenses matching a filter (paging is ignored)
    pub fn count_expenses(&self, filter: &ExpenseFilter) -> Result<i64> {
        let conn = self.conn()?;
        let unpaged = ExpenseFilter {
            limit: None,
            offset: None,
            ..filter.clone()
        };
        let built = unpaged.build();

        let sql = format!("SELECT COUNT(*) FROM expenses e {}", built.where_clause);
        let mut stmt = conn.prepare(&sql)?;
        let params_refs = built.params_refs();
        let count: i64 = stmt.query_row(params_refs.as_slice(), |row| row.get(0))?;

        Ok(count)
    }

    /// Sum of amounts for expenses matching a filter (paging is ignored)
    pub fn sum_expenses(&self, filter: &ExpenseFilter) -> Result<f64> {
        let conn = self.conn()?;
        let unpaged = ExpenseFilter {
            limit: None,
            offset: None,
            ..filter.clone()
        };
        let built = unpaged.build();

        let sql = format!(
            "SELECT COALESCE(SUM(e.amount), 0) FROM expenses e {}",
            built.where_clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let params_refs = built.params_refs();
        let total: f64 = stmt.query_row(params_refs.as_slice(), |row| row.get(0))?;

        Ok(total)
    }

    /// Dashboard statistics for a user within `[start, end]`
    pub fn expense_stats(
        &self,
        user_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ExpenseStats> {
        let filter = ExpenseFilter::new().user(user_id).created_between(start, end);
        let expenses = self.list_expenses(&filter)?;

        let mut categories: BTreeMap<String, f64> = BTreeMap::new();
        let mut daily_spending: BTreeMap<String, f64> = BTreeMap::new();
        let mut total_amount = 0.0;

        for expense in &expenses {
            total_amount += expense.amount;
            *categories.entry(expense.category.clone()).or_default() += expense.amount;
            let day = expense.created_at.format("%Y-%m-%d").to_string();
            *daily_spending.entry(day).or_default() += expense.amount;
        }

        Ok(ExpenseStats {
            total_amount,
            total_expenses: expenses.len() as i64,
            categories,
            daily_spending,
        })
    }

    pub(crate) fn row_to_expense(row: &rusqlite::Row) -> rusqlite::Result<Expense> {
        let source_str: String = row.get(5)?;
        let structured_str: Option<String> = row.get(8)?;
        let created_at_str: String = row.get(9)?;
        Ok(Expense {
            id: row.get(0)?,
            user_id: row.get(1)?,
            amount: row.get(2)?,
            category: row.get(3)?,
            description: row.get(4)?,
            source: source_str.parse().unwrap_or_default(),
            raw_text: row.get(6)?,
            image_url: row.get(7)?,
            structured_data: structured_str.and_then(|s| serde_json::from_str(&s).ok()),
            created_at: parse_datetime(&created_at_str, 9)?,
        })
    }
}
