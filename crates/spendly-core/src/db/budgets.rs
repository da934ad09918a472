//! Budget operations

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::{format_datetime, parse_datetime, Database};
use crate::error::Result;
use crate::models::{Budget, BudgetPeriod, NewBudget};

const BUDGET_COLUMNS: &str = "id, user_id, category, amount, period, start_date, end_date, \
     is_active, alert_threshold, created_at, updated_at";

impl Database {
    /// Find the active budget occupying one exact window
    ///
    /// Category comparison is exact here; substring matching only applies when
    /// relating budgets to expenses.
    pub fn find_active_budget(
        &self,
        user_id: i64,
        category: &str,
        period: BudgetPeriod,
        start_date: DateTime<Utc>,
    ) -> Result<Option<Budget>> {
        let conn = self.conn()?;
        Self::active_in_window(&conn, user_id, category, period, start_date)
    }

    fn active_in_window(
        conn: &Connection,
        user_id: i64,
        category: &str,
        period: BudgetPeriod,
        start_date: DateTime<Utc>,
    ) -> Result<Option<Budget>> {
        let budget = conn
            .query_row(
                &format!(
                    "SELECT {} FROM budgets
                     WHERE user_id = ? AND category = ? AND period = ? AND start_date = ? AND is_active = 1",
                    BUDGET_COLUMNS
                ),
                params![user_id, category, period.as_str(), format_datetime(start_date)],
                Self::row_to_budget,
            )
            .optional()?;

        Ok(budget)
    }

    /// Create the budget for its window, or set the amount on the one already there
    ///
    /// Runs as one immediate transaction so concurrent writers for the same
    /// window serialize. Returns the stored budget and whether it was created.
    pub fn upsert_budget(&self, budget: &NewBudget) -> Result<(Budget, bool)> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = Self::active_in_window(
            &tx,
            budget.user_id,
            &budget.category,
            budget.period,
            budget.start_date,
        )?;
        let (id, created) = match existing {
            Some(existing) => {
                tx.execute(
                    "UPDATE budgets SET amount = ?, updated_at = ? WHERE id = ?",
                    params![budget.amount, format_datetime(budget.created_at), existing.id],
                )?;
                (existing.id, false)
            }
            None => (Self::insert_row(&tx, budget)?, true),
        };

        let stored = tx.query_row(
            &format!("SELECT {} FROM budgets WHERE id = ?", BUDGET_COLUMNS),
            params![id],
            Self::row_to_budget,
        )?;
        tx.commit()?;

        Ok((stored, created))
    }

    /// Insert a budget and return its id
    ///
    /// Fails if an active budget already occupies the same window.
    pub fn insert_budget(&self, budget: &NewBudget) -> Result<i64> {
        let conn = self.conn()?;
        Self::insert_row(&conn, budget)
    }

    fn insert_row(conn: &Connection, budget: &NewBudget) -> Result<i64> {
        conn.execute(
            r#"
            INSERT INTO budgets (user_id, category, amount, period, start_date, end_date, is_active, alert_threshold, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?, ?)
            "#,
            params![
                budget.user_id,
                budget.category,
                budget.amount,
                budget.period.as_str(),
                format_datetime(budget.start_date),
                format_datetime(budget.end_date),
                budget.alert_threshold,
                format_datetime(budget.created_at),
                format_datetime(budget.created_at),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Get a budget by id
    pub fn get_budget(&self, id: i64) -> Result<Option<Budget>> {
        let conn = self.conn()?;

        let budget = conn
            .query_row(
                &format!("SELECT {} FROM budgets WHERE id = ?", BUDGET_COLUMNS),
                params![id],
                Self::row_to_budget,
            )
            .optional()?;

        Ok(budget)
    }

    /// Change the ceiling of an existing budget
    pub fn update_budget_amount(&self, id: i64, amount: f64, now: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE budgets SET amount = ?, updated_at = ? WHERE id = ?",
            params![amount, format_datetime(now), id],
        )?;
        Ok(())
    }

    /// Move a budget to a new window, or retire it if that window is taken
    ///
    /// Returns true when the budget moved, false when another active budget
    /// for the same category and period already held the window and this one
    /// was deactivated instead.
    pub fn move_budget_window(
        &self,
        budget: &Budget,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let occupied =
            Self::active_in_window(&tx, budget.user_id, &budget.category, budget.period, start_date)?
                .is_some_and(|other| other.id != budget.id);

        if occupied {
            tx.execute(
                "UPDATE budgets SET is_active = 0, updated_at = ? WHERE id = ?",
                params![format_datetime(now), budget.id],
            )?;
        } else {
            tx.execute(
                "UPDATE budgets SET start_date = ?, end_date = ?, updated_at = ? WHERE id = ?",
                params![
                    format_datetime(start_date),
                    format_datetime(end_date),
                    format_datetime(now),
                    budget.id
                ],
            )?;
        }
        tx.commit()?;

        Ok(!occupied)
    }

    /// Mark a budget inactive
    pub fn deactivate_budget(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE budgets SET is_active = 0, updated_at = ? WHERE id = ?",
            params![format_datetime(now), id],
        )?;
        Ok(())
    }

    /// All active budgets for a user, oldest first
    pub fn list_active_budgets(&self, user_id: i64) -> Result<Vec<Budget>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM budgets WHERE user_id = ? AND is_active = 1 ORDER BY created_at, id",
            BUDGET_COLUMNS
        ))?;

        let budgets = stmt
            .query_map(params![user_id], Self::row_to_budget)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(budgets)
    }

    /// Active budgets whose window contains `at`
    ///
    /// With `category`, keeps budgets whose category contains it
    /// (case-insensitive), which is how a new expense finds its envelopes.
    pub fn current_budgets(
        &self,
        user_id: i64,
        category: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Vec<Budget>> {
        let conn = self.conn()?;
        let at = format_datetime(at);

        let mut sql = format!(
            "SELECT {} FROM budgets WHERE user_id = ? AND is_active = 1 AND start_date <= ? AND end_date >= ?",
            BUDGET_COLUMNS
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(user_id), Box::new(at.clone()), Box::new(at)];

        if let Some(category) = category.filter(|c| !c.trim().is_empty()) {
            sql.push_str(" AND instr(LOWER(category), LOWER(?)) > 0");
            params.push(Box::new(category.trim().to_string()));
        }
        sql.push_str(" ORDER BY created_at, id");

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let budgets = stmt
            .query_map(params_refs.as_slice(), Self::row_to_budget)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(budgets)
    }

    fn row_to_budget(row: &rusqlite::Row) -> rusqlite::Result<Budget> {
        let period_str: String = row.get(4)?;
        let start: String = row.get(5)?;
        let end: String = row.get(6)?;
        let created: String = row.get(9)?;
        let updated: String = row.get(10)?;
        Ok(Budget {
            id: row.get(0)?,
            user_id: row.get(1)?,
            category: row.get(2)?,
            amount: row.get(3)?,
            period: period_str.parse().unwrap_or(BudgetPeriod::Monthly),
            start_date: parse_datetime(&start, 5)?,
            end_date: parse_datetime(&end, 6)?,
            is_active: row.get(7)?,
            alert_threshold: row.get(8)?,
            created_at: parse_datetime(&created, 9)?,
            updated_at: parse_datetime(&updated, 10)?,
        })
    }
}
