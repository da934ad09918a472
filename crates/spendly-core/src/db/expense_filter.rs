//! Expense filter builder for constructing dynamic SQL queries
//!
//! Shared by listing, counting and summing so analytics, budgets and the
//! dashboard all select expenses the same way.

use chrono::{DateTime, Utc};

use super::format_datetime;

/// Builder for constructing expense query filters
#[derive(Default, Clone)]
pub struct ExpenseFilter<'query> {
    pub user_id: Option<i64>,
    /// Case-insensitive substring match on the expense category
    pub category_contains: Option<&'query str>,
    /// Inclusive on both ends
    pub created_between: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Result of building a filter - contains SQL components and parameters
pub struct FilterResult {
    /// WHERE clause including "WHERE" keyword (empty if no conditions)
    pub where_clause: String,
    /// LIMIT/OFFSET clause (empty if unpaged)
    pub page_clause: String,
    /// Parameters for the query (boxed for rusqlite compatibility)
    pub params: Vec<Box<dyn rusqlite::ToSql>>,
}

impl<'query> ExpenseFilter<'query> {
    /// Create a new filter builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one user's expenses
    pub fn user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Set category substring filter (ignored when blank)
    pub fn category_contains(mut self, category: Option<&'query str>) -> Self {
        self.category_contains = category.filter(|c| !c.trim().is_empty());
        self
    }

    /// Set creation time range filter
    pub fn created_between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.created_between = Some((start, end));
        self
    }

    /// Set page size
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set page offset
    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Build the filter components
    pub fn build(&self) -> FilterResult {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(uid) = self.user_id {
            conditions.push("e.user_id = ?".to_string());
            params.push(Box::new(uid));
        }

        // instr avoids treating % and _ in user input as wildcards
        if let Some(category) = self.category_contains {
            conditions.push("instr(LOWER(e.category), LOWER(?)) > 0".to_string());
            params.push(Box::new(category.trim().to_string()));
        }

        if let Some((start, end)) = self.created_between {
            conditions.push("e.created_at >= ? AND e.created_at <= ?".to_string());
            params.push(Box::new(format_datetime(start)));
            params.push(Box::new(format_datetime(end)));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let page_clause = match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => {
                params.push(Box::new(limit));
                params.push(Box::new(offset));
                "LIMIT ? OFFSET ?".to_string()
            }
            (Some(limit), None) => {
                params.push(Box::new(limit));
                "LIMIT ?".to_string()
            }
            // SQLite needs a LIMIT before OFFSET; -1 means unbounded
            (None, Some(offset)) => {
                params.push(Box::new(offset));
                "LIMIT -1 OFFSET ?".to_string()
            }
            (None, None) => String::new(),
        };

        FilterResult {
            where_clause,
            page_clause,
            params,
        }
    }
}

impl FilterResult {
    /// Get parameter references for query execution
    pub fn params_refs(&self) -> Vec<&dyn rusqlite::ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }
}
