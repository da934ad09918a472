//! Dashboard expense handlers

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use spendly_core::clock::LocalCalendar;
use spendly_core::db::ExpenseFilter;
use spendly_core::models::Expense;

use crate::{AppError, AppState, DashboardUser, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};

#[derive(Debug, Deserialize)]
pub struct ListExpensesQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /api/expenses - Latest expenses first
pub async fn list_expenses(
    State(state): State<Arc<AppState>>,
    Extension(DashboardUser(user)): Extension<DashboardUser>,
    Query(params): Query<ListExpensesQuery>,
) -> Result<Json<Vec<Expense>>, AppError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let filter = ExpenseFilter::new()
        .user(user.id)
        .limit(limit)
        .offset(offset);
    Ok(Json(state.db.list_expenses(&filter)?))
}

#[derive(Debug, Serialize, PartialEq)]
pub struct DailySpending {
    pub date: String,
    pub amount: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_amount: f64,
    pub total_expenses: i64,
    pub categories: BTreeMap<String, f64>,
    /// Ascending by date
    pub daily_spending: Vec<DailySpending>,
}

/// GET /api/stats - Current month totals for the dashboard charts
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Extension(DashboardUser(user)): Extension<DashboardUser>,
) -> Result<Json<StatsResponse>, AppError> {
    let calendar = state.calendar;
    let today = calendar.today(Utc::now());
    let start = calendar.start_of_day(LocalCalendar::month_start(today));
    let end = calendar.end_of_day(LocalCalendar::month_end(today));

    let stats = state.db.expense_stats(user.id, start, end)?;

    Ok(Json(StatsResponse {
        total_amount: stats.total_amount,
        total_expenses: stats.total_expenses,
        categories: stats.categories,
        daily_spending: stats
            .daily_spending
            .into_iter()
            .map(|(date, amount)| DailySpending { date, amount })
            .collect(),
    }))
}
