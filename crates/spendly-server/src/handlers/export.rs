//! Expense export handler

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, Response, StatusCode},
    Extension,
};
use serde::Deserialize;
use tracing::info;

use spendly_core::db::ExpenseFilter;
use spendly_core::models::Expense;

use crate::{AppError, AppState, DashboardUser};

/// Query parameters for expense export
#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    /// Output format (default: csv)
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_format() -> String {
    "csv".to_string()
}

/// GET /api/export - Every expense of the user as CSV or JSON
pub async fn export_expenses(
    State(state): State<Arc<AppState>>,
    Extension(DashboardUser(user)): Extension<DashboardUser>,
    Query(params): Query<ExportQuery>,
) -> Result<Response<Body>, AppError> {
    let expenses = state
        .db
        .list_expenses(&ExpenseFilter::new().user(user.id))?;

    info!(user_id = user.id, count = expenses.len(), format = %params.format, "Exporting expenses");

    let (content, content_type, extension) = match params.format.to_lowercase().as_str() {
        "json" => (
            serde_json::to_string_pretty(&expenses)?,
            "application/json",
            "json",
        ),
        "csv" => (expenses_to_csv(&expenses)?, "text/csv; charset=utf-8", "csv"),
        other => {
            return Err(AppError::bad_request(&format!(
                "Unsupported export format: {} (use csv or json)",
                other
            )))
        }
    };

    let filename = format!(
        "spendly_expenses_{}.{}",
        chrono::Utc::now().format("%Y%m%d"),
        extension
    );

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Body::from(content))?)
}

/// Oldest first, the way a spreadsheet reads
fn expenses_to_csv(expenses: &[Expense]) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "id",
        "date",
        "amount",
        "category",
        "description",
        "source",
        "image_url",
    ])?;

    for expense in expenses.iter().rev() {
        writer.write_record([
            expense.id.to_string(),
            expense.created_at.to_rfc3339(),
            format!("{:.2}", expense.amount),
            expense.category.clone(),
            expense.description.clone().unwrap_or_default(),
            expense.source.as_str().to_string(),
            expense.image_url.clone().unwrap_or_default(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV: {}", e.error()))?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use spendly_core::models::ExpenseSource;

    fn expense(id: i64, amount: f64, description: &str) -> Expense {
        Expense {
            id,
            user_id: 1,
            amount,
            category: "Food & Dining".to_string(),
            description: Some(description.to_string()),
            source: ExpenseSource::Whatsapp,
            raw_text: None,
            image_url: None,
            structured_data: None,
            created_at: Utc.with_ymd_and_hms(2024, 3, id as u32, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_csv_is_oldest_first_and_quoted() {
        let rows = vec![
            expense(2, 120.0, "lunch, with team"),
            expense(1, 50.5, "coffee"),
        ];
        let csv = expenses_to_csv(&rows).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(
            lines[0],
            "id,date,amount,category,description,source,image_url"
        );
        assert!(lines[1].starts_with("1,2024-03-01T12:00:00+00:00,50.50,Food & Dining,coffee,whatsapp,"));
        assert!(lines[2].contains("\"lunch, with team\""));
    }
}
