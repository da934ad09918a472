//! Manual expense upload from the dashboard

use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    Extension, Json,
};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

use spendly_core::categorize::keyword_categorize;
use spendly_core::models::{Expense, ExpenseSource, NewExpense};

use crate::{AppError, AppState, DashboardUser, MAX_UPLOAD_SIZE};

#[derive(Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub expense: Expense,
}

struct UploadedImage {
    bytes: Vec<u8>,
    content_type: String,
}

/// POST /api/upload - Record an expense with its bill photo
///
/// Expects multipart form with:
/// - image: bill photo (required, max 10MB)
/// - amount: positive number (required)
/// - category: category name (optional, keyword-matched from description when empty)
/// - description: free text (optional)
pub async fn upload_expense(
    State(state): State<Arc<AppState>>,
    Extension(DashboardUser(user)): Extension<DashboardUser>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut image: Option<UploadedImage> = None;
    let mut amount: Option<String> = None;
    let mut category: Option<String> = None;
    let mut description: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(&format!("Failed to read form field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "image" => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| AppError::bad_request("Failed to read image data"))?;

                if bytes.len() > MAX_UPLOAD_SIZE {
                    return Err(AppError::bad_request(&format!(
                        "File too large. Maximum size is {} MB",
                        MAX_UPLOAD_SIZE / 1024 / 1024
                    )));
                }
                if !bytes.is_empty() {
                    image = Some(UploadedImage {
                        bytes: bytes.to_vec(),
                        content_type,
                    });
                }
            }
            "amount" | "category" | "description" => {
                let value = field
                    .text()
                    .await
                    .map_err(|_| AppError::bad_request(&format!("Failed to read {}", name)))?;
                let value = Some(value.trim().to_string()).filter(|v| !v.is_empty());
                match name.as_str() {
                    "amount" => amount = value,
                    "category" => category = value,
                    _ => description = value,
                }
            }
            _ => {}
        }
    }

    let image = image.ok_or_else(|| AppError::bad_request("No file uploaded"))?;
    let amount = amount
        .as_deref()
        .and_then(|a| a.parse::<f64>().ok())
        .filter(|a| a.is_finite() && *a > 0.0)
        .ok_or_else(|| AppError::bad_request("Amount must be a positive number"))?;
    let category = category.unwrap_or_else(|| {
        keyword_categorize(description.as_deref().unwrap_or(""), "")
            .category
            .as_str()
            .to_string()
    });

    let image_url = state
        .channels
        .images
        .upload(&image.bytes, &image.content_type)
        .await
        .map_err(|e| {
            error!(user_id = user.id, error = %e, "Failed to store uploaded image");
            AppError::internal("Failed to store image")
        })?;

    let expense = state.db.insert_expense(&NewExpense {
        user_id: user.id,
        amount,
        category,
        description,
        source: ExpenseSource::Manual,
        raw_text: None,
        image_url: Some(image_url),
        structured_data: None,
        created_at: Utc::now(),
    })?;

    info!(user_id = user.id, expense_id = expense.id, "Recorded manual expense");

    Ok(Json(UploadResponse {
        success: true,
        expense,
    }))
}
