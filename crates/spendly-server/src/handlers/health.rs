//! Liveness endpoints

use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;

use spendly_core::ai::AIBackend;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub ai: &'static str,
    pub model: String,
    pub timestamp: String,
}

/// GET /health - Always ok while the process serves requests
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let ai = state.ai();
    Json(HealthResponse {
        status: "ok",
        ai: ai.backend_name(),
        model: ai.model().to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}
