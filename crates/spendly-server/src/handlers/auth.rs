//! Magic-link login handlers

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use spendly_core::channels::LoginLinkIssuer;
use spendly_core::messages;
use spendly_core::models::User;

use crate::{AppError, AppState, MagicLinks};

#[derive(Debug, Deserialize)]
pub struct PhoneRequest {
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MagicQuery {
    pub token: Option<String>,
}

#[derive(Serialize)]
pub struct MagicLinkResponse {
    pub link: String,
    pub token: String,
}

#[derive(Serialize)]
pub struct WhatsappLoginResponse {
    pub success: bool,
}

fn magic_links(state: &AppState) -> Result<&MagicLinks, AppError> {
    state
        .links
        .as_deref()
        .ok_or_else(|| AppError::internal("Dashboard login is not configured"))
}

fn required_phone(request: PhoneRequest) -> Result<String, AppError> {
    request
        .phone
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::bad_request("Phone number required"))
}

/// Upsert the user and sign a fresh token for them
fn issue_for(state: &AppState, phone: &str) -> Result<(User, String, String), AppError> {
    let links = magic_links(state)?;
    let now = Utc::now();
    let (user, created) = state.db.get_or_create_user(phone, now)?;
    if created {
        info!(user_id = user.id, "Created user from dashboard login");
    }
    let token = links.issue_token(&user.phone_number, now)?;
    let link = links.dashboard_link(&token);
    Ok((user, token, link))
}

/// POST /auth/generate-magic-link - Issue a dashboard link for a phone number
pub async fn generate_magic_link(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PhoneRequest>,
) -> Result<Json<MagicLinkResponse>, AppError> {
    let phone = required_phone(request)?;
    let (_, token, link) = issue_for(&state, &phone)?;
    Ok(Json(MagicLinkResponse { link, token }))
}

/// POST /auth/whatsapp-login - Issue a dashboard link and deliver it over WhatsApp
pub async fn whatsapp_login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PhoneRequest>,
) -> Result<Json<WhatsappLoginResponse>, AppError> {
    let phone = required_phone(request)?;
    let (user, _, link) = issue_for(&state, &phone)?;
    let ttl = magic_links(&state)?.ttl_minutes();

    state
        .channels
        .messenger
        .send(&user.phone_number, &messages::login_link(&link, ttl))
        .await
        .map_err(|e| {
            warn!(user_id = user.id, error = %e, "Failed to deliver login link");
            AppError::internal("Failed to send login link")
        })?;

    Ok(Json(WhatsappLoginResponse { success: true }))
}

/// GET /auth/magic?token= - Bounce a valid link to the dashboard
pub async fn magic_redirect(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MagicQuery>,
) -> Response {
    let Some(token) = query.token.filter(|t| !t.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing token").into_response();
    };
    let Some(links) = state.links.as_deref() else {
        return (StatusCode::UNAUTHORIZED, "Invalid or expired token").into_response();
    };

    match links.verify(&token) {
        Ok(_) => Redirect::to(&links.dashboard_link(&token)).into_response(),
        Err(_) => (StatusCode::UNAUTHORIZED, "Invalid or expired token").into_response(),
    }
}

/// POST /auth/verify-token - Resolve a dashboard token to its user
pub async fn verify_token(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<User>, AppError> {
    let token = request
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::bad_request("Token required"))?;

    let claims = magic_links(&state)?
        .verify(&token)
        .map_err(|_| AppError::unauthorized("Invalid or expired token"))?;

    state
        .db
        .get_user_by_phone(&claims.phone)?
        .map(Json)
        .ok_or_else(|| AppError::not_found("User not found"))
}
