//! Spendly Web Server
//!
//! Axum HTTP surface for the Spendly WhatsApp expense assistant:
//! - Twilio webhook (inbound messages and delivery callbacks)
//! - Magic-link login for the web dashboard
//! - Dashboard API (expenses, monthly stats, export, manual upload)
//! - Background rate-limit sweep
//!
//! Security features:
//! - Dashboard API requires a valid magic-link token (secure by default,
//!   `--no-auth` accepts `?phone=` for local dev)
//! - Restrictive CORS policy
//! - Upload size limits
//! - Sanitized error responses

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Query, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use spendly_core::ai::{AIBackend, AIClient};
use spendly_core::channels::Channels;
use spendly_core::clock::LocalCalendar;
use spendly_core::config::Config;
use spendly_core::db::Database;
use spendly_core::models::User;
use spendly_core::router::{ConversationRouter, RouterSettings};

mod handlers;
mod scheduler;
pub mod tokens;

pub use scheduler::start_rate_limit_sweeper;
pub use tokens::{MagicLinks, TokenClaims};

/// Maximum file upload size (10 MB)
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Page size when the dashboard doesn't ask for one
pub const DEFAULT_PAGE_LIMIT: i64 = 100;

/// Authorization header for dashboard tokens
const AUTHORIZATION_HEADER: &str = "authorization";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether the dashboard API requires a token (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// Token for the GET webhook verification handshake
    pub verify_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
            verify_token: None,
        }
    }
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    pub router: ConversationRouter,
    pub channels: Channels,
    /// None when no JWT secret is configured; login endpoints then fail
    pub links: Option<Arc<MagicLinks>>,
    pub calendar: LocalCalendar,
}

impl AppState {
    /// Wire the conversation router and dashboard auth from one config
    pub fn new(
        db: Database,
        ai: AIClient,
        channels: Channels,
        config: &Config,
        server: ServerConfig,
    ) -> Self {
        let links = MagicLinks::from_settings(&config.dashboard).map(Arc::new);
        if links.is_none() {
            warn!("JWT_SECRET not set, dashboard login links are disabled");
        }

        let mut router = ConversationRouter::new(
            db.clone(),
            ai,
            channels.clone(),
            RouterSettings::from_config(config),
        );
        if let Some(links) = &links {
            router = router.with_link_issuer(links.clone());
        }

        Self {
            db,
            config: server,
            router,
            channels,
            links,
            calendar: config.calendar(),
        }
    }

    pub fn ai(&self) -> &AIClient {
        self.router.ai()
    }
}

/// The dashboard user resolved by `dashboard_auth`
#[derive(Debug, Clone)]
pub struct DashboardUser(pub User);

#[derive(Deserialize)]
struct PhoneQuery {
    phone: Option<String>,
}

/// Authentication middleware for the dashboard API
///
/// A `Bearer` magic-link token identifies the user. With auth disabled the
/// user may instead be named by a `phone` query parameter.
async fn dashboard_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&state, &request) {
        Ok(user) => {
            request.extensions_mut().insert(DashboardUser(user));
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

fn authenticate(state: &AppState, request: &Request) -> Result<User, AppError> {
    let bearer = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    let phone = match bearer {
        Some(token) => {
            let links = state
                .links
                .as_ref()
                .ok_or_else(|| AppError::unauthorized("Dashboard login is not configured"))?;
            let claims = links.verify(token).map_err(|e| {
                warn!(path = %request.uri().path(), error = %e, "Rejected dashboard token");
                AppError::unauthorized("Invalid or expired token")
            })?;
            claims.phone
        }
        None if !state.config.require_auth => Query::<PhoneQuery>::try_from_uri(request.uri())
            .ok()
            .and_then(|Query(q)| q.phone)
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::bad_request("Phone number required"))?,
        None => {
            warn!(path = %request.uri().path(), "Unauthorized request - no token");
            return Err(AppError::unauthorized("Authentication required"));
        }
    };

    state
        .db
        .get_user_by_phone(&phone)?
        .ok_or_else(|| AppError::not_found("User not found"))
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/expenses", get(handlers::list_expenses))
        .route("/stats", get(handlers::get_stats))
        .route("/export", get(handlers::export_expenses))
        .route(
            "/upload",
            post(handlers::upload_expense).layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE)),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            dashboard_auth,
        ));

    let auth_routes = Router::new()
        .route("/generate-magic-link", post(handlers::generate_magic_link))
        .route("/whatsapp-login", post(handlers::whatsapp_login))
        .route("/magic", get(handlers::magic_redirect))
        .route("/verify-token", post(handlers::verify_token));

    let webhook_routes = Router::new()
        .route(
            "/",
            post(handlers::receive_message).get(handlers::verify_webhook),
        )
        .route("/status", post(handlers::message_status));

    // Build CORS layer
    let cors = if state.config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        // Allow specified origins (the dashboard frontend)
        let origins: Vec<HeaderValue> = state
            .config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    Router::new()
        .nest("/api", api_routes)
        .nest("/auth", auth_routes)
        .nest("/webhook", webhook_routes)
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
}

/// Start the server
pub async fn serve(
    state: AppState,
    host: &str,
    port: u16,
    sweep_interval: std::time::Duration,
) -> anyhow::Result<()> {
    if !state.config.require_auth {
        warn!("⚠️  Dashboard authentication disabled - do not expose to network!");
    }

    check_ai_connection(state.ai()).await;
    info!(
        messenger = state.channels.messenger.name(),
        images = state.channels.images.name(),
        "Channels ready"
    );

    let state = Arc::new(state);
    start_rate_limit_sweeper(state.router.rate_limiter(), sweep_interval);

    let app = create_router(state);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Check and log AI backend connection status
async fn check_ai_connection(ai: &AIClient) {
    if ai.health_check().await {
        info!(
            "✅ AI backend connected: {} (model: {})",
            ai.host(),
            ai.model()
        );
    } else {
        warn!(
            "⚠️  AI backend configured but not responding: {} (model: {})",
            ai.host(),
            ai.model()
        );
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn unauthorized(msg: &str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn internal(msg: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.to_string(),
            internal: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}

#[cfg(test)]
mod tests;
