//! Twilio webhook handlers

use std::sync::Arc;

use axum::{
    extract::{rejection::FormRejection, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Form,
};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use spendly_core::router::{HandleOutcome, InboundMessage};

use crate::AppState;

/// Replies go out through the messenger, so the TwiML body stays empty
const EMPTY_TWIML: &str = "<Response></Response>";

fn twiml(status: StatusCode) -> Response {
    (status, [(header::CONTENT_TYPE, "text/xml")], EMPTY_TWIML).into_response()
}

/// POST /webhook - Handle one inbound message or status callback
///
/// A body that is not a readable form is acknowledged and dropped; retrying
/// it would not make it parse.
pub async fn receive_message(
    State(state): State<Arc<AppState>>,
    form: Result<Form<InboundMessage>, FormRejection>,
) -> Response {
    let message = match form {
        Ok(Form(message)) => message,
        Err(rejection) => {
            warn!(status = %rejection.status(), error = %rejection.body_text(), "Unreadable webhook body");
            return twiml(StatusCode::OK);
        }
    };

    match state.router.handle(&message).await {
        Ok(HandleOutcome::Ignored(reason)) => {
            debug!(?reason, "Webhook event ignored");
            twiml(StatusCode::OK)
        }
        Ok(outcome) => {
            debug!(replies = outcome.replies().len(), "Webhook event handled");
            twiml(StatusCode::OK)
        }
        Err(e) => {
            error!(error = %e, "Failed to handle webhook event");
            twiml(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Delivery receipt fields Twilio posts to the status callback
#[derive(Debug, Default, Deserialize)]
pub struct StatusCallback {
    #[serde(rename = "MessageSid")]
    pub message_sid: Option<String>,
    #[serde(rename = "SmsSid")]
    pub sms_sid: Option<String>,
    #[serde(rename = "MessageStatus")]
    pub message_status: Option<String>,
    #[serde(rename = "SmsStatus")]
    pub sms_status: Option<String>,
    #[serde(rename = "To")]
    pub to: Option<String>,
    #[serde(rename = "From")]
    pub from: Option<String>,
}

/// POST /webhook/status - Log and acknowledge a delivery callback
pub async fn message_status(Form(callback): Form<StatusCallback>) -> StatusCode {
    info!(
        sid = callback.message_sid.or(callback.sms_sid).as_deref().unwrap_or("-"),
        status = callback
            .message_status
            .or(callback.sms_status)
            .as_deref()
            .unwrap_or("-"),
        to = callback.to.as_deref().unwrap_or("-"),
        from = callback.from.as_deref().unwrap_or("-"),
        "Message status update"
    );
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// GET /webhook - Subscription handshake; echoes the challenge when the token matches
pub async fn verify_webhook(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    let expected = state.config.verify_token.as_deref();
    let subscribed = query.mode.as_deref() == Some("subscribe")
        && expected.is_some()
        && query.token.as_deref() == expected;

    if subscribed {
        info!("Webhook verified");
        (StatusCode::OK, query.challenge.unwrap_or_default()).into_response()
    } else {
        warn!("Webhook verification rejected");
        StatusCode::FORBIDDEN.into_response()
    }
}
