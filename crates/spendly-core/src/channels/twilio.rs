//! Twilio WhatsApp adapter
//!
//! Outbound messages go through the REST Messages API; inbound media URLs are
//! fetched with the same account credentials (Twilio serves them behind
//! basic auth when media protection is on).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{MediaFetcher, Messenger};
use crate::config::TwilioSettings;
use crate::error::{Error, Result};

const DEFAULT_API_BASE: &str = "https://api.twilio.com";

/// Account SID and auth token
#[derive(Debug, Clone)]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: String,
}

/// Sends WhatsApp messages via Twilio
#[derive(Clone)]
pub struct TwilioMessenger {
    http_client: Client,
    api_base: String,
    credentials: TwilioCredentials,
    from_number: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: Option<String>,
}

impl TwilioMessenger {
    pub fn new(credentials: TwilioCredentials, from_number: &str, timeout: Duration) -> Self {
        Self {
            http_client: build_client(timeout),
            api_base: DEFAULT_API_BASE.to_string(),
            credentials,
            from_number: from_number.to_string(),
        }
    }

    /// All three settings must be present
    pub fn from_settings(settings: &TwilioSettings, timeout: Duration) -> Option<Self> {
        let credentials = TwilioCredentials {
            account_sid: settings.account_sid.clone()?,
            auth_token: settings.auth_token.clone()?,
        };
        let from = settings.from_number.as_deref()?;
        Some(Self::new(credentials, from, timeout))
    }

    /// Point at a different API host (tests)
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    pub fn credentials(&self) -> TwilioCredentials {
        self.credentials.clone()
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.credentials.account_sid
        )
    }
}

#[async_trait]
impl Messenger for TwilioMessenger {
    async fn send(&self, to: &str, body: &str) -> Result<()> {
        let from = whatsapp_address(&self.from_number);
        let to = whatsapp_address(to);
        let form = [("From", from.as_str()), ("To", to.as_str()), ("Body", body)];

        let response = self
            .http_client
            .post(self.messages_url())
            .basic_auth(
                &self.credentials.account_sid,
                Some(&self.credentials.auth_token),
            )
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response
                .json::<ErrorResponse>()
                .await
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_default();
            return Err(Error::Channel(format!(
                "Twilio send failed ({}): {}",
                status, detail
            )));
        }

        let sent: MessageResponse = response.json().await?;
        debug!(to = %to, sid = ?sent.sid, "WhatsApp message sent");
        Ok(())
    }

    fn name(&self) -> &str {
        "twilio"
    }
}

/// Downloads Twilio-hosted media
#[derive(Clone)]
pub struct TwilioMediaFetcher {
    http_client: Client,
    credentials: Option<TwilioCredentials>,
}

impl TwilioMediaFetcher {
    pub fn new(credentials: TwilioCredentials, timeout: Duration) -> Self {
        Self {
            http_client: build_client(timeout),
            credentials: Some(credentials),
        }
    }

    /// Plain GET without auth, for public media URLs
    pub fn anonymous(timeout: Duration) -> Self {
        Self {
            http_client: build_client(timeout),
            credentials: None,
        }
    }
}

#[async_trait]
impl MediaFetcher for TwilioMediaFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let mut request = self.http_client.get(url);
        if let Some(ref creds) = self.credentials {
            request = request.basic_auth(&creds.account_sid, Some(&creds.auth_token));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Error::Channel(format!(
                "Media download failed: {}",
                response.status()
            )));
        }

        let bytes = response.bytes().await?;
        debug!(url, size = bytes.len(), "Downloaded media");
        Ok(bytes.to_vec())
    }
}

fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// `whatsapp:+15550001111`, leaving an existing prefix alone
fn whatsapp_address(number: &str) -> String {
    if number.starts_with("whatsapp:") {
        number.to_string()
    } else {
        format!("whatsapp:{}", number)
    }
}
