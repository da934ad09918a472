//! Magic-link tokens for the web dashboard
//!
//! HS256 JWTs carrying the user's phone number. A token is the only
//! credential the dashboard has, so its lifetime is short (15 minutes by
//! default).

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use spendly_core::channels::LoginLinkIssuer;
use spendly_core::config::DashboardSettings;

/// Claims inside a dashboard token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub phone: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies dashboard tokens
#[derive(Clone)]
pub struct MagicLinks {
    encoding: EncodingKey,
    decoding: DecodingKey,
    frontend_url: String,
    ttl: Duration,
}

impl MagicLinks {
    pub fn new(secret: &str, frontend_url: &str, ttl_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
            ttl: Duration::minutes(ttl_minutes.max(1)),
        }
    }

    /// None when no signing secret is configured
    pub fn from_settings(settings: &DashboardSettings) -> Option<Self> {
        settings
            .jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|secret| Self::new(secret, &settings.frontend_url, settings.link_ttl_minutes))
    }

    pub fn issue_token(
        &self,
        phone: &str,
        now: DateTime<Utc>,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = TokenClaims {
            phone: phone.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    /// Signature and expiry are both checked
    pub fn verify(&self, token: &str) -> Result<TokenClaims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<TokenClaims>(token, &self.decoding, &validation).map(|data| data.claims)
    }

    pub fn dashboard_link(&self, token: &str) -> String {
        format!("{}/dashboard?token={}", self.frontend_url, token)
    }
}

impl LoginLinkIssuer for MagicLinks {
    fn issue(&self, phone: &str) -> spendly_core::Result<String> {
        let token = self
            .issue_token(phone, Utc::now())
            .map_err(|e| spendly_core::Error::Config(format!("Failed to sign token: {}", e)))?;
        Ok(self.dashboard_link(&token))
    }

    fn ttl_minutes(&self) -> i64 {
        self.ttl.num_minutes()
    }
}
