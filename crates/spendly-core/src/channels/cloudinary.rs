//! Cloudinary image store (signed uploads)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::ImageStore;
use crate::config::CloudinarySettings;
use crate::error::{Error, Result};

const DEFAULT_API_BASE: &str = "https://api.cloudinary.com";

#[derive(Clone)]
pub struct CloudinaryStore {
    http_client: Client,
    api_base: String,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    folder: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    error: Option<UploadError>,
}

#[derive(Debug, Deserialize)]
struct UploadError {
    message: String,
}

impl CloudinaryStore {
    pub fn from_settings(settings: &CloudinarySettings, timeout: Duration) -> Option<Self> {
        Some(Self {
            http_client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            api_base: DEFAULT_API_BASE.to_string(),
            cloud_name: settings.cloud_name.clone()?,
            api_key: settings.api_key.clone()?,
            api_secret: settings.api_secret.clone()?,
            folder: settings.folder.clone(),
        })
    }

    /// Point at a different API host (tests)
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn upload_url(&self) -> String {
        format!("{}/v1_1/{}/image/upload", self.api_base, self.cloud_name)
    }

    /// SHA-256 signature over the sorted, `&`-joined params plus the secret
    fn sign(&self, params: &[(&str, &str)]) -> String {
        let mut sorted: Vec<_> = params.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let to_sign = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha256::new();
        hasher.update(to_sign.as_bytes());
        hasher.update(self.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[async_trait]
impl ImageStore for CloudinaryStore {
    async fn upload(&self, bytes: &[u8], content_type: &str) -> Result<String> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = self.sign(&[
            ("folder", self.folder.as_str()),
            ("timestamp", timestamp.as_str()),
        ]);

        let file = Part::bytes(bytes.to_vec())
            .file_name("bill")
            .mime_str(content_type)?;
        let form = Form::new()
            .part("file", file)
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", self.folder.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let response = self
            .http_client
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body: UploadResponse = response.json().await?;
        if let Some(err) = body.error {
            return Err(Error::Channel(format!(
                "Cloudinary upload failed ({}): {}",
                status, err.message
            )));
        }

        let url = body
            .secure_url
            .ok_or_else(|| Error::Channel("Cloudinary response missing secure_url".into()))?;
        debug!(size = bytes.len(), "Image uploaded");
        info!(url = %url, "Stored bill image in Cloudinary");
        Ok(url)
    }

    fn name(&self) -> &str {
        "cloudinary"
    }
}
