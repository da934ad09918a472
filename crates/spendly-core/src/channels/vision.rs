//! Google Cloud Vision OCR (`images:annotate`, TEXT_DETECTION)
//!
//! Remote URLs are passed by reference; local paths (from the filesystem
//! image store) are read and sent inline as base64.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::TextRecognizer;
use crate::config::VisionSettings;
use crate::error::{Error, Result};

const DEFAULT_API_BASE: &str = "https://vision.googleapis.com";

#[derive(Clone)]
pub struct GoogleVision {
    http_client: Client,
    api_base: String,
    api_key: String,
}

#[derive(Serialize)]
struct AnnotateRequest {
    requests: Vec<ImageRequest>,
}

#[derive(Serialize)]
struct ImageRequest {
    image: ImageSpec,
    features: Vec<Feature>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<ImageSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageSource {
    image_uri: String,
}

#[derive(Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    #[serde(default)]
    text_annotations: Vec<TextAnnotation>,
    error: Option<ApiStatus>,
}

#[derive(Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct ApiStatus {
    #[serde(default)]
    message: String,
}

impl GoogleVision {
    pub fn new(api_key: &str, timeout: Duration) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn from_settings(settings: &VisionSettings, timeout: Duration) -> Option<Self> {
        settings
            .api_key
            .as_deref()
            .map(|key| Self::new(key, timeout))
    }

    /// Point at a different API host (tests)
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    async fn image_spec(image_url: &str) -> Result<ImageSpec> {
        if image_url.starts_with("http://") || image_url.starts_with("https://") {
            return Ok(ImageSpec {
                source: Some(ImageSource {
                    image_uri: image_url.to_string(),
                }),
                content: None,
            });
        }

        let path = image_url.strip_prefix("file://").unwrap_or(image_url);
        let bytes = tokio::fs::read(Path::new(path)).await?;
        Ok(ImageSpec {
            source: None,
            content: Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
        })
    }
}

#[async_trait]
impl TextRecognizer for GoogleVision {
    async fn extract_text(&self, image_url: &str) -> Result<String> {
        let request = AnnotateRequest {
            requests: vec![ImageRequest {
                image: Self::image_spec(image_url).await?,
                features: vec![Feature {
                    kind: "TEXT_DETECTION",
                }],
            }],
        };

        let response = self
            .http_client
            .post(format!("{}/v1/images:annotate", self.api_base))
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Channel(format!(
                "Vision API error {}: {}",
                status, body
            )));
        }

        let annotated: AnnotateResponse = response.json().await?;
        let Some(first) = annotated.responses.into_iter().next() else {
            return Ok(String::new());
        };
        if let Some(err) = first.error {
            return Err(Error::Channel(format!("Vision API error: {}", err.message)));
        }

        // The first annotation is the full text block
        let text = first
            .text_annotations
            .into_iter()
            .next()
            .map(|a| a.description)
            .unwrap_or_default();
        debug!(chars = text.len(), "OCR complete");
        Ok(text)
    }
}
