//! Offline adapters used when remote credentials are missing

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::{ImageStore, Messenger, TextRecognizer};
use crate::error::{Error, Result};

/// Writes outbound messages to the log instead of sending them
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMessenger;

#[async_trait]
impl Messenger for LogMessenger {
    async fn send(&self, to: &str, body: &str) -> Result<()> {
        info!(to = %to, chars = body.chars().count(), "Outbound message (not sent)");
        debug!(to = %to, body = %body, "Outbound message body");
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// OCR stand-in that never finds text
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTextRecognizer;

#[async_trait]
impl TextRecognizer for NoTextRecognizer {
    async fn extract_text(&self, _image_url: &str) -> Result<String> {
        Ok(String::new())
    }
}

/// Content-addressed image files in a local directory
///
/// File names are the SHA-256 of the bytes, so re-uploading the same photo
/// reuses the existing file.
pub struct LocalImageStore {
    dir: PathBuf,
}

impl LocalImageStore {
    /// Creates the directory if it doesn't exist
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| {
                Error::Channel(format!(
                    "Failed to create image directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
            info!("Created image directory: {}", dir.display());
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn upload(&self, bytes: &[u8], content_type: &str) -> Result<String> {
        let hash = hex::encode(Sha256::digest(bytes));
        let path = self
            .dir
            .join(format!("{}.{}", hash, extension_for(content_type)));

        if !path.exists() {
            tokio::fs::write(&path, bytes).await?;
            debug!(path = %path.display(), size = bytes.len(), "Stored image");
        }

        Ok(path.to_string_lossy().into_owned())
    }

    fn name(&self) -> &str {
        "local"
    }
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type.split(';').next().unwrap_or("").trim() {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/heic" => "heic",
        _ => "jpg",
    }
}
