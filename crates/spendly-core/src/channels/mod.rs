//! External channel adapters
//!
//! Everything the bot talks to besides the model and the database:
//!
//! - `Messenger`: outbound WhatsApp messages (Twilio, or a log-only sink)
//! - `MediaFetcher`: downloads inbound attachments (Twilio media URLs)
//! - `ImageStore`: persists bill photos (Cloudinary, or the local filesystem)
//! - `TextRecognizer`: OCR (Google Vision, or nothing)
//! - `LoginLinkIssuer`: signed dashboard links, implemented by the server
//! - `RandomSource`: coin flips for optional reply content
//!
//! `Channels::from_config` picks the remote adapter when its credentials are
//! configured and the local fallback otherwise, so the bot runs offline.

mod cloudinary;
mod local;
mod twilio;
mod vision;

pub use cloudinary::CloudinaryStore;
pub use local::{LocalImageStore, LogMessenger, NoTextRecognizer};
pub use twilio::{TwilioMediaFetcher, TwilioMessenger};
pub use vision::GoogleVision;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use tracing::info;

use crate::config::{data_dir, Config};
use crate::error::Result;

/// Outbound message channel
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send `body` to a bare phone number (no channel prefix)
    async fn send(&self, to: &str, body: &str) -> Result<()>;

    /// Adapter name (for logging)
    fn name(&self) -> &str;
}

/// Downloads inbound media by URL
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Durable storage for uploaded images
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store the bytes and return a URL (or path) that can be read back
    async fn upload(&self, bytes: &[u8], content_type: &str) -> Result<String>;

    fn name(&self) -> &str;
}

/// OCR over a stored image
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Full detected text, empty when the image has none
    async fn extract_text(&self, image_url: &str) -> Result<String>;
}

/// Issues short-lived dashboard login links
pub trait LoginLinkIssuer: Send + Sync {
    fn issue(&self, phone: &str) -> Result<String>;

    /// How long an issued link stays valid
    fn ttl_minutes(&self) -> i64;
}

/// Source of randomness for optional reply content
pub trait RandomSource: Send + Sync {
    /// True with probability `p`
    fn chance(&self, p: f64) -> bool;
}

/// Thread-local RNG
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn chance(&self, p: f64) -> bool {
        if p <= 0.0 {
            return false;
        }
        if p >= 1.0 {
            return true;
        }
        rand::thread_rng().gen_bool(p)
    }
}

/// The set of adapters a router is wired with
#[derive(Clone)]
pub struct Channels {
    pub messenger: Arc<dyn Messenger>,
    pub media: Arc<dyn MediaFetcher>,
    pub images: Arc<dyn ImageStore>,
    pub ocr: Arc<dyn TextRecognizer>,
    pub random: Arc<dyn RandomSource>,
}

impl Channels {
    /// Remote adapters where credentials exist, local fallbacks elsewhere
    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = config.http_timeout();

        let (messenger, media): (Arc<dyn Messenger>, Arc<dyn MediaFetcher>) =
            match TwilioMessenger::from_settings(&config.twilio, timeout) {
                Some(twilio) => {
                    info!("Twilio messenger configured");
                    let fetcher = TwilioMediaFetcher::new(twilio.credentials(), timeout);
                    (Arc::new(twilio), Arc::new(fetcher))
                }
                None => {
                    info!("Twilio not configured, outbound messages are logged only");
                    (
                        Arc::new(LogMessenger),
                        Arc::new(TwilioMediaFetcher::anonymous(timeout)),
                    )
                }
            };

        let images: Arc<dyn ImageStore> =
            match CloudinaryStore::from_settings(&config.cloudinary, timeout) {
                Some(store) => {
                    info!(folder = %config.cloudinary.folder, "Cloudinary image store configured");
                    Arc::new(store)
                }
                None => {
                    let dir = config.image_dir.clone().unwrap_or_else(default_image_dir);
                    info!(dir = %dir.display(), "Cloudinary not configured, storing images locally");
                    Arc::new(LocalImageStore::new(dir)?)
                }
            };

        let ocr: Arc<dyn TextRecognizer> = match GoogleVision::from_settings(&config.vision, timeout)
        {
            Some(vision) => Arc::new(vision),
            None => {
                info!("Google Vision not configured, bill photos will not be read");
                Arc::new(NoTextRecognizer)
            }
        };

        Ok(Self {
            messenger,
            media,
            images,
            ocr,
            random: Arc::new(ThreadRandom),
        })
    }
}

/// Where the local image store writes when no directory is given
pub fn default_image_dir() -> PathBuf {
    data_dir()
        .map(|d| d.join("images"))
        .unwrap_or_else(|| PathBuf::from("images"))
}

/// Strip the channel prefix from an inbound/outbound address
pub fn bare_phone(address: &str) -> &str {
    address
        .trim()
        .strip_prefix("whatsapp:")
        .unwrap_or(address.trim())
}
