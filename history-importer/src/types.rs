use std::path::PathBuf;
// Core post types come from the interfaces crate
pub use interfaces::defs::{CanonicalPost, ImageRef, ImageSource, Place, TimeBucket};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_version: String,
    pub cache_dir: PathBuf,
    /// Calls allowed per token per hour; the whole pool shares the budget.
    pub hourly_limit: u32,
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_redirects: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://graph.facebook.com".to_string(),
            api_version: "v7.0".to_string(),
            cache_dir: std::env::temp_dir(),
            hourly_limit: 180,
            user_agent: "History-Importer/1.0".to_string(),
            timeout_seconds: 30,
            max_redirects: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PublishConfig {
    /// Admin API root including the version, e.g. `https://blog.example.com/ghost/api/v3`.
    pub api_url: String,
    pub user_slug: String,
    pub images_per_row: usize,
    pub max_width: u32,
    pub list_page_size: u32,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:2368/ghost/api/v3".to_string(),
            user_slug: "me".to_string(),
            images_per_row: 2,
            max_width: 512,
            list_page_size: 15,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: tracing::Level,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: tracing::Level::INFO,
            json: false,
        }
    }
}

impl LogConfig {
    /// Install the global subscriber. A subscriber that is already set is left alone.
    pub fn init(&self) {
        let builder = tracing_subscriber::fmt().with_max_level(self.level);
        let result = if self.json {
            builder.json().try_init()
        } else {
            builder.try_init()
        };
        if result.is_err() {
            tracing::debug!("Tracing subscriber already installed");
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImporterError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream error {status} for {url}")]
    Upstream { status: u16, url: String },

    #[error("All {tokens} access tokens rejected, last status {status}")]
    RateLimitExhausted { tokens: usize, status: u16 },

    #[error("Malformed source {path}: {reason}")]
    MalformedSource { path: String, reason: String },

    #[error("Archive directory not found: {0}")]
    ArchiveNotFound(String),

    #[error("Failed to publish {slug}: HTTP {status}: {body}")]
    Publish { slug: String, status: u16, body: String },

    #[error("Slug {slug} was taken while publishing")]
    PublishConflict { slug: String },

    #[error("Failed to exchange token for a long lived token: HTTP {status}")]
    TokenExchange { status: u16 },

    #[error("Invalid admin key: {0}")]
    AdminKey(String),

    #[error("Failed to sign admin token: {0}")]
    AdminToken(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("General error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, ImporterError>;
