use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One record of a drive directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub size: i64,
    pub is_dir: bool,
    pub updated_at: DateTime<Utc>,
    pub sha1: Option<String>,
    pub pick_code: Option<String>,
}

/// Client for the cloud drive's account API.
///
/// The resolver only depends on this trait; `Pan115Client` is the
/// production implementation.
#[async_trait]
pub trait DriveApi: Send + Sync {
    /// Validates that the imported session is still logged in
    async fn login_check(&self) -> Result<()>;

    /// Resolves an absolute directory path to the drive's directory id
    async fn dir_id(&self, path: &str) -> Result<String>;

    /// Lists every entry directly under `dir_id`
    async fn list(&self, dir_id: &str) -> Result<Vec<RemoteEntry>>;

    /// Exchanges a file's pick code for a signed, time-limited download URL
    async fn download_url(&self, pick_code: &str) -> Result<String>;

    /// HTTP client carrying the session cookies, used to fetch file content
    fn transport(&self) -> reqwest::Client;

    /// Referer the content servers expect on download requests
    fn referer(&self) -> &str;

    /// User-Agent the download URLs were signed for
    fn user_agent(&self) -> &str;
}
