use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{cookie::Jar, redirect::Policy, Client};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use super::api::{DriveApi, RemoteEntry};

pub const UA_115_BROWSER: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/96.0.4664.110 Safari/537.36 115Browser/23.9.3.2";

pub const COOKIE_URL: &str = "https://115.com";

const LIST_PAGE_SIZE: usize = 1000;
const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Cookie credential copied from a logged-in browser session
#[derive(Debug, Clone, Default)]
pub struct Credential {
    pub uid: String,
    pub cid: String,
    pub seid: String,
    pub kid: String,
}

impl Credential {
    fn cookies(&self) -> [(&'static str, &str); 4] {
        [
            ("UID", self.uid.as_str()),
            ("CID", self.cid.as_str()),
            ("SEID", self.seid.as_str()),
            ("KID", self.kid.as_str()),
        ]
    }
}

/// Base URLs of the drive's web API
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub webapi: String,
    pub status: String,
    pub cookie_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            webapi: "https://webapi.115.com".to_string(),
            status: "https://my.115.com/?ct=guide&ac=status".to_string(),
            cookie_url: COOKIE_URL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    state: bool,
}

#[derive(Debug, Deserialize)]
struct GetIdResponse {
    #[serde(default)]
    state: bool,
    #[serde(default)]
    id: Value,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    state: bool,
    #[serde(default)]
    count: Value,
    #[serde(default)]
    data: Vec<FileRecord>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileRecord {
    #[serde(rename = "n")]
    name: String,
    #[serde(rename = "s", default)]
    size: Value,
    /// Present for files only
    #[serde(default)]
    fid: Value,
    #[serde(rename = "pc", default)]
    pick_code: Option<String>,
    #[serde(default)]
    sha: Option<String>,
    #[serde(rename = "te", default)]
    updated: Value,
}

#[derive(Debug, Deserialize)]
struct DownloadResponse {
    #[serde(default)]
    state: bool,
    #[serde(default)]
    file_url: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

impl FileRecord {
    fn into_entry(self) -> RemoteEntry {
        let is_dir = value_as_string(&self.fid).map_or(true, |fid| fid.is_empty());
        let updated_at = value_as_i64(&self.updated)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        RemoteEntry {
            name: self.name,
            size: if is_dir { 0 } else { value_as_i64(&self.size).unwrap_or(0) },
            is_dir,
            updated_at,
            sha1: self.sha.filter(|s| !s.is_empty()),
            pick_code: self.pick_code.filter(|s| !s.is_empty() && !is_dir),
        }
    }
}

/// reqwest-backed client for the 115 drive web API
pub struct Pan115Client {
    http_client: Client,
    transport: Client,
    endpoints: Endpoints,
}

impl Pan115Client {
    pub fn new(credential: &Credential, endpoints: Endpoints) -> Result<Self> {
        let cookie_url = Url::parse(&endpoints.cookie_url)
            .map_err(|e| anyhow!("Invalid cookie URL {}: {}", endpoints.cookie_url, e))?;

        let domain = match cookie_url.host() {
            Some(url::Host::Domain(domain)) => format!("; Domain={}", domain),
            _ => String::new(),
        };

        let jar = Arc::new(Jar::default());
        for (name, value) in credential.cookies() {
            if !value.is_empty() {
                jar.add_cookie_str(&format!("{}={}{}; Path=/", name, value, domain), &cookie_url);
            }
        }

        let http_client = Client::builder()
            .user_agent(UA_115_BROWSER)
            .cookie_provider(jar.clone())
            .timeout(API_TIMEOUT)
            .build()?;

        // No overall timeout: content transfers last as long as the client reads
        let transport = Client::builder()
            .cookie_provider(jar)
            .redirect(Policy::none())
            .connect_timeout(API_TIMEOUT)
            .build()?;

        Ok(Self {
            http_client,
            transport,
            endpoints,
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
        let response = self
            .http_client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| anyhow!("Request to {} failed: {}", url, e))?;

        if !response.status().is_success() {
            return Err(anyhow!("Request to {} failed with status: {}", url, response.status()));
        }

        response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse response from {}: {}", url, e))
    }
}

#[async_trait]
impl DriveApi for Pan115Client {
    async fn login_check(&self) -> Result<()> {
        let status: StatusResponse = self.get_json(&self.endpoints.status, &[]).await?;
        if !status.state {
            return Err(anyhow!("Session is not logged in, check the UID/CID/SEID/KID cookies"));
        }
        info!("Drive session is logged in");
        Ok(())
    }

    async fn dir_id(&self, path: &str) -> Result<String> {
        if path == "/" {
            return Ok("0".to_string());
        }

        let url = format!("{}/files/getid", self.endpoints.webapi);
        let resp: GetIdResponse = self.get_json(&url, &[("path", path)]).await?;
        if !resp.state {
            return Err(anyhow!(
                "Resolving {} failed: {}",
                path,
                resp.error.unwrap_or_else(|| "unknown error".to_string())
            ));
        }

        match value_as_string(&resp.id) {
            Some(id) if id != "0" => Ok(id),
            _ => Err(anyhow!("Directory {} does not exist", path)),
        }
    }

    async fn list(&self, dir_id: &str) -> Result<Vec<RemoteEntry>> {
        let url = format!("{}/files", self.endpoints.webapi);
        let limit = LIST_PAGE_SIZE.to_string();
        let mut entries = Vec::new();

        loop {
            let offset = entries.len().to_string();
            let page: ListResponse = self
                .get_json(
                    &url,
                    &[
                        ("aid", "1"),
                        ("cid", dir_id),
                        ("o", "user_ptime"),
                        ("asc", "0"),
                        ("show_dir", "1"),
                        ("format", "json"),
                        ("offset", &offset),
                        ("limit", &limit),
                    ],
                )
                .await?;

            if !page.state {
                return Err(anyhow!(
                    "Listing directory {} failed: {}",
                    dir_id,
                    page.error.unwrap_or_else(|| "unknown error".to_string())
                ));
            }

            let total = value_as_i64(&page.count).unwrap_or(0);
            let received = page.data.len();
            entries.extend(page.data.into_iter().map(FileRecord::into_entry));

            if received == 0 || i64::try_from(entries.len()).unwrap_or(i64::MAX) >= total {
                break;
            }
        }

        debug!("Listed {} entries under directory {}", entries.len(), dir_id);
        Ok(entries)
    }

    async fn download_url(&self, pick_code: &str) -> Result<String> {
        let url = format!("{}/files/download", self.endpoints.webapi);
        let resp: DownloadResponse = self.get_json(&url, &[("pickcode", pick_code)]).await?;

        match resp.file_url {
            Some(file_url) if resp.state && !file_url.is_empty() => Ok(file_url),
            _ => Err(anyhow!(
                "No download URL for {}: {}",
                pick_code,
                resp.msg.unwrap_or_else(|| "unknown error".to_string())
            )),
        }
    }

    fn transport(&self) -> Client {
        self.transport.clone()
    }

    fn referer(&self) -> &str {
        &self.endpoints.cookie_url
    }

    fn user_agent(&self) -> &str {
        UA_115_BROWSER
    }
}

fn value_as_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
