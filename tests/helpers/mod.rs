#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use tower::ServiceExt;

use drive_webdav::drive::{DriveApi, RemoteEntry};
use drive_webdav::fs::{split_path, FileSystem, Info};
use drive_webdav::{DavError, DavResult};

pub fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn remote_file(name: &str, size: i64, sha1: Option<&str>, pick_code: &str) -> RemoteEntry {
    RemoteEntry {
        name: name.to_string(),
        size,
        is_dir: false,
        updated_at: timestamp(1_700_000_000),
        sha1: sha1.map(str::to_string),
        pick_code: Some(pick_code.to_string()),
    }
}

pub fn remote_dir(name: &str) -> RemoteEntry {
    RemoteEntry {
        name: name.to_string(),
        size: 0,
        is_dir: true,
        updated_at: timestamp(1_690_000_000),
        sha1: None,
        pick_code: None,
    }
}

/// In-memory drive API that counts every upstream call
#[derive(Default)]
pub struct FakeDriveApi {
    /// directory path -> directory id
    pub dir_ids: HashMap<String, String>,
    /// directory id -> entries
    pub listings: HashMap<String, Vec<RemoteEntry>>,
    /// pick code -> download URL
    pub downloads: HashMap<String, String>,
    pub failing_list: bool,
    pub dir_id_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub download_calls: AtomicUsize,
}

impl FakeDriveApi {
    /// Root with `Movies/` (id 10) and `readme.txt`; `Movies` holds `clip.mp4`
    pub fn sample() -> Self {
        let mut api = FakeDriveApi::default();
        api.dir_ids.insert("/Movies".to_string(), "10".to_string());
        api.listings.insert(
            "0".to_string(),
            vec![remote_dir("Movies"), remote_file("readme.txt", 12, None, "pc-readme")],
        );
        api.listings.insert(
            "10".to_string(),
            vec![remote_file("clip.mp4", 4096, Some("DA39A3EE5E6B4B0D"), "pc-clip")],
        );
        api
    }

    pub fn with_download(mut self, pick_code: &str, url: &str) -> Self {
        self.downloads.insert(pick_code.to_string(), url.to_string());
        self
    }

    pub fn upstream_calls(&self) -> usize {
        self.dir_id_calls.load(Ordering::SeqCst)
            + self.list_calls.load(Ordering::SeqCst)
            + self.download_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DriveApi for FakeDriveApi {
    async fn login_check(&self) -> Result<()> {
        Ok(())
    }

    async fn dir_id(&self, path: &str) -> Result<String> {
        self.dir_id_calls.fetch_add(1, Ordering::SeqCst);
        if path == "/" {
            return Ok("0".to_string());
        }
        self.dir_ids
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("Directory {} does not exist", path))
    }

    async fn list(&self, dir_id: &str) -> Result<Vec<RemoteEntry>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_list {
            return Err(anyhow!("state false"));
        }
        Ok(self.listings.get(dir_id).cloned().unwrap_or_default())
    }

    async fn download_url(&self, pick_code: &str) -> Result<String> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        self.downloads
            .get(pick_code)
            .cloned()
            .ok_or_else(|| anyhow!("No download URL for {}", pick_code))
    }

    fn transport(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    }

    fn referer(&self) -> &str {
        "https://115.com"
    }

    fn user_agent(&self) -> &str {
        "FakeDrive/1.0"
    }
}

/// In-memory tree for exercising the WebDAV handler without a drive
pub struct FakeFs {
    pub entries: Vec<Info>,
    /// Error every stat returns instead of looking up the tree
    pub stat_error: Option<DavError>,
    /// Headers of the last request passed to `serve_content`
    pub served: Mutex<Option<HeaderMap>>,
}

impl FakeFs {
    pub fn new(entries: Vec<Info>) -> Self {
        Self {
            entries,
            stat_error: None,
            served: Mutex::new(None),
        }
    }

    /// `/docs/` with `report.pdf` and `notes/`, plus `/video.mkv`
    pub fn sample() -> Self {
        Self::new(vec![
            info("/docs", true, 0, None),
            info("/docs/report.pdf", false, 2048, Some("abc123")),
            info("/docs/notes", true, 0, None),
            info("/video.mkv", false, 10, None),
        ])
    }
}

pub fn info(path: &str, is_dir: bool, size: i64, etag: Option<&str>) -> Info {
    let (_, name) = split_path(path);
    Info {
        path: path.to_string(),
        name,
        is_dir,
        size,
        mod_time: timestamp(1_700_000_000),
        etag: etag.map(str::to_string),
        pick_code: (!is_dir).then(|| format!("pc{}", path)),
    }
}

#[async_trait]
impl FileSystem for FakeFs {
    async fn stat(&self, path: &str) -> DavResult<Info> {
        if let Some(err) = &self.stat_error {
            return Err(err.clone());
        }
        if path == "/" {
            return Ok(Info {
                mod_time: timestamp(1_700_000_000),
                ..Info::root()
            });
        }
        self.entries
            .iter()
            .find(|e| e.path == path)
            .cloned()
            .ok_or_else(|| DavError::NotFound(path.to_string()))
    }

    async fn read_dir(&self, path: &str) -> DavResult<Arc<[Info]>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| split_path(&e.path).0 == path)
            .cloned()
            .collect())
    }

    async fn serve_content(&self, request: Request<Body>, info: &Info) -> DavResult<Response> {
        *self.served.lock().unwrap() = Some(request.headers().clone());
        Ok((StatusCode::OK, format!("content of {}", info.path)).into_response())
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

pub async fn send(app: &Router, request: Request<Body>) -> TestResponse {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    TestResponse {
        status,
        headers,
        body: String::from_utf8_lossy(&bytes).into_owned(),
    }
}

pub fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn propfind(uri: &str, depth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("PROPFIND").uri(uri);
    if let Some(depth) = depth {
        builder = builder.header("Depth", depth);
    }
    builder.body(Body::empty()).unwrap()
}
