use std::sync::Arc;

use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response};
use chrono::{DateTime, Utc};

use crate::errors::DavResult;

/// Metadata for one entry of the exposed tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Info {
    /// Absolute path inside the tree, always starting with `/`
    pub path: String,
    pub name: String,
    pub is_dir: bool,
    pub size: i64,
    pub mod_time: DateTime<Utc>,
    /// Content hash reported by the drive, when it has one
    pub etag: Option<String>,
    /// Opaque drive handle used to request a download URL (files only)
    pub pick_code: Option<String>,
}

impl Info {
    pub fn root() -> Self {
        Info {
            path: "/".to_string(),
            name: "/".to_string(),
            is_dir: true,
            size: 0,
            mod_time: Utc::now(),
            etag: None,
            pick_code: None,
        }
    }
}

/// Read-only view of a remote tree as served over WebDAV.
///
/// Implementations are shared across request tasks and must do their own
/// synchronization.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn stat(&self, path: &str) -> DavResult<Info>;

    async fn read_dir(&self, path: &str) -> DavResult<Arc<[Info]>>;

    /// Answers a GET or HEAD for `info` by streaming its bytes.
    ///
    /// The request is consumed so its `Range` and conditional headers can be
    /// forwarded as-is.
    async fn serve_content(&self, request: Request<Body>, info: &Info) -> DavResult<Response>;
}

/// Cleans `p` into an absolute path with no `.`/`..` segments, no repeated
/// separators, and no trailing `/` except for the root.
pub fn clean_path(p: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in p.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Splits a cleaned non-root path into its parent directory and leaf name.
pub fn split_path(p: &str) -> (String, String) {
    let cleaned = clean_path(p);
    match cleaned.rsplit_once('/') {
        Some((parent, name)) => {
            let parent = if parent.is_empty() { "/" } else { parent };
            (parent.to_string(), name.to_string())
        }
        None => ("/".to_string(), cleaned),
    }
}

/// Joins `name` onto directory `dir`.
pub fn join_path(dir: &str, name: &str) -> String {
    clean_path(&format!("{}/{}", dir, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path(""), "/");
        assert_eq!(clean_path("/"), "/");
        assert_eq!(clean_path("a/b/"), "/a/b");
        assert_eq!(clean_path("//a//./b"), "/a/b");
        assert_eq!(clean_path("/a/../../b"), "/b");
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/movies"), ("/".to_string(), "movies".to_string()));
        assert_eq!(
            split_path("/movies/2024/clip.mp4/"),
            ("/movies/2024".to_string(), "clip.mp4".to_string())
        );
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/", "a"), "/a");
        assert_eq!(join_path("/a", "b c"), "/a/b c");
    }
}
