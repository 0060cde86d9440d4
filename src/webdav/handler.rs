use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{error, warn};

use super::path::{normalize_base_path, strip_base, to_href};
use super::xml::{render_multistatus, PropEntry};
use crate::errors::DavError;
use crate::fs::{FileSystem, Info};

pub const ALLOWED_METHODS: &str = "OPTIONS, GET, HEAD, PROPFIND";

const MULTISTATUS_CONTENT_TYPE: &str = r#"application/xml; charset="utf-8""#;

/// Read-only WebDAV front for a `FileSystem`. Holds no per-request state.
pub struct DavHandler {
    fs: Arc<dyn FileSystem>,
    base_path: String,
}

impl DavHandler {
    pub fn new(fs: Arc<dyn FileSystem>, base_path: &str) -> Self {
        Self {
            fs,
            base_path: normalize_base_path(base_path),
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub async fn handle(&self, request: Request) -> Response {
        let method = request.method().clone();
        match method.as_str() {
            "OPTIONS" => self.handle_options(),
            "GET" | "HEAD" => self.handle_get_head(request).await,
            "PROPFIND" => self.handle_propfind(request).await,
            _ => {
                error!(method = %method, path = %request.uri().path(), "method not allowed");
                (
                    StatusCode::METHOD_NOT_ALLOWED,
                    [(header::ALLOW, ALLOWED_METHODS)],
                    "method not allowed",
                )
                    .into_response()
            }
        }
    }

    fn handle_options(&self) -> Response {
        (
            StatusCode::NO_CONTENT,
            [
                (header::HeaderName::from_static("dav"), "1"),
                (header::HeaderName::from_static("ms-author-via"), "DAV"),
                (header::ALLOW, ALLOWED_METHODS),
            ],
        )
            .into_response()
    }

    async fn handle_get_head(&self, request: Request) -> Response {
        let path = match strip_base(&self.base_path, request.uri().path()) {
            Ok(path) => path,
            Err(e) => {
                warn!(path = %request.uri().path(), "bad path");
                return e.into_response();
            }
        };

        let info = match self.fs.stat(&path).await {
            Ok(info) => info,
            Err(e) => {
                warn!(path = %path, error = %e, "stat failed");
                return e.into_response();
            }
        };

        if info.is_dir {
            error!(path = %path, "bad method");
            return DavError::BadMethod(path).into_response();
        }

        let etag = etag_for(&info);
        let last_modified = http_date(&info.mod_time);

        let mut headers = HeaderMap::new();
        insert_header(&mut headers, header::ETAG, &etag);
        insert_header(&mut headers, header::LAST_MODIFIED, &last_modified);
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

        if is_not_modified(request.headers(), &etag, &info.mod_time) {
            return (StatusCode::NOT_MODIFIED, headers).into_response();
        }

        let content_type = mime_guess::from_path(&info.name).first_or_octet_stream();
        insert_header(&mut headers, header::CONTENT_TYPE, content_type.essence_str());

        match self.fs.serve_content(request, &info).await {
            Ok(mut response) => {
                // Error bodies from the CDN keep their own metadata
                if response.status().is_success() {
                    for (name, value) in headers {
                        if let Some(name) = name {
                            response.headers_mut().insert(name, value);
                        }
                    }
                }
                response
            }
            Err(e) => {
                error!(path = %path, error = %e, "serve content failed");
                e.into_response()
            }
        }
    }

    async fn handle_propfind(&self, request: Request) -> Response {
        let path = match strip_base(&self.base_path, request.uri().path()) {
            Ok(path) => path,
            Err(e) => {
                warn!(path = %request.uri().path(), "bad path");
                return e.into_response();
            }
        };

        let depth = match request.headers().get("depth").map(|v| v.to_str()) {
            None => "1",
            Some(Ok(depth)) => depth.trim(),
            Some(Err(_)) => {
                error!(path = %path, "bad depth: not visible ASCII");
                return DavError::BadDepth("<non-ascii>".to_string()).into_response();
            }
        };

        if depth != "0" && depth != "1" {
            error!(path = %path, depth = %depth, "bad depth");
            return DavError::BadDepth(depth.to_string()).into_response();
        }

        let root = match self.fs.stat(&path).await {
            Ok(info) => info,
            Err(e) => {
                error!(path = %path, error = %e, "stat failed");
                return e.into_response();
            }
        };

        let children = if root.is_dir && depth == "1" {
            match self.fs.read_dir(&path).await {
                Ok(children) => Some(children),
                Err(e) => {
                    error!(path = %path, error = %e, "read dir failed");
                    return e.into_response();
                }
            }
        } else {
            None
        };

        let entries: Vec<PropEntry> = std::iter::once(&root)
            .chain(children.iter().flat_map(|c| c.iter()))
            .map(|info| self.prop_entry(info))
            .collect();

        match render_multistatus(&entries) {
            Ok(body) => (
                StatusCode::MULTI_STATUS,
                [(header::CONTENT_TYPE, MULTISTATUS_CONTENT_TYPE)],
                Body::from(body),
            )
                .into_response(),
            Err(e) => {
                error!(path = %path, error = %e, "render multistatus failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }

    fn prop_entry(&self, info: &Info) -> PropEntry {
        PropEntry {
            href: to_href(&self.base_path, &info.path, info.is_dir),
            display_name: info.name.clone(),
            etag: etag_for(info),
            last_modified: http_date(&info.mod_time),
            content_length: (!info.is_dir).then_some(info.size),
            is_collection: info.is_dir,
        }
    }
}

/// axum entry point: every route of the DAV tree lands here
pub async fn dav_handler(State(handler): State<Arc<DavHandler>>, request: Request) -> Response {
    handler.handle(request).await
}

/// Quoted ETag: the drive's content hash when present, otherwise a hash of
/// size and modification time.
pub fn etag_for(info: &Info) -> String {
    match info.etag.as_deref().filter(|e| !e.is_empty()) {
        Some(hash) => quote_etag(hash),
        None => {
            let nanos = info
                .mod_time
                .timestamp_nanos_opt()
                .unwrap_or_else(|| info.mod_time.timestamp());
            let mut hasher = Sha256::new();
            hasher.update(format!("{}:{}", info.size, nanos).as_bytes());
            quote_etag(&format!("{:x}", hasher.finalize()))
        }
    }
}

fn quote_etag(s: &str) -> String {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s.to_string()
    } else {
        format!("\"{}\"", s)
    }
}

/// IMF-fixdate, as used by `Last-Modified`
pub fn http_date(t: &DateTime<Utc>) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub fn parse_http_date(date_str: &str) -> Option<DateTime<Utc>> {
    let date_str = date_str.trim();
    if date_str.is_empty() {
        return None;
    }

    DateTime::parse_from_rfc2822(date_str)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(date_str, "%a, %d %b %Y %H:%M:%S GMT")
                .ok()
                .map(|ndt| DateTime::from_naive_utc_and_offset(ndt, Utc))
        })
}

/// `If-None-Match` takes precedence; `If-Modified-Since` is only consulted
/// when it is absent.
fn is_not_modified(headers: &HeaderMap, etag: &str, mod_time: &DateTime<Utc>) -> bool {
    if let Some(inm) = headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok()) {
        return inm.split(',').map(str::trim).any(|candidate| {
            candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == etag
        });
    }

    if let Some(since) = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date)
    {
        return mod_time.timestamp() <= since.timestamp();
    }

    false
}

fn insert_header(headers: &mut HeaderMap, name: header::HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => warn!(header = %name, value = %value, "dropping invalid header value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn info(etag: Option<&str>) -> Info {
        Info {
            path: "/a/b.mp4".to_string(),
            name: "b.mp4".to_string(),
            is_dir: false,
            size: 1024,
            mod_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            etag: etag.map(str::to_string),
            pick_code: Some("pc".to_string()),
        }
    }

    #[test]
    fn test_etag_prefers_content_hash() {
        assert_eq!(etag_for(&info(Some("DA39A3EE"))), "\"DA39A3EE\"");
        assert_eq!(etag_for(&info(Some("\"quoted\""))), "\"quoted\"");
    }

    #[test]
    fn test_fallback_etag_is_deterministic() {
        let a = etag_for(&info(None));
        let b = etag_for(&info(None));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64 + 2);

        let mut other = info(None);
        other.size += 1;
        assert_ne!(etag_for(&other), a);

        let mut touched = info(None);
        touched.mod_time = touched.mod_time + chrono::Duration::nanoseconds(1);
        assert_ne!(etag_for(&touched), a);
    }

    #[test]
    fn test_http_date_round_trip() {
        let t = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert_eq!(http_date(&t), "Tue, 14 Nov 2023 22:13:20 GMT");
        assert_eq!(parse_http_date("Tue, 14 Nov 2023 22:13:20 GMT"), Some(t));
        assert_eq!(parse_http_date("yesterday"), None);
    }

    #[test]
    fn test_if_none_match() {
        let t = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("\"x\", W/\"abc\""));
        assert!(is_not_modified(&headers, "\"abc\"", &t));
        assert!(!is_not_modified(&headers, "\"def\"", &t));

        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("*"));
        assert!(is_not_modified(&headers, "\"def\"", &t));
    }

    #[test]
    fn test_if_modified_since_uses_second_precision() {
        let t = Utc.timestamp_opt(1_700_000_000, 500_000_000).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::IF_MODIFIED_SINCE,
            HeaderValue::from_static("Tue, 14 Nov 2023 22:13:20 GMT"),
        );
        assert!(is_not_modified(&headers, "\"e\"", &t));

        headers.insert(
            header::IF_MODIFIED_SINCE,
            HeaderValue::from_static("Tue, 14 Nov 2023 22:13:19 GMT"),
        );
        assert!(!is_not_modified(&headers, "\"e\"", &t));
    }
}
