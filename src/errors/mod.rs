use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Errors surfaced by the resolver, the content proxy and the WebDAV handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DavError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("bad path: {0}")]
    BadPath(String),

    #[error("bad method: {0}")]
    BadMethod(String),

    #[error("bad depth: {0}")]
    BadDepth(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("{0}")]
    Upstream(String),

    #[error("reverse proxy failed: {0}")]
    Proxy(String),
}

impl DavError {
    pub fn upstream(context: &str, err: impl std::fmt::Display) -> Self {
        DavError::Upstream(format!("{}: {}", context, err))
    }

    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            DavError::NotFound(_) => StatusCode::NOT_FOUND,
            DavError::BadPath(_) => StatusCode::BAD_REQUEST,
            DavError::BadMethod(_) => StatusCode::METHOD_NOT_ALLOWED,
            DavError::BadDepth(_) => StatusCode::FORBIDDEN,
            DavError::RateLimited => StatusCode::SERVICE_UNAVAILABLE,
            DavError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DavError::Proxy(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Text sent to the client. Proxy details stay in the server log.
    pub fn user_message(&self) -> String {
        match self {
            DavError::NotFound(_) => "not found".to_string(),
            DavError::BadPath(_) => "bad path".to_string(),
            DavError::BadMethod(_) => "bad method".to_string(),
            DavError::BadDepth(_) => "bad depth".to_string(),
            DavError::RateLimited => "rate limit exceeded".to_string(),
            DavError::Upstream(message) => message.clone(),
            DavError::Proxy(_) => "bad gateway".to_string(),
        }
    }
}

impl IntoResponse for DavError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.user_message(),
        )
            .into_response()
    }
}

pub type DavResult<T> = Result<T, DavError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_4xx() {
        assert_eq!(DavError::NotFound("/a".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(DavError::BadPath("/x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(DavError::BadMethod("/d".into()).status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(DavError::BadDepth("2".into()).status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_proxy_failure_hides_details() {
        let err = DavError::Proxy("connection reset by 10.0.0.7:443".into());
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.user_message(), "bad gateway");
        assert!(err.to_string().contains("10.0.0.7"));
    }

    #[test]
    fn test_upstream_failure_keeps_context() {
        let err = DavError::upstream("list files failed", "state false");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.user_message(), "list files failed: state false");
    }
}
