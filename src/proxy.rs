use anyhow::anyhow;
use axum::{
    body::Body,
    http::{
        header::{self, HeaderName},
        HeaderMap, HeaderValue, Request,
    },
    response::Response,
};
use futures_util::TryStreamExt;
use reqwest::Client;
use tracing::warn;
use url::Url;

use crate::errors::{DavError, DavResult};

/// Headers that describe a single connection and must not be forwarded
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(name)
}

/// Streams file content from signed drive URLs back to WebDAV clients.
///
/// The transport carries the drive session's cookie jar, so every
/// forwarded request replays the cookies captured at login.
#[derive(Clone)]
pub struct ContentProxy {
    client: Client,
    referer: HeaderValue,
    user_agent: HeaderValue,
}

impl ContentProxy {
    pub fn new(client: Client, referer: &str, user_agent: &str) -> anyhow::Result<Self> {
        let referer = HeaderValue::from_str(referer)
            .map_err(|e| anyhow!("Invalid Referer {:?} for content proxy: {}", referer, e))?;
        let user_agent = HeaderValue::from_str(user_agent)
            .map_err(|e| anyhow!("Invalid User-Agent {:?} for content proxy: {}", user_agent, e))?;

        Ok(Self {
            client,
            referer,
            user_agent,
        })
    }

    /// Sends `request` to `target` and returns the upstream response with its
    /// body streamed through unmodified.
    ///
    /// Upstream error statuses are passed through; only transport failures
    /// become `DavError::Proxy`.
    pub async fn forward(&self, request: Request<Body>, target: Url) -> DavResult<Response> {
        let (parts, _) = request.into_parts();
        let headers = self.outbound_headers(&parts.headers, &target);

        let upstream = self
            .client
            .request(parts.method.clone(), target.clone())
            .headers(headers)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, url = %target, "reverse proxy failed");
                DavError::Proxy(e.to_string())
            })?;

        let status = upstream.status();
        let response_headers = filter_headers(upstream.headers());

        let body = if status.is_client_error() || status.is_server_error() {
            let bytes = upstream.bytes().await.map_err(|e| {
                warn!(error = %e, url = %target, "reverse proxy failed");
                DavError::Proxy(e.to_string())
            })?;
            warn!(
                status = %status,
                body = %String::from_utf8_lossy(&bytes),
                "reverse proxy failed"
            );
            Body::from(bytes)
        } else {
            let url = target.clone();
            Body::from_stream(upstream.bytes_stream().inspect_err(move |e| {
                warn!(error = %e, url = %url, "content stream interrupted");
            }))
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }

    fn outbound_headers(&self, incoming: &HeaderMap, target: &Url) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(incoming.len() + 3);
        for (name, value) in incoming {
            // The client's own credentials are for this server, not the drive
            if is_hop_by_hop(name)
                || name == header::HOST
                || name == header::AUTHORIZATION
                || name == header::COOKIE
            {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }

        headers.insert(header::REFERER, self.referer.clone());
        headers.insert(header::USER_AGENT, self.user_agent.clone());
        if let Ok(host) = HeaderValue::from_str(&target[url::Position::BeforeHost..url::Position::AfterPort]) {
            headers.insert(header::HOST, host);
        }
        headers
    }
}

fn filter_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if !is_hop_by_hop(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}
