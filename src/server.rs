use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use axum_extra::headers::{authorization::Basic, Authorization, HeaderMapExt};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::webdav::{dav_handler, DavHandler};

/// Credentials every request must present when Basic auth is enabled
#[derive(Clone, Debug)]
pub struct BasicCredentials {
    pub user: String,
    pub pwd: String,
}

/// Every path is routed to the DAV handler, which rejects paths outside its
/// base prefix itself.
pub fn router(handler: Arc<DavHandler>, auth: Option<BasicCredentials>) -> Router {
    let router = Router::new()
        .fallback(dav_handler)
        .with_state(handler)
        .layer(middleware::from_fn(log_requests));

    match auth {
        Some(credentials) => {
            router.layer(middleware::from_fn_with_state(Arc::new(credentials), basic_auth))
        }
        None => router,
    }
}

pub async fn serve(listener: TcpListener, router: Router) -> anyhow::Result<()> {
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn basic_auth(
    State(credentials): State<Arc<BasicCredentials>>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = request
        .headers()
        .typed_get::<Authorization<Basic>>()
        .is_some_and(|auth| auth.username() == credentials.user && auth.password() == credentials.pwd);

    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, r#"Basic realm="WebDAV""#)],
            "Unauthorized",
        )
            .into_response();
    }

    next.run(request).await
}

async fn log_requests(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default();

    let response = next.run(request).await;

    info!(
        method = %method,
        path = %path,
        remote = %remote,
        status = response.status().as_u16(),
        duration = ?start.elapsed(),
        "request"
    );
    response
}
