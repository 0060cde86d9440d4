// Remote drive resolver: stat/read_dir/serve_content backed by the drive API

pub mod api;
pub mod pan115;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response};
use tracing::debug;
use url::Url;

use crate::cache::TtlCache;
use crate::config::DriveConfig;
use crate::errors::{DavError, DavResult};
use crate::fs::{clean_path, join_path, split_path, FileSystem, Info};
use crate::proxy::ContentProxy;
use crate::rate_limit::RateLimiter;

pub use api::{DriveApi, RemoteEntry};
pub use pan115::{Credential, Endpoints, Pan115Client};

/// Directory id the drive uses for its root folder
pub const ROOT_DIR_ID: &str = "0";

/// Values held in the shared resolver cache
#[derive(Debug, Clone)]
pub enum CacheValue {
    Dir(Arc<[Info]>),
    Download(String),
}

pub fn dir_cache_key(path: &str) -> String {
    format!("dir:{}", path)
}

pub fn download_cache_key(pick_code: &str) -> String {
    format!("download:{}", pick_code)
}

/// `FileSystem` over the cloud drive.
///
/// Listings and download URLs are cached for the configured TTL; every
/// call that reaches the drive API first takes a token from the limiter.
/// Concurrent misses on the same key each go upstream and the last write
/// wins.
pub struct Drive {
    api: Arc<dyn DriveApi>,
    proxy: ContentProxy,
    cache: Arc<TtlCache<CacheValue>>,
    limiter: Option<Arc<RateLimiter>>,
}

impl Drive {
    pub fn new(
        api: Arc<dyn DriveApi>,
        cache: Arc<TtlCache<CacheValue>>,
        limiter: Option<Arc<RateLimiter>>,
    ) -> anyhow::Result<Self> {
        let proxy = ContentProxy::new(api.transport(), api.referer(), api.user_agent())?;
        Ok(Self {
            api,
            proxy,
            cache,
            limiter,
        })
    }

    /// Resolver with its own cache and limiter sized from `config`
    pub fn from_config(api: Arc<dyn DriveApi>, config: &DriveConfig) -> anyhow::Result<Self> {
        let cache = Arc::new(TtlCache::new(config.cache_ttl()));
        let limiter = (config.rate > 0).then(|| Arc::new(RateLimiter::per_second(config.rate)));
        Self::new(api, cache, limiter)
    }

    /// Takes a token for one upstream call
    async fn gate(&self) -> DavResult<()> {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await?;
        }
        Ok(())
    }

    async fn fetch_dir(&self, path: &str) -> DavResult<Arc<[Info]>> {
        let key = dir_cache_key(path);
        if let Some(CacheValue::Dir(infos)) = self.cache.get(&key).await {
            debug!("cache hit: {}", key);
            return Ok(infos);
        }
        debug!("cache miss: {}", key);

        let dir_id = if path == "/" {
            ROOT_DIR_ID.to_string()
        } else {
            // Unresolvable paths fall back to the root id
            self.gate().await?;
            match self.api.dir_id(path).await {
                Ok(id) => id,
                Err(e) => {
                    debug!("resolve directory failed for {}: {}, using root directory id", path, e);
                    ROOT_DIR_ID.to_string()
                }
            }
        };

        self.gate().await?;
        let entries = self
            .api
            .list(&dir_id)
            .await
            .map_err(|e| DavError::upstream("list files failed", e))?;

        let infos: Arc<[Info]> = entries
            .into_iter()
            .map(|entry| Info {
                path: join_path(path, &entry.name),
                name: entry.name,
                is_dir: entry.is_dir,
                size: entry.size,
                mod_time: entry.updated_at,
                etag: entry.sha1,
                pick_code: entry.pick_code,
            })
            .collect();

        self.cache.set(key, CacheValue::Dir(infos.clone())).await;
        Ok(infos)
    }

    async fn fetch_download_url(&self, pick_code: &str) -> DavResult<String> {
        let key = download_cache_key(pick_code);
        if let Some(CacheValue::Download(url)) = self.cache.get(&key).await {
            debug!("cache hit: {}", key);
            return Ok(url);
        }
        debug!("cache miss: {}", key);

        self.gate().await?;
        let url = self
            .api
            .download_url(pick_code)
            .await
            .map_err(|e| DavError::upstream("download failed", e))?;

        self.cache.set(key, CacheValue::Download(url.clone())).await;
        Ok(url)
    }
}

#[async_trait]
impl FileSystem for Drive {
    async fn stat(&self, path: &str) -> DavResult<Info> {
        let path = clean_path(path);
        if path == "/" {
            return Ok(Info::root());
        }

        let (dir, name) = split_path(&path);
        let infos = self.fetch_dir(&dir).await?;

        infos
            .iter()
            .find(|info| info.name == name)
            .cloned()
            .ok_or(DavError::NotFound(path))
    }

    async fn read_dir(&self, path: &str) -> DavResult<Arc<[Info]>> {
        self.fetch_dir(&clean_path(path)).await
    }

    async fn serve_content(&self, request: Request<Body>, info: &Info) -> DavResult<Response> {
        let pick_code = info
            .pick_code
            .as_deref()
            .filter(|pc| !pc.is_empty())
            .ok_or_else(|| DavError::Upstream("pick code not found".to_string()))?;

        let url = self.fetch_download_url(pick_code).await?;
        let target = Url::parse(&url).map_err(|e| DavError::upstream("invalid download URL", e))?;

        debug!(
            path = %info.path,
            name = %info.name,
            pick_code = %pick_code,
            range = ?request.headers().get("range"),
            url = %target,
            "serve content"
        );

        self.proxy.forward(request, target).await
    }
}
