use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::drive::Credential;
use crate::server::BasicCredentials;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub base_path: String,
    pub user: String,
    pub pwd: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriveConfig {
    pub uid: String,
    pub cid: String,
    pub seid: String,
    pub kid: String,
    /// Upstream calls per second; 0 disables the limiter
    pub rate: u32,
    /// Cache TTL in minutes
    pub cache_expire: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub server: ServerConfig,
    pub drive: DriveConfig,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Basic auth credentials, when both halves are configured
    pub fn basic_auth(&self) -> Option<BasicCredentials> {
        if self.user.is_empty() || self.pwd.is_empty() {
            None
        } else {
            Some(BasicCredentials {
                user: self.user.clone(),
                pwd: self.pwd.clone(),
            })
        }
    }
}

impl DriveConfig {
    pub fn credential(&self) -> Credential {
        Credential {
            uid: self.uid.clone(),
            cid: self.cid.clone(),
            seid: self.seid.clone(),
            kid: self.kid.clone(),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_expire.saturating_mul(60))
    }
}

pub const CONFIG_FILE: &str = "config.yaml";

/// Optional `config.yaml` contents; every key may be omitted
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    server: FileServerConfig,
    drive: FileDriveConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileServerConfig {
    host: Option<String>,
    port: Option<u16>,
    #[serde(alias = "path")]
    base_path: Option<String>,
    user: Option<String>,
    pwd: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileDriveConfig {
    uid: Option<String>,
    cid: Option<String>,
    seid: Option<String>,
    kid: Option<String>,
    rate: Option<u32>,
    cache_expire: Option<u64>,
}

impl FileConfig {
    fn parse(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).map_err(|e| anyhow!("Invalid {}: {}", CONFIG_FILE, e))
    }

    /// Flattens the file into the environment variable names it stands in for
    fn into_vars(self) -> HashMap<String, String> {
        let server = self.server;
        let drive = self.drive;
        [
            ("SERVER_HOST", server.host),
            ("SERVER_PORT", server.port.map(|v| v.to_string())),
            ("SERVER_BASE_PATH", server.base_path),
            ("SERVER_USER", server.user),
            ("SERVER_PWD", server.pwd),
            ("DRIVE_UID", drive.uid),
            ("DRIVE_CID", drive.cid),
            ("DRIVE_SEID", drive.seid),
            ("DRIVE_KID", drive.kid),
            ("DRIVE_RATE", drive.rate.map(|v| v.to_string())),
            ("DRIVE_CACHE_EXPIRE", drive.cache_expire.map(|v| v.to_string())),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key.to_string(), v)))
        .collect()
    }
}

impl Config {
    /// Loads `<config_dir>/.env` and `<config_dir>/config.yaml` when present.
    ///
    /// Precedence is defaults, then the YAML file, then the environment.
    pub fn load(config_dir: &Path) -> Result<Self> {
        let env_file = config_dir.join(".env");
        if env_file.is_file() {
            dotenvy::from_path(&env_file)
                .map_err(|e| anyhow!("Failed to load {}: {}", env_file.display(), e))?;
            debug!(".env loaded from {}", env_file.display());
        }

        let config_file = config_dir.join(CONFIG_FILE);
        let file_vars = if config_file.is_file() {
            let contents = fs::read_to_string(&config_file)
                .map_err(|e| anyhow!("Failed to read {}: {}", config_file.display(), e))?;
            let vars = FileConfig::parse(&contents)?.into_vars();
            debug!("{} loaded from {}", CONFIG_FILE, config_file.display());
            vars
        } else {
            HashMap::new()
        };

        Self::from_lookup(|key| {
            env::var(key)
                .ok()
                // SERVER_PATH in the environment still beats the file's base_path
                .or_else(|| (key == "SERVER_BASE_PATH").then(|| env::var("SERVER_PATH").ok()).flatten())
                .or_else(|| file_vars.get(key).cloned())
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let base_path = lookup("SERVER_BASE_PATH")
            .or_else(|| lookup("SERVER_PATH"))
            .unwrap_or_else(|| "/dav".to_string());

        Ok(Config {
            server: ServerConfig {
                host: text("SERVER_HOST", "0.0.0.0"),
                port: parse_var(&lookup, "SERVER_PORT", 8090)?,
                base_path: base_path.trim_end_matches('/').to_string(),
                user: text("SERVER_USER", "user"),
                pwd: text("SERVER_PWD", "password"),
            },
            drive: DriveConfig {
                uid: text("DRIVE_UID", ""),
                cid: text("DRIVE_CID", ""),
                seid: text("DRIVE_SEID", ""),
                kid: text("DRIVE_KID", ""),
                rate: parse_var(&lookup, "DRIVE_RATE", 3)?,
                cache_expire: parse_var(&lookup, "DRIVE_CACHE_EXPIRE", 1)?,
            },
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("Invalid value for {}: {:?} ({})", key, raw, e)),
        _ => Ok(default),
    }
}
