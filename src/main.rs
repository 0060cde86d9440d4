use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use drive_webdav::{
    config::Config,
    drive::{Drive, DriveApi, Endpoints, Pan115Client},
    server,
    webdav::DavHandler,
};

#[derive(Parser, Debug)]
#[command(name = "drive-webdav", version, about = "Read-only WebDAV server for a 115 cloud drive")]
struct Args {
    /// Directory holding the optional .env file
    #[arg(short, long, default_value = "./")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = Args::parse();
    let config = Config::load(&args.config).context("load config failed")?;

    let api = Pan115Client::new(&config.drive.credential(), Endpoints::default())
        .context("create drive client failed")?;
    // Never serve without an authenticated session
    api.login_check().await.context("drive login failed")?;

    let drive = Drive::from_config(Arc::new(api), &config.drive).context("create drive failed")?;
    let handler = Arc::new(DavHandler::new(Arc::new(drive), &config.server.base_path));
    let app = server::router(handler.clone(), config.server.basic_auth());

    let address = config.server.address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("bind {} failed", address))?;
    info!(path = %handler.base_path(), addr = %address, "webdav serve");

    server::serve(listener, app).await.context("webdav serve failed")
}
