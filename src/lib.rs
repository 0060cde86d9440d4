pub mod cache;
pub mod config;
pub mod drive;
pub mod errors;
pub mod fs;
pub mod proxy;
pub mod rate_limit;
pub mod server;
pub mod webdav;

pub use errors::{DavError, DavResult};
pub use fs::{FileSystem, Info};
