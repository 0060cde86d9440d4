// WebDAV protocol surface: method dispatch, paths, multistatus XML

pub mod handler;
pub mod path;
pub mod xml;

pub use handler::{dav_handler, etag_for, http_date, DavHandler, ALLOWED_METHODS};
pub use path::{normalize_base_path, strip_base, to_href};
