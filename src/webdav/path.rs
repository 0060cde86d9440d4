use crate::errors::DavError;
use crate::fs::clean_path;

/// Normalizes a configured base path: leading `/`, no trailing `/`, and the
/// empty string for the root.
pub fn normalize_base_path(base: &str) -> String {
    let cleaned = clean_path(base);
    if cleaned == "/" {
        String::new()
    } else {
        cleaned
    }
}

/// Maps a raw request path to a path inside the exposed tree.
///
/// The path must be the base itself or lie below it; percent-escapes are
/// decoded before matching.
pub fn strip_base(base: &str, raw_path: &str) -> Result<String, DavError> {
    let decoded = urlencoding::decode(raw_path)
        .map_err(|_| DavError::BadPath(raw_path.to_string()))?;

    if base.is_empty() {
        return Ok(clean_path(&decoded));
    }

    match decoded.strip_prefix(base) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => Ok(clean_path(rest)),
        _ => Err(DavError::BadPath(decoded.into_owned())),
    }
}

/// Absolute, base-prefixed, percent-encoded href for an entity.
/// Directories other than `/` get a trailing separator.
pub fn to_href(base: &str, path: &str, is_dir: bool) -> String {
    let full = clean_path(&format!("{}/{}", base, path));

    let mut href = full
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    if href.is_empty() {
        href.push('/');
    }

    if is_dir && href != "/" {
        href.push('/');
    }
    href
}
