//! Route resolution against the configured origin.

use url::Url;

/// Error type for route resolution failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("route must start with '/': {0}")]
    RelativeRoute(String),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Resolve a route path against an origin.
///
/// 1. The route must be absolute (`/...`)
/// 2. The origin must be http or https
/// 3. Any path on the origin is replaced, not appended to
/// 4. Fragments are dropped
pub fn resolve_route(origin: &Url, route: &str) -> Result<Url, UrlError> {
    if !route.starts_with('/') {
        return Err(UrlError::RelativeRoute(route.to_string()));
    }

    match origin.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    let mut url = origin.join(route).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    url.set_fragment(None);

    Ok(url)
}
