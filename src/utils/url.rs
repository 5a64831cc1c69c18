//! URL helpers for addressing the inference backend
//!
//! The backend base URL comes from configuration and may carry trailing
//! slashes; endpoint paths are written with or without a leading slash.
//! These helpers keep the joined URLs free of doubled separators.

/// Default address of the inference backend.
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";

/// Normalize a base URL by removing trailing slashes
///
/// # Examples
///
/// ```
/// use spacechat::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://127.0.0.1:8000/"), "http://127.0.0.1:8000");
/// assert_eq!(normalize_base_url("http://127.0.0.1:8000"), "http://127.0.0.1:8000");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Join a backend base URL and an endpoint path
///
/// # Examples
///
/// ```
/// use spacechat::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://127.0.0.1:8000/", "/api/chat"),
///     "http://127.0.0.1:8000/api/chat"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

/// Build an endpoint path with one caller-supplied id segment.
///
/// Ids are generated locally or loaded from the backend, so anything outside
/// the unreserved URL character set is percent-encoded before it lands in the
/// path.
pub fn id_endpoint(prefix: &str, id: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), urlencoding::encode(id))
}
