//! Endpoint URL construction for backend base URLs.

/// Strip trailing slashes so endpoints can be appended safely.
///
/// ```
/// use arcdesk::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://127.0.0.1:11434/"), "http://127.0.0.1:11434");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path with exactly one slash.
///
/// Local servers are often configured with their OpenAI-style `/v1` prefix
/// already in the base URL; an endpoint that repeats that prefix is joined
/// without doubling it.
///
/// ```
/// use arcdesk::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://127.0.0.1:1234/v1", "v1/chat/completions"),
///     "http://127.0.0.1:1234/v1/chat/completions"
/// );
/// assert_eq!(
///     construct_api_url("http://127.0.0.1:11434/", "/api/chat"),
///     "http://127.0.0.1:11434/api/chat"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let mut endpoint = endpoint.trim_start_matches('/');
    if normalized_base.ends_with("/v1") {
        if let Some(rest) = endpoint.strip_prefix("v1/") {
            endpoint = rest;
        }
    }
    format!("{normalized_base}/{endpoint}")
}
