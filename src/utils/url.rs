//! Endpoint construction helpers.

/// Join a base URL and an endpoint path without doubling slashes.
///
/// ```
/// use mcpchat::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://localhost:11434/v1/", "/chat/completions"),
///     "http://localhost:11434/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let endpoint = endpoint.trim_start_matches('/');
    format!("{base}/{endpoint}")
}

/// Replace the whole path of `base_url` with `path`, dropping query and fragment.
///
/// Ollama serves its OpenAI-compatible API under `/v1` but lists local models
/// at the server root (`/api/tags`).
///
/// ```
/// use mcpchat::utils::url::replace_path;
///
/// assert_eq!(
///     replace_path("http://host.docker.internal:11434/v1", "/api/tags"),
///     "http://host.docker.internal:11434/api/tags"
/// );
/// ```
pub fn replace_path(base_url: &str, path: &str) -> String {
    let authority_start = base_url.find("://").map(|pos| pos + 3).unwrap_or(0);
    let authority_end = base_url[authority_start..]
        .find(['/', '?', '#'])
        .map(|pos| authority_start + pos)
        .unwrap_or(base_url.len());
    let origin = &base_url[..authority_end];
    format!("{}/{}", origin, path.trim_start_matches('/'))
}
