//! Authentication headers for provider requests.

/// Attach bearer authentication. Local providers such as Ollama accept any
/// token, so a blank key sends no header at all.
pub fn add_auth_headers(request: reqwest::RequestBuilder, api_key: &str) -> reqwest::RequestBuilder {
    let api_key = api_key.trim();
    if api_key.is_empty() {
        return request;
    }
    request.header("Authorization", format!("Bearer {api_key}"))
}
