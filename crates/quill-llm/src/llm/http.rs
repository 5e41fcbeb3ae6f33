//! Request plumbing shared by the adapters: endpoint composition, header
//! merging, dispatch and status/JSON checks.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder, Response, Url};
use serde::de::DeserializeOwned;

use super::error::{LlmError, Result};
use super::types::redact_in;

/// Max characters of an error body copied into a log line
const MAX_LOGGED_BODY: usize = 512;

/// Build the HTTP client the adapters share.
///
/// `read_timeout` bounds the silence between two reads, not the whole
/// exchange, so a stream that keeps delivering chunks is never cut off.
pub fn build_client(read_timeout: Duration, connect_timeout: Duration) -> reqwest::Result<Client> {
    ClientBuilder::new()
        .read_timeout(read_timeout)
        .connect_timeout(connect_timeout)
        .build()
}

/// Strip surrounding whitespace and every trailing `/` from a base URL.
pub fn normalize_base_url(base_url: &str) -> &str {
    base_url.trim().trim_end_matches('/')
}

/// Join a base URL and an endpoint path into an absolute http(s) URL.
///
/// Whitespace or control characters anywhere in the composed string make it
/// invalid; the URL parser would otherwise percent-encode them silently.
pub fn endpoint(base_url: &str, path: &str) -> Result<Url> {
    let raw = format!("{}{}", normalize_base_url(base_url), path);
    if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(LlmError::InvalidUrl);
    }

    let url = Url::parse(&raw).map_err(|_| LlmError::InvalidUrl)?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(url),
        _ => Err(LlmError::InvalidUrl),
    }
}

/// Set a credential header marked sensitive. A value a header cannot carry
/// is left out, and the vendor answers with its own auth error.
pub(crate) fn insert_secret(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(mut value) => {
            value.set_sensitive(true);
            headers.insert(name, value);
        }
        Err(_) => tracing::warn!(header = %name, "Credential is not a valid header value, omitted"),
    }
}

/// Merge caller-supplied headers without replacing any header already set.
///
/// Names compare case-insensitively and are visited in sorted order, so of
/// two spellings of one name the first in byte order wins. Invalid pairs are
/// dropped with a warning.
pub(crate) fn merge_custom_headers(headers: &mut HeaderMap, custom: &HashMap<String, String>) {
    let mut custom: Vec<_> = custom.iter().collect();
    custom.sort_unstable_by(|a, b| a.0.cmp(b.0));

    for (name, value) in custom {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            tracing::warn!(header = %name, "Skipping custom header with invalid name");
            continue;
        };
        if headers.contains_key(&name) {
            tracing::debug!(header = %name, "Header already set, custom value ignored");
            continue;
        }
        match HeaderValue::from_str(value) {
            Ok(value) => {
                headers.insert(name, value);
            }
            Err(_) => tracing::warn!(header = %name, "Skipping custom header with invalid value"),
        }
    }
}

/// Dispatch a request and enforce the `[200, 299)` status window.
///
/// `secret` is scrubbed from anything logged.
pub(crate) async fn execute(
    client: &Client,
    request: reqwest::Request,
    secret: &str,
) -> Result<Response> {
    let path = request.url().path().to_string();
    tracing::debug!(method = %request.method(), path = %path, "Dispatching LLM request");

    let response = client.execute(request).await.map_err(|e| {
        tracing::warn!(
            path = %path,
            error = %e.without_url(),
            "LLM request failed before a response arrived"
        );
        LlmError::InvalidResponse
    })?;

    let status = response.status().as_u16();
    if !(200..299).contains(&status) {
        let body = response.text().await.unwrap_or_default();
        let body = truncate(&redact_in(&body, secret), MAX_LOGGED_BODY);
        tracing::warn!(status, path = %path, body = %body, "LLM provider returned an error status");
        return Err(LlmError::BadResponse(status));
    }

    Ok(response)
}

/// Read a whole body and decode it as `T`.
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = response.bytes().await.map_err(|e| {
        tracing::warn!(error = %e.without_url(), "Failed reading LLM response body");
        LlmError::InvalidResponse
    })?;

    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::debug!(
            error = %e,
            body = %truncate(&String::from_utf8_lossy(&bytes), MAX_LOGGED_BODY),
            "LLM response did not match the expected shape"
        );
        LlmError::InvalidResponse
    })
}

/// Reject absent or empty text.
pub(crate) fn require_text(text: Option<String>) -> Result<String> {
    match text {
        Some(text) if !text.is_empty() => Ok(text),
        _ => Err(LlmError::InvalidResponse),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
