//! Builds the request sent to the rendering service for an intercepted page.

use std::fmt;
use std::time::Duration;

use http::header::{
    HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, HOST, IF_MODIFIED_SINCE, IF_NONE_MATCH,
};
use http::Uri;

use crate::{ClientConfig, PrerenderError, Result};

/// Forwarding chain header.
pub static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Returns the path and query of `uri` without scheme, authority or
/// userinfo, always starting with `/`.
pub fn clean_path(uri: &Uri) -> String {
    let path = uri.path();
    let query = uri.query();
    let mut cleaned = String::with_capacity(path.len() + query.map_or(0, |q| q.len() + 2) + 1);

    if !path.starts_with('/') {
        cleaned.push('/');
    }
    cleaned.push_str(path);
    if let Some(query) = query {
        cleaned.push('?');
        cleaned.push_str(query);
    }
    cleaned
}

/// Prepends `server_ip` to the `X-Forwarded-For` chain found in `headers`.
///
/// Existing entries are kept as raw bytes, so values that are not visible
/// ASCII survive. Returns `None` only when `server_ip` is not a valid header
/// value.
pub fn forwarded_for(headers: &HeaderMap, server_ip: &str) -> Option<HeaderValue> {
    let mut chain = server_ip.as_bytes().to_vec();
    for value in headers.get_all(&X_FORWARDED_FOR) {
        let value = trim_whitespace(value.as_bytes());
        if !value.is_empty() {
            chain.extend_from_slice(b", ");
            chain.extend_from_slice(value);
        }
    }
    HeaderValue::from_bytes(&chain).ok()
}

fn trim_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |last| last + 1);
    &bytes[start..end]
}

/// Turns an inbound request into the outbound `GET {server}/{token}{path}`.
#[derive(Clone)]
pub struct UpstreamRequestBuilder {
    base_url: String,
    server_ip: String,
    unconditional_fetch: bool,
    fetch_timeout: Option<Duration>,
}

impl fmt::Debug for UpstreamRequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamRequestBuilder")
            .field("base_url", &"<redacted>")
            .field("server_ip", &self.server_ip)
            .field("unconditional_fetch", &self.unconditional_fetch)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish()
    }
}

impl UpstreamRequestBuilder {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            base_url: format!(
                "{}/{}",
                config.server.trim().trim_end_matches('/'),
                config.token.trim()
            ),
            server_ip: config.server_ip.trim().to_owned(),
            unconditional_fetch: config.unconditional_fetch,
            fetch_timeout: (config.fetch_timeout_ms > 0)
                .then(|| Duration::from_millis(config.fetch_timeout_ms)),
        }
    }

    pub fn url(&self, uri: &Uri) -> String {
        format!("{}{}", self.base_url, clean_path(uri))
    }

    /// Copies the inbound headers and extends the forwarding chain. `Host`
    /// and `Content-Length` describe the inbound hop and are not copied.
    pub fn headers(&self, original: &HeaderMap) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(original.len() + 1);
        for (name, value) in original {
            if name == HOST || name == CONTENT_LENGTH || name == X_FORWARDED_FOR {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }

        if let Some(value) = forwarded_for(original, &self.server_ip) {
            headers.insert(X_FORWARDED_FOR.clone(), value);
        }

        if self.unconditional_fetch {
            headers.remove(IF_MODIFIED_SINCE);
            headers.remove(IF_NONE_MATCH);
        }
        headers
    }

    pub fn build(
        &self,
        http: &reqwest::Client,
        uri: &Uri,
        headers: &HeaderMap,
    ) -> Result<reqwest::Request> {
        let mut request = http.get(self.url(uri)).headers(self.headers(headers));
        if let Some(timeout) = self.fetch_timeout {
            request = request.timeout(timeout);
        }
        request.build().map_err(PrerenderError::Transport)
    }
}
