use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::{BackoffPolicy, NextHandler};

/// Default rendering service.
pub const DEFAULT_SERVER: &str = "http://api.seo4ajax.com";

/// Configures the prerender client.
///
/// Every field except `token` has a default; a client built without a token
/// fails with [`PrerenderError::MissingToken`](crate::PrerenderError::MissingToken).
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Rendering service base URL.
    pub server: String,
    /// Site token issued by the rendering service.
    pub token: String,
    /// Address prepended to `X-Forwarded-For`.
    pub server_ip: String,
    /// Total time in milliseconds spent retrying one page. `0` retries forever.
    pub retry_budget_ms: u64,
    /// Per-attempt timeout in milliseconds. `0` disables it.
    pub fetch_timeout_ms: u64,
    /// Drop `If-Modified-Since` and `If-None-Match` before forwarding.
    pub unconditional_fetch: bool,
    /// Keep retrying on 503 and 404 instead of failing fast.
    pub retry_unavailable: bool,
    /// Status sent when no rendered page could be obtained.
    pub status_code: u16,
    pub backoff: BackoffPolicy,
    /// Handler for requests that are not prerendered.
    #[serde(skip)]
    pub next: Option<Arc<dyn NextHandler>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_owned(),
            token: String::new(),
            server_ip: "127.0.0.1".to_owned(),
            retry_budget_ms: 30_000,
            fetch_timeout_ms: 10_000,
            unconditional_fetch: false,
            retry_unavailable: false,
            status_code: 503,
            backoff: BackoffPolicy::default(),
            next: None,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server", &self.server)
            .field("token", &"<redacted>")
            .field("server_ip", &self.server_ip)
            .field("retry_budget_ms", &self.retry_budget_ms)
            .field("fetch_timeout_ms", &self.fetch_timeout_ms)
            .field("unconditional_fetch", &self.unconditional_fetch)
            .field("retry_unavailable", &self.retry_unavailable)
            .field("status_code", &self.status_code)
            .field("backoff", &self.backoff)
            .field("next", &self.next.is_some())
            .finish()
    }
}

/// Whole milliseconds in `duration`, rounded up so a non-zero duration never
/// becomes the `0` sentinel. Saturates at `u64::MAX`.
fn duration_ms(duration: Duration) -> u64 {
    let millis = duration.as_millis().max(u128::from(!duration.is_zero()));
    u64::try_from(millis).unwrap_or(u64::MAX)
}

impl ClientConfig {
    /// Default configuration for the site identified by `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Self::default()
        }
    }

    /// Sets the rendering service base URL.
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    /// Sets the address prepended to `X-Forwarded-For`.
    pub fn with_server_ip(mut self, server_ip: impl Into<String>) -> Self {
        self.server_ip = server_ip.into();
        self
    }

    /// Sets the total retry time. [`Duration::ZERO`] retries forever.
    pub fn with_retry_budget(mut self, budget: Duration) -> Self {
        self.retry_budget_ms = duration_ms(budget);
        self
    }

    /// Sets the per-attempt timeout. [`Duration::ZERO`] disables it.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = duration_ms(timeout);
        self
    }

    /// Drops cache validators from the forwarded request when `enabled`.
    pub fn with_unconditional_fetch(mut self, enabled: bool) -> Self {
        self.unconditional_fetch = enabled;
        self
    }

    /// Retries 503 and 404 answers when `enabled`.
    pub fn with_retry_unavailable(mut self, enabled: bool) -> Self {
        self.retry_unavailable = enabled;
        self
    }

    /// Sets the status sent when no rendered page could be obtained.
    pub fn with_status_code(mut self, status: u16) -> Self {
        self.status_code = status;
        self
    }

    /// Replaces the backoff policy.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the handler for requests that are not prerendered.
    pub fn with_next(mut self, next: impl NextHandler + 'static) -> Self {
        self.next = Some(Arc::new(next));
        self
    }

    /// Retry budget as a [`Duration`].
    pub fn retry_budget(&self) -> Duration {
        Duration::from_millis(self.retry_budget_ms)
    }
}
