use std::time::Duration;

use reqwest::StatusCode;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum PrerenderError {
    /// The client was configured without an API token.
    #[error("no token given")]
    MissingToken,
    /// `server_ip` is set but is not an IP address.
    #[error("invalid server ip address: {0}")]
    InvalidServerIp(String),
    /// The rendering service base URL cannot be parsed.
    #[error("invalid prerender server url: {0}")]
    InvalidServer(String),
    /// The fallback status is not a valid HTTP status code.
    #[error("invalid fallback status code: {0}")]
    InvalidStatusCode(u16),
    /// A custom classifier pattern does not compile.
    #[error("invalid user-agent pattern: {0}")]
    InvalidPattern(regex::Error),
    /// The underlying HTTP client could not be built.
    #[error("http client error: {0}")]
    Client(reqwest::Error),
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// The rendering service rejected the token.
    #[error("token rejected by prerender service ({status})")]
    Unauthorized { status: StatusCode },
    /// Page not rendered yet (503) or unknown to the service (404).
    #[error("page not ready on prerender service ({status})")]
    NotReady { status: StatusCode },
    /// Any status the fetcher has no rule for.
    #[error("unexpected status from prerender service: {status}")]
    UnexpectedStatus { status: StatusCode },
    /// The retry budget ran out before a terminal response arrived.
    #[error("gave up after {attempts} attempts in {elapsed:?}: {last}")]
    RetriesExhausted {
        attempts: u32,
        elapsed: Duration,
        #[source]
        last: Box<PrerenderError>,
    },
    /// Body stream failed after the response was committed.
    #[error("stream error: {0}")]
    Stream(reqwest::Error),
}

impl PrerenderError {
    /// Returns `true` for errors raised while building a client.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingToken
                | Self::InvalidServerIp(_)
                | Self::InvalidServer(_)
                | Self::InvalidStatusCode(_)
                | Self::InvalidPattern(_)
                | Self::Client(_)
        )
    }
}
