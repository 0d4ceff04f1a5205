use std::fmt;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use futures_util::{stream, StreamExt, TryStreamExt};
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, LOCATION};
use http::{request::Parts, Request, Response, StatusCode};
use reqwest::redirect;

use crate::{
    retry::{self, Outcome},
    BackoffPolicy, Classifier, ClientConfig, NextHandler, PrerenderError, Result,
    UpstreamRequestBuilder,
};

// Connection-level headers of the upstream hop.
const HOP_BY_HOP: [&str; 7] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

static X_CONTENT_TYPE_OPTIONS: HeaderName = HeaderName::from_static("x-content-type-options");

#[derive(Clone)]
/// Client for the SEO4Ajax rendering service.
///
/// Cheap to clone; clones share the connection pool and configuration.
pub struct PrerenderClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    upstream: UpstreamRequestBuilder,
    classifier: Classifier,
    backoff: BackoffPolicy,
    retry_budget: Duration,
    retry_unavailable: bool,
    fallback_status: StatusCode,
    next: Option<Arc<dyn NextHandler>>,
}

impl fmt::Debug for PrerenderClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrerenderClient")
            .field("upstream", &self.inner.upstream)
            .field("backoff", &self.inner.backoff)
            .field("retry_budget", &self.inner.retry_budget)
            .field("retry_unavailable", &self.inner.retry_unavailable)
            .field("fallback_status", &self.inner.fallback_status)
            .field("next", &self.inner.next.is_some())
            .finish()
    }
}

impl PrerenderClient {
    /// Creates a client with the built-in crawler lists.
    ///
    /// Fails when the token is empty, `server_ip` is not an IP address,
    /// `server` is not an http(s) URL, or `status_code` is out of range.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_classifier(config, Classifier::new())
    }

    pub fn with_classifier(config: ClientConfig, classifier: Classifier) -> Result<Self> {
        if config.token.trim().is_empty() {
            return Err(PrerenderError::MissingToken);
        }

        let server_ip = config.server_ip.trim();
        if server_ip.parse::<IpAddr>().is_err() {
            return Err(PrerenderError::InvalidServerIp(server_ip.to_owned()));
        }

        let server = reqwest::Url::parse(config.server.trim())
            .map_err(|err| PrerenderError::InvalidServer(format!("{}: {err}", config.server)))?;
        if !matches!(server.scheme(), "http" | "https") {
            return Err(PrerenderError::InvalidServer(config.server.clone()));
        }

        let fallback_status = StatusCode::from_u16(config.status_code)
            .map_err(|_| PrerenderError::InvalidStatusCode(config.status_code))?;

        // Redirects are relayed to the crawler, never followed.
        let http = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .build()
            .map_err(PrerenderError::Client)?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                upstream: UpstreamRequestBuilder::new(&config),
                classifier,
                backoff: config.backoff,
                retry_budget: config.retry_budget(),
                retry_unavailable: config.retry_unavailable,
                fallback_status,
                next: config.next,
            }),
        })
    }

    pub fn classifier(&self) -> &Classifier {
        &self.inner.classifier
    }

    pub(crate) fn next(&self) -> Option<&Arc<dyn NextHandler>> {
        self.inner.next.as_ref()
    }

    /// Returns `true` when `request` should be answered with a rendered page.
    pub fn is_prerender<B>(&self, request: &Request<B>) -> bool {
        self.inner.classifier.is_prerender(request)
    }

    /// Fetches the rendered page for `request` and turns it into the response
    /// for the original caller.
    ///
    /// Never fails: when no page can be obtained the response carries the
    /// configured fallback status. A 200 body is streamed as it arrives, so an
    /// upstream error after that point only truncates the body.
    pub fn fetch<B>(&self, request: Request<B>) -> impl Future<Output = Response<Body>> + Send {
        let (parts, _body) = request.into_parts();
        let client = self.clone();
        async move { client.fetch_parts(&parts).await }
    }

    async fn fetch_parts(&self, parts: &Parts) -> Response<Body> {
        let inner = &self.inner;
        let result = retry::retry(inner.backoff, inner.retry_budget, move |attempt| {
            self.attempt(parts, attempt)
        })
        .await;

        match result {
            Ok(response) => response,
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    path = %parts.uri.path(),
                    error = %err,
                    "failed to fetch prerendered page"
                );
                #[cfg(not(feature = "tracing"))]
                let _ = err;

                plain_response(inner.fallback_status)
            }
        }
    }

    async fn attempt(&self, parts: &Parts, attempt: u32) -> Outcome<Response<Body>> {
        let inner = &self.inner;
        let request = match inner.upstream.build(&inner.http, &parts.uri, &parts.headers) {
            Ok(request) => request,
            // a request that does not build now never will
            Err(err) => return Outcome::Permanent(err),
        };

        match inner.http.execute(request).await {
            Ok(response) => self.interpret(response, parts.uri.path(), attempt).await,
            Err(err) => Outcome::Transient(PrerenderError::Transport(err)),
        }
    }

    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    async fn interpret(
        &self,
        response: reqwest::Response,
        path: &str,
        attempt: u32,
    ) -> Outcome<Response<Body>> {
        let status = response.status();

        #[cfg(feature = "tracing")]
        tracing::debug!(attempt, status = status.as_u16(), "prerender service responded");

        match status {
            StatusCode::OK => relay_page(response, path).await,
            StatusCode::FOUND => Outcome::Success(relay_redirect(response.headers())),
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::NOT_FOUND => {
                let err = PrerenderError::NotReady { status };
                if self.inner.retry_unavailable {
                    Outcome::Transient(err)
                } else {
                    Outcome::Permanent(err)
                }
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Outcome::Transient(PrerenderError::Unauthorized { status })
            }
            status => Outcome::Transient(PrerenderError::UnexpectedStatus { status }),
        }
    }
}

/// Commits to the rendered page only once its first chunk (or a clean empty
/// body) has arrived. Failures before that point are retryable.
#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
async fn relay_page(response: reqwest::Response, path: &str) -> Outcome<Response<Body>> {
    let mut headers = HeaderMap::with_capacity(response.headers().len());
    for (name, value) in response.headers() {
        if !HOP_BY_HOP.contains(&name.as_str()) {
            headers.append(name.clone(), value.clone());
        }
    }

    let mut upstream = Box::pin(response.bytes_stream());
    let first = match upstream.try_next().await {
        Ok(first) => first,
        Err(err) => return Outcome::Transient(PrerenderError::Transport(err)),
    };

    #[cfg(feature = "tracing")]
    let path = path.to_owned();
    let rest = upstream.map_err(move |err| {
        #[cfg(feature = "tracing")]
        tracing::warn!(path = %path, error = %err, "prerendered page stream interrupted");
        PrerenderError::Stream(err)
    });
    let body = stream::iter(first.map(Ok)).chain(rest);

    let mut relayed = Response::new(Body::from_stream(body));
    *relayed.headers_mut() = headers;
    Outcome::Success(relayed)
}

fn relay_redirect(headers: &HeaderMap) -> Response<Body> {
    let mut relayed = Response::new(Body::empty());
    *relayed.status_mut() = StatusCode::FOUND;
    if let Some(location) = headers.get(LOCATION) {
        relayed.headers_mut().insert(LOCATION, location.clone());
    }
    relayed
}

/// Plain-text response carrying the canonical reason of `status`.
pub(crate) fn plain_response(status: StatusCode) -> Response<Body> {
    let reason = status.canonical_reason().unwrap_or("Error");
    let mut response = Response::new(Body::from(format!("{reason}\n")));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
        .headers_mut()
        .insert(X_CONTENT_TYPE_OPTIONS.clone(), HeaderValue::from_static("nosniff"));
    response
}
