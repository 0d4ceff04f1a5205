//! Request entry points: the standalone handler and the tower layer.
//!
//! [`PrerenderClient`] is itself a tower service. Requests it does not
//! prerender go to [`ClientConfig::next`](crate::ClientConfig::next), or get a
//! 500 when none is configured. [`PrerenderLayer`] instead hands them to the
//! service it wraps, which is how the crate mounts in front of an axum app:
//!
//! ```no_run
//! use axum::{routing::get, Router};
//! use seo4ajax_http::{ClientConfig, PrerenderClient, PrerenderLayer};
//!
//! # fn app() -> seo4ajax_http::Result<Router> {
//! let client = PrerenderClient::new(ClientConfig::new("my-site-token"))?;
//! let app = Router::new()
//!     .route("/", get(|| async { "live page" }))
//!     .layer(PrerenderLayer::new(client));
//! # Ok(app)
//! # }
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::task::{Context, Poll};

use async_trait::async_trait;
use axum::body::Body;
use futures_util::future::BoxFuture;
use http::{Request, Response, StatusCode};
use tower::{Layer, Service, ServiceExt};

use crate::client::plain_response;
use crate::PrerenderClient;

/// Handles requests that are not prerendered.
#[async_trait]
pub trait NextHandler: Send + Sync {
    async fn handle(&self, request: Request<Body>) -> Response<Body>;
}

/// [`NextHandler`] backed by a cloneable tower service, e.g. an axum `Router`.
#[derive(Clone, Debug)]
pub struct ServiceHandler<S> {
    service: S,
}

impl<S> ServiceHandler<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> NextHandler for ServiceHandler<S>
where
    S: Service<Request<Body>, Response = Response<Body>, Error = Infallible>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send,
{
    async fn handle(&self, request: Request<Body>) -> Response<Body> {
        match self.service.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        }
    }
}

/// [`NextHandler`] backed by an async function.
#[derive(Clone, Copy, Debug)]
pub struct HandlerFn<F> {
    f: F,
}

pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync,
    Fut: Future<Output = Response<Body>> + Send,
{
    HandlerFn { f }
}

#[async_trait]
impl<F, Fut> NextHandler for HandlerFn<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync,
    Fut: Future<Output = Response<Body>> + Send,
{
    async fn handle(&self, request: Request<Body>) -> Response<Body> {
        (self.f)(request).await
    }
}

impl PrerenderClient {
    /// Serves `request`: prerendered when it qualifies, otherwise passed to
    /// the configured next handler.
    pub async fn handle(&self, request: Request<Body>) -> Response<Body> {
        let prerender = self.is_prerender(&request);

        #[cfg(feature = "tracing")]
        tracing::debug!(path = %request.uri().path(), prerender, "classified request");

        if prerender {
            return self.fetch(request).await;
        }
        match self.next() {
            Some(next) => next.handle(request).await,
            None => plain_response(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

impl Service<Request<Body>> for PrerenderClient {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let client = self.clone();
        Box::pin(async move { Ok::<_, Infallible>(client.handle(request).await) })
    }
}

/// Wraps a service so crawler requests are answered by the rendering service
/// and everything else reaches the wrapped service untouched.
#[derive(Clone, Debug)]
pub struct PrerenderLayer {
    client: PrerenderClient,
}

impl PrerenderLayer {
    pub fn new(client: PrerenderClient) -> Self {
        Self { client }
    }
}

impl<S> Layer<S> for PrerenderLayer {
    type Service = Prerender<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Prerender {
            client: self.client.clone(),
            inner,
        }
    }
}

/// Service produced by [`PrerenderLayer`].
#[derive(Clone, Debug)]
pub struct Prerender<S> {
    client: PrerenderClient,
    inner: S,
}

impl<S> Service<Request<Body>> for Prerender<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let prerender = self.client.is_prerender(&request);

        #[cfg(feature = "tracing")]
        tracing::debug!(path = %request.uri().path(), prerender, "classified request");

        if prerender {
            let page = self.client.fetch(request);
            return Box::pin(async move { Ok::<_, S::Error>(page.await) });
        }

        // the clone is not ready; keep it and call the one that was polled
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move { inner.call(request).await })
    }
}
