//! `seo4ajax-http` serves prerendered pages from SEO4Ajax to crawlers.
//!
//! Each request is classified first:
//! - [`Classifier`] decides whether the requester is a crawler or link-preview
//!   bot that needs a rendered snapshot;
//! - [`PrerenderClient::fetch`] fetches that snapshot, retrying with
//!   exponential backoff, and streams it back;
//! - [`PrerenderClient::handle`] and [`PrerenderLayer`] wire both into an HTTP
//!   service, handing live traffic to the next handler.

mod classifier;
mod client;
mod config;
mod error;
mod middleware;
pub mod retry;
mod upstream;

pub use classifier::{
    ClassificationInput, Classifier, DEFAULT_ALLOWED_AGENTS, DEFAULT_DENIED_AGENTS,
};
pub use client::PrerenderClient;
pub use config::{ClientConfig, DEFAULT_SERVER};
pub use error::PrerenderError;
pub use middleware::{handler_fn, HandlerFn, NextHandler, Prerender, PrerenderLayer, ServiceHandler};
pub use retry::{BackoffPolicy, Outcome};
pub use upstream::{clean_path, forwarded_for, UpstreamRequestBuilder, X_FORWARDED_FOR};

pub type Result<T> = std::result::Result<T, PrerenderError>;
