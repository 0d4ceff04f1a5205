use http::{header::USER_AGENT, Method, Request};
use regex::Regex;

use crate::{PrerenderError, Result};

/// Agents that render JavaScript themselves or must see the live page.
pub const DEFAULT_DENIED_AGENTS: &str =
    r"(?i)google.*bot|bing|msnbot|yandexbot|pinterest.*ios|mail\.ru";

/// Generic crawler signatures and known link-preview agents.
pub const DEFAULT_ALLOWED_AGENTS: &str =
    r"(?i)bot|crawler|spider|archiver|pinterest|facebookexternalhit|flipboardproxy";

// A dot and a 2-4 char extension at the end of the path, query excluded.
const STATIC_PATH: &str = r"\.[^./?]{2,4}(?:\?.*)?$";

const ESCAPED_FRAGMENT: &str = "_escaped_fragment_";

/// The parts of a request the classifier looks at.
#[derive(Clone, Copy, Debug)]
pub struct ClassificationInput<'a> {
    pub method: &'a Method,
    /// Raw query string without the leading `?`.
    pub query: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub path: &'a str,
}

impl<'a> ClassificationInput<'a> {
    pub fn from_request<B>(request: &'a Request<B>) -> Self {
        Self {
            method: request.method(),
            query: request.uri().query(),
            user_agent: request
                .headers()
                .get(USER_AGENT)
                .and_then(|value| value.to_str().ok()),
            path: request.uri().path(),
        }
    }
}

/// Decides whether a request should be answered with a prerendered snapshot.
///
/// Rules, first match wins:
/// 1. methods other than GET and HEAD are never prerendered;
/// 2. an `_escaped_fragment_` query parameter always is;
/// 3. denied user agents are not;
/// 4. static file paths (`.js`, `.png`, `.html`, ...) are not;
/// 5. otherwise only allowed user agents are.
#[derive(Clone, Debug)]
pub struct Classifier {
    denied_agents: Regex,
    allowed_agents: Regex,
    static_path: Regex,
}

impl Classifier {
    /// Classifier with the built-in agent lists.
    pub fn new() -> Self {
        // built-in patterns are constants
        Self {
            denied_agents: Regex::new(DEFAULT_DENIED_AGENTS).expect("valid deny-list pattern"),
            allowed_agents: Regex::new(DEFAULT_ALLOWED_AGENTS).expect("valid allow-list pattern"),
            static_path: Regex::new(STATIC_PATH).expect("valid static path pattern"),
        }
    }

    /// Classifier with custom user-agent patterns. Patterns are matched as-is,
    /// prefix them with `(?i)` for case-insensitive matching.
    pub fn with_agent_patterns(denied: &str, allowed: &str) -> Result<Self> {
        Ok(Self {
            denied_agents: Regex::new(denied).map_err(PrerenderError::InvalidPattern)?,
            allowed_agents: Regex::new(allowed).map_err(PrerenderError::InvalidPattern)?,
            ..Self::new()
        })
    }

    pub fn decide(&self, input: &ClassificationInput<'_>) -> bool {
        if input.method != Method::GET && input.method != Method::HEAD {
            return false;
        }

        if input
            .query
            .is_some_and(|query| query.contains(ESCAPED_FRAGMENT))
        {
            return true;
        }

        let user_agent = input.user_agent.unwrap_or_default();
        if self.denied_agents.is_match(user_agent) {
            return false;
        }

        if self.static_path.is_match(input.path) {
            return false;
        }

        self.allowed_agents.is_match(user_agent)
    }

    pub fn is_prerender<B>(&self, request: &Request<B>) -> bool {
        self.decide(&ClassificationInput::from_request(request))
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}
