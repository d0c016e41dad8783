//! Cookie boundary for affinity tokens.
//!
//! Translates between HTTP header metadata and the token the selection
//! core works with: reads the configured cookie out of inbound `Cookie`
//! headers and renders the outbound `Set-Cookie` directive. Pure
//! translation; what an empty or missing token means is decided upstream.

use http::header::{HeaderMap, HeaderValue, COOKIE, SET_COOKIE};

use crate::config::StickyConfig;

/// Renders and parses the affinity cookie under one configured policy.
///
/// Attributes are fixed at construction from [`StickyConfig`]; per-request
/// calls only supply the token.
#[derive(Debug, Clone)]
pub struct StickyCookie {
    name: String,
    domain: Option<String>,
    path: String,
    max_age: Option<u64>,
}

impl StickyCookie {
    /// Creates a new adapter with the configured cookie attributes.
    pub fn new(config: &StickyConfig) -> Self {
        Self {
            name: config.cookie_name.clone(),
            domain: config.cookie_domain.clone(),
            path: config.cookie_path.clone(),
            max_age: config.cookie_max_age,
        }
    }

    /// The configured cookie name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Extracts the affinity token from a request's headers, if present.
    ///
    /// Requests can legitimately carry several `Cookie` headers; all are
    /// scanned in order and the first pair with the configured name wins.
    /// Header lines that are not valid UTF-8 are skipped. An empty value
    /// comes back as `Some("")`, distinct from a missing cookie.
    pub fn inbound<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        for header in headers.get_all(COOKIE) {
            let raw = match header.to_str() {
                Ok(raw) => raw,
                Err(_) => continue,
            };
            for pair in raw.split(';') {
                if let Some(rest) = pair.trim().strip_prefix(self.name.as_str()) {
                    if let Some(value) = rest.strip_prefix('=') {
                        return Some(value);
                    }
                }
            }
        }
        None
    }

    /// Renders the full `Set-Cookie` value for a freshly issued token.
    ///
    /// Attributes come out in a fixed order: value, `Domain` when
    /// configured, `Path`, then `Max-Age` when a lifetime is set.
    /// Without `Max-Age` the cookie lives for the browser session.
    pub fn outbound(&self, token: &str) -> String {
        let mut directive = format!("{}={}", self.name, token);
        if let Some(domain) = &self.domain {
            directive.push_str("; Domain=");
            directive.push_str(domain);
        }
        directive.push_str("; Path=");
        directive.push_str(&self.path);
        if let Some(max_age) = self.max_age {
            directive.push_str("; Max-Age=");
            directive.push_str(&max_age.to_string());
        }
        directive
    }

    /// Renders the outbound directive as a header value, if legal.
    ///
    /// `None` means the cookie is dropped (with a warn log) and the
    /// response must go out without affinity; an illegal directive never
    /// fails a response.
    pub fn header_value(&self, token: &str) -> Option<HeaderValue> {
        match HeaderValue::from_str(&self.outbound(token)) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "affinity cookie dropped: not a legal header value");
                None
            }
        }
    }

    /// Appends the outbound directive to a response header map.
    ///
    /// Returns false and leaves the map untouched when the rendered
    /// directive is not a legal header value; the response still goes out,
    /// just without affinity.
    pub fn append_to(&self, headers: &mut HeaderMap, token: &str) -> bool {
        match self.header_value(token) {
            Some(value) => {
                headers.append(SET_COOKIE, value);
                true
            }
            None => false,
        }
    }
}
