//! Access to the transport request that carried a batch.
//!
//! Parameters declared with a non-body [`ParamSource`](crate::ParamSource)
//! are resolved through this seam so the binder stays independent of any
//! particular transport.

use std::collections::HashMap;

/// Read-only view of the enclosing transport request.
#[cfg_attr(test, mockall::automock)]
pub trait TransportContext: Send + Sync {
    /// Header value; lookups are case-insensitive.
    fn header_value(&self, name: &str) -> Option<String>;
    /// Cookie value.
    fn cookie_value(&self, name: &str) -> Option<String>;
    /// Query-string value.
    fn query_value(&self, name: &str) -> Option<String>;
}

/// Context for transports that carry no headers, cookies or query values.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTransport;

impl TransportContext for NoTransport {
    fn header_value(&self, _name: &str) -> Option<String> {
        None
    }

    fn cookie_value(&self, _name: &str) -> Option<String> {
        None
    }

    fn query_value(&self, _name: &str) -> Option<String> {
        None
    }
}

/// Context backed by in-memory maps.
#[derive(Debug, Default, Clone)]
pub struct StaticTransport {
    headers: HashMap<String, String>,
    cookies: HashMap<String, String>,
    query: HashMap<String, String>,
}

impl StaticTransport {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Adds a cookie.
    #[must_use]
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Adds a query-string value.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }
}

impl TransportContext for StaticTransport {
    fn header_value(&self, name: &str) -> Option<String> {
        self.headers.get(&name.to_ascii_lowercase()).cloned()
    }

    fn cookie_value(&self, name: &str) -> Option<String> {
        self.cookies.get(name).cloned()
    }

    fn query_value(&self, name: &str) -> Option<String> {
        self.query.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let transport = StaticTransport::new().with_header("X-Request-Id", "abc");
        assert_eq!(transport.header_value("x-request-id").as_deref(), Some("abc"));
        assert_eq!(transport.cookie_value("X-Request-Id"), None);
    }
}
