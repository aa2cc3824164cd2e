//! Translation of call failures into client-visible exception replies.

use std::fmt;
use std::sync::Arc;

use crate::error::CallError;

type Predicate = Arc<dyn Fn(&CallError) -> bool + Send + Sync>;

#[derive(Clone)]
struct ExceptionRule {
    predicate: Predicate,
    message: Option<String>,
    location: Option<String>,
}

/// Message and location reported for a failed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionReply {
    message: String,
    location: Option<String>,
}

impl ExceptionReply {
    /// Creates a reply.
    #[must_use]
    pub fn new(message: impl Into<String>, location: Option<String>) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }

    /// Client-visible message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Client-visible location.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub(crate) fn into_parts(self) -> (String, Option<String>) {
        (self.message, self.location)
    }
}

/// Ordered table of failure predicates and the replies they produce.
///
/// The first matching rule wins. A rule without a message passes the failure's
/// own message through to the client.
#[derive(Clone, Default)]
pub struct ExceptionMapping {
    rules: Vec<ExceptionRule>,
}

impl ExceptionMapping {
    /// Creates an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule matching errors accepted by `predicate`.
    #[must_use]
    pub fn on<F>(mut self, predicate: F, message: Option<&str>, location: Option<&str>) -> Self
    where
        F: Fn(&CallError) -> bool + Send + Sync + 'static,
    {
        self.rules.push(ExceptionRule {
            predicate: Arc::new(predicate),
            message: message.map(str::to_owned),
            location: location.map(str::to_owned),
        });
        self
    }

    /// Adds a rule matching handler failures of `category` with a fixed
    /// message.
    #[must_use]
    pub fn category(self, category: &str, message: &str, location: Option<&str>) -> Self {
        let wanted = category.to_owned();
        self.on(
            move |error| error.failure().is_some_and(|failure| failure.category() == wanted),
            Some(message),
            location,
        )
    }

    /// Adds a rule matching handler failures of `category` that reports the
    /// handler's own message.
    #[must_use]
    pub fn passthrough(self, category: &str, location: Option<&str>) -> Self {
        let wanted = category.to_owned();
        self.on(
            move |error| error.failure().is_some_and(|failure| failure.category() == wanted),
            None,
            location,
        )
    }

    /// Reply for the first rule that matches `error`.
    #[must_use]
    pub fn resolve(&self, error: &CallError) -> Option<ExceptionReply> {
        let rule = self.rules.iter().find(|rule| (rule.predicate)(error))?;
        let message = rule.message.clone().unwrap_or_else(|| {
            error
                .failure()
                .map_or_else(|| error.to_string(), |failure| failure.message().to_owned())
        });
        Some(ExceptionReply::new(message, rule.location.clone()))
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rules are defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl fmt::Debug for ExceptionMapping {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ExceptionMapping")
            .field("rules", &self.rules.len())
            .finish()
    }
}
