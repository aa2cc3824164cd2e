//! Error taxonomy for registration and per-call failures.
//!
//! [`RegistryError`] is raised while assembling the handler table and is a
//! programming error surfaced at startup. [`CallError`] describes why a single
//! call in a batch failed; the dispatcher converts it into an exception
//! response and never lets it abort the batch.

use std::error::Error as StdError;

use thiserror::Error;

use crate::descriptor::ParamType;

/// Errors raised while registering handlers or views.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A handler is already registered under the same action and method.
    #[error("handler '{action}.{method}' is already registered")]
    DuplicateHandler {
        /// Action name of the conflicting registration.
        action: String,
        /// Method name of the conflicting registration.
        method: String,
    },
    /// A descriptor is internally inconsistent.
    #[error("handler '{action}.{method}' is malformed: {reason}")]
    MalformedDescriptor {
        /// Action name of the rejected descriptor.
        action: String,
        /// Method name of the rejected descriptor.
        method: String,
        /// Human-readable explanation of the inconsistency.
        reason: String,
    },
    /// A view with the same tag is already registered.
    #[error("view '{view}' is already registered")]
    DuplicateView {
        /// Conflicting view tag.
        view: String,
    },
}

impl RegistryError {
    /// Creates a duplicate-handler error.
    #[must_use]
    pub fn duplicate(action: impl Into<String>, method: impl Into<String>) -> Self {
        Self::DuplicateHandler {
            action: action.into(),
            method: method.into(),
        }
    }

    /// Creates a malformed-descriptor error.
    #[must_use]
    pub fn malformed(
        action: impl Into<String>,
        method: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::MalformedDescriptor {
            action: action.into(),
            method: method.into(),
            reason: reason.into(),
        }
    }
}

/// Failure reported by a handler body.
///
/// The `category` is an opaque label that exception mappings match on; the
/// `message` is only shown to clients when a mapping passes it through.
#[derive(Debug, Error)]
#[error("{category}: {message}")]
pub struct HandlerFailure {
    category: String,
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl HandlerFailure {
    /// Creates a failure with the given category and message.
    #[must_use]
    pub fn new(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Attaches the underlying error.
    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Creates a failure for a handler that panicked.
    pub(crate) fn panicked(detail: impl Into<String>) -> Self {
        Self::new("panic", detail)
    }

    /// Category label used by exception mappings.
    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Handler-supplied message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Reasons a single call fails.
#[derive(Debug, Error)]
pub enum CallError {
    /// No handler is registered for the call's action and method.
    #[error("no handler registered for '{action}.{method}'")]
    HandlerNotFound {
        /// Requested action.
        action: String,
        /// Requested method.
        method: String,
    },
    /// The batch element could not be read as a call.
    #[error("malformed call: {reason}")]
    MalformedCall {
        /// Why the element was rejected.
        reason: String,
    },
    /// A required parameter had no value and no default.
    #[error("missing required parameter '{parameter}'")]
    MissingRequiredParameter {
        /// Declared parameter name.
        parameter: String,
    },
    /// A supplied value could not be coerced to the declared type.
    #[error("parameter '{parameter}' expects {expected}, received {received}")]
    TypeCoercion {
        /// Declared parameter name.
        parameter: String,
        /// Declared parameter type.
        expected: ParamType,
        /// Rendering of the value that was supplied.
        received: String,
    },
    /// The handler returned a failure, panicked, or produced an unusable result.
    #[error("handler failed: {failure}")]
    HandlerInvocation {
        /// Failure reported by or on behalf of the handler.
        #[source]
        failure: HandlerFailure,
    },
}

impl CallError {
    /// Creates a handler-not-found error.
    #[must_use]
    pub fn not_found(action: impl Into<String>, method: impl Into<String>) -> Self {
        Self::HandlerNotFound {
            action: action.into(),
            method: method.into(),
        }
    }

    /// Creates a malformed-call error.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedCall {
            reason: reason.into(),
        }
    }

    /// Creates a missing-parameter error.
    #[must_use]
    pub fn missing(parameter: impl Into<String>) -> Self {
        Self::MissingRequiredParameter {
            parameter: parameter.into(),
        }
    }

    /// Creates a type-coercion error.
    #[must_use]
    pub fn coercion(
        parameter: impl Into<String>,
        expected: ParamType,
        received: impl Into<String>,
    ) -> Self {
        Self::TypeCoercion {
            parameter: parameter.into(),
            expected,
            received: received.into(),
        }
    }

    /// Wraps a handler failure.
    #[must_use]
    pub const fn invocation(failure: HandlerFailure) -> Self {
        Self::HandlerInvocation { failure }
    }

    /// Returns the handler failure when this error wraps one.
    #[must_use]
    pub const fn failure(&self) -> Option<&HandlerFailure> {
        match self {
            Self::HandlerInvocation { failure } => Some(failure),
            _ => None,
        }
    }

    /// Short machine-readable label for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::HandlerNotFound { .. } => "handler_not_found",
            Self::MalformedCall { .. } => "malformed_call",
            Self::MissingRequiredParameter { .. } => "missing_required_parameter",
            Self::TypeCoercion { .. } => "type_coercion",
            Self::HandlerInvocation { .. } => "handler_invocation",
        }
    }
}
