//! Handler registry keyed by action and method.
//!
//! Registration happens on a [`RegistryBuilder`] during startup. Building
//! yields an immutable [`Registry`] that concurrent dispatches share without
//! synchronisation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::call::{HandlerCall, HandlerOutput};
use crate::descriptor::HandlerDescriptor;
use crate::error::{CallError, HandlerFailure, RegistryError};

const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// Executable body of a registered method.
pub trait Handler: Send + Sync {
    /// Runs the handler for one call.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerFailure`] describing why the call failed.
    fn invoke(&self, call: &HandlerCall<'_>) -> Result<HandlerOutput, HandlerFailure>;
}

impl<F> Handler for F
where
    F: Fn(&HandlerCall<'_>) -> Result<HandlerOutput, HandlerFailure> + Send + Sync,
{
    fn invoke(&self, call: &HandlerCall<'_>) -> Result<HandlerOutput, HandlerFailure> {
        self(call)
    }
}

/// A descriptor paired with its handler.
#[derive(Clone)]
pub struct RegisteredHandler {
    descriptor: HandlerDescriptor,
    handler: Arc<dyn Handler>,
}

impl RegisteredHandler {
    /// Handler metadata.
    #[must_use]
    pub const fn descriptor(&self) -> &HandlerDescriptor {
        &self.descriptor
    }

    /// Handler body.
    #[must_use]
    pub fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }
}

impl fmt::Debug for RegisteredHandler {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RegisteredHandler")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Named field projection applied to results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    name: String,
    fields: BTreeSet<String>,
}

impl View {
    /// View tag.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields kept by the projection.
    #[must_use]
    pub const fn fields(&self) -> &BTreeSet<String> {
        &self.fields
    }

    /// Keeps only the view's fields on JSON objects. Other values pass
    /// through unchanged.
    #[must_use]
    pub fn project(&self, value: Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .filter(|(key, _)| self.fields.contains(key))
                    .collect(),
            ),
            other => other,
        }
    }
}

/// Mutable registry used while wiring handlers at startup.
#[derive(Default)]
pub struct RegistryBuilder {
    handlers: HashMap<(String, String), RegisteredHandler>,
    views: HashMap<String, View>,
}

impl RegistryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under its descriptor's action and method.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateHandler`] when the pair is taken and
    /// [`RegistryError::MalformedDescriptor`] when the descriptor is
    /// inconsistent.
    pub fn register<H>(&mut self, descriptor: HandlerDescriptor, handler: H) -> Result<(), RegistryError>
    where
        H: Handler + 'static,
    {
        descriptor.validate()?;
        let key = (descriptor.action().to_owned(), descriptor.method().to_owned());
        if self.handlers.contains_key(&key) {
            return Err(RegistryError::duplicate(key.0, key.1));
        }
        debug!(
            target: REGISTRY_TARGET,
            action = descriptor.action(),
            method = descriptor.method(),
            style = ?descriptor.style(),
            "registered handler"
        );
        self.handlers.insert(
            key,
            RegisteredHandler {
                descriptor,
                handler: Arc::new(handler),
            },
        );
        Ok(())
    }

    /// Registers a closure handler.
    ///
    /// # Errors
    ///
    /// Same as [`RegistryBuilder::register`].
    pub fn register_fn<F>(&mut self, descriptor: HandlerDescriptor, handler: F) -> Result<(), RegistryError>
    where
        F: Fn(&HandlerCall<'_>) -> Result<HandlerOutput, HandlerFailure> + Send + Sync + 'static,
    {
        self.register(descriptor, handler)
    }

    /// Registers a view that keeps only `fields`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateView`] when the tag is taken.
    pub fn register_view<I, S>(&mut self, name: impl Into<String>, fields: I) -> Result<(), RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tag: String = name.into();
        if self.views.contains_key(&tag) {
            return Err(RegistryError::DuplicateView { view: tag });
        }
        let view = View {
            name: tag.clone(),
            fields: fields.into_iter().map(Into::into).collect(),
        };
        self.views.insert(tag, view);
        Ok(())
    }

    /// Freezes the registry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::MalformedDescriptor`] when a descriptor names
    /// a view that was never registered.
    pub fn build(self) -> Result<Registry, RegistryError> {
        let mut actions: BTreeMap<String, BTreeMap<String, RegisteredHandler>> = BTreeMap::new();
        for ((action, method), entry) in self.handlers {
            if let Some(tag) = entry.descriptor.view_tag()
                && !self.views.contains_key(tag)
            {
                return Err(RegistryError::malformed(
                    action,
                    method,
                    format!("view '{tag}' is not registered"),
                ));
            }
            actions.entry(action).or_default().insert(method, entry);
        }
        Ok(Registry {
            actions,
            views: self.views,
        })
    }
}

impl fmt::Debug for RegistryBuilder {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RegistryBuilder")
            .field("handlers", &self.handlers.len())
            .field("views", &self.views.len())
            .finish()
    }
}

/// Immutable table of handlers and views.
#[derive(Debug, Default)]
pub struct Registry {
    actions: BTreeMap<String, BTreeMap<String, RegisteredHandler>>,
    views: HashMap<String, View>,
}

impl Registry {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Resolves a handler. Names match exactly.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::HandlerNotFound`] when no handler is registered
    /// for the pair.
    pub fn lookup(&self, action: &str, method: &str) -> Result<&RegisteredHandler, CallError> {
        self.actions
            .get(action)
            .and_then(|methods| methods.get(method))
            .ok_or_else(|| CallError::not_found(action, method))
    }

    /// Looks up a view by tag.
    #[must_use]
    pub fn view(&self, name: &str) -> Option<&View> {
        self.views.get(name)
    }

    /// Iterates actions and their methods in name order.
    pub fn actions(&self) -> impl Iterator<Item = (&str, impl Iterator<Item = &HandlerDescriptor>)> {
        self.actions.iter().map(|(action, methods)| {
            (
                action.as_str(),
                methods.values().map(RegisteredHandler::descriptor),
            )
        })
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.values().map(BTreeMap::len).sum()
    }

    /// Whether no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests;
