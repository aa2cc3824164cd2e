//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;

use batchrpc_config::{Config, SocketEndpoint};

use crate::bootstrap::BootstrapError;
use crate::process::ShutdownCause;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer for daemon lifecycle events.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes; `handlers` is the number of
    /// registered methods.
    fn bootstrap_succeeded(&self, config: &Config, handlers: usize);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once the listener accepts connections.
    fn listener_ready(&self, endpoint: &SocketEndpoint);

    /// Invoked when a stop request arrives, before the listener is drained.
    fn shutdown_requested(&self, cause: ShutdownCause);

    /// Invoked after the listener has stopped.
    fn shutdown_completed(&self);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config, handlers: usize) {
        (**self).bootstrap_succeeded(config, handlers);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn listener_ready(&self, endpoint: &SocketEndpoint) {
        (**self).listener_ready(endpoint);
    }

    fn shutdown_requested(&self, cause: ShutdownCause) {
        (**self).shutdown_requested(cause);
    }

    fn shutdown_completed(&self) {
        (**self).shutdown_completed();
    }
}

/// Reporter that records lifecycle events with `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config, handlers: usize) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            socket = %config.listen_socket(),
            dispatch_mode = %config.dispatch_mode(),
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            handlers,
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn listener_ready(&self, endpoint: &SocketEndpoint) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "listener_ready",
            endpoint = %endpoint,
            "accepting batches"
        );
    }

    fn shutdown_requested(&self, cause: ShutdownCause) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_requested",
            cause = %cause,
            "stop requested; draining listener"
        );
    }

    fn shutdown_completed(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_completed",
            "daemon stopped"
        );
    }
}
