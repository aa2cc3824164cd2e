//! Launch sequencing for the daemon runtime.

use std::sync::Arc;

use tracing::info;

use crate::bootstrap::{ConfigLoader, StaticConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::demo;
use crate::dispatch::RouterConnectionHandler;
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::transport::SocketListener;

use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};
use super::PROCESS_TARGET;

/// Collaborators required to launch the daemon runtime.
pub(crate) struct LaunchPlan<L, S> {
    pub(crate) loader: L,
    pub(crate) reporter: Arc<dyn HealthReporter>,
    pub(crate) shutdown: S,
}

/// Runs the daemon with the production collaborators until a termination
/// signal arrives.
///
/// # Errors
///
/// Returns [`LaunchError`] when configuration, bootstrap, the listener or
/// signal installation fails.
pub fn run_daemon() -> Result<(), LaunchError> {
    run_daemon_with(LaunchPlan {
        loader: SystemConfigLoader,
        reporter: Arc::new(StructuredHealthReporter::new()),
        shutdown: SystemShutdownSignal,
    })
}

/// Runs the daemon with injected collaborators.
pub(crate) fn run_daemon_with<L, S>(plan: LaunchPlan<L, S>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal,
{
    let LaunchPlan {
        loader,
        reporter,
        shutdown,
    } = plan;

    info!(target: PROCESS_TARGET, "starting daemon runtime");
    let config = loader.load()?;
    config.listen_socket().prepare_filesystem()?;
    let listener = SocketListener::bind(config.listen_socket())?;

    let static_loader = StaticConfigLoader::new(config.clone());
    let daemon = bootstrap_with(&static_loader, reporter.as_ref(), demo::install)?;
    let handler = Arc::new(RouterConnectionHandler::new(
        daemon.dispatcher(),
        daemon.api(),
    ));

    let listener_handle = listener.start(handler)?;
    reporter.listener_ready(config.listen_socket());
    let cause = shutdown.wait()?;
    reporter.shutdown_requested(cause);
    listener_handle.shutdown();
    listener_handle.join()?;
    reporter.shutdown_completed();
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(())
}
