//! Errors raised between loading configuration and a clean shutdown.

use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

use batchrpc_config::SocketPreparationError;

use crate::bootstrap::BootstrapError;
use crate::transport::ListenerError;

use super::shutdown::ShutdownError;

/// Launch failure, tagged with the stage that failed.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Config {
        /// Underlying loader error.
        #[from]
        source: Arc<OrthoError>,
    },
    /// Preparing the socket filesystem failed.
    #[error("failed to prepare daemon socket: {source}")]
    Socket {
        /// Underlying filesystem error.
        #[from]
        source: SocketPreparationError,
    },
    /// Bootstrapping the router failed.
    #[error("daemon bootstrap failed: {source}")]
    Bootstrap {
        /// Underlying bootstrap error.
        #[from]
        source: BootstrapError,
    },
    /// The socket listener could not start or stopped abnormally.
    #[error("daemon socket listener failed: {source}")]
    Listener {
        /// Underlying listener error.
        #[from]
        source: ListenerError,
    },
    /// Waiting for shutdown failed.
    #[error("failed to await shutdown signal: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[from]
        source: ShutdownError,
    },
}
