//! Termination signal handling.
//!
//! The launch sequence parks on [`ShutdownSignal::wait`] once the listener is
//! up. The returned [`ShutdownCause`] is handed to the health reporter so the
//! stop reason lands in the same event stream as the bootstrap stages.

use std::fmt;
use std::io;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::debug;

use super::PROCESS_TARGET;

const STOP_SIGNALS: [i32; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Why the daemon is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    /// `SIGTERM`, usually from a service manager.
    Terminate,
    /// `SIGINT`, usually Ctrl-C.
    Interrupt,
    /// `SIGQUIT`.
    Quit,
    /// `SIGHUP`; the daemon has no reload, so a hangup stops it.
    Hangup,
    /// The signal source closed without delivering a signal.
    SourceClosed,
}

impl ShutdownCause {
    /// Maps a delivered signal number onto a cause.
    #[must_use]
    pub const fn from_signal(signal: i32) -> Option<Self> {
        match signal {
            SIGTERM => Some(Self::Terminate),
            SIGINT => Some(Self::Interrupt),
            SIGQUIT => Some(Self::Quit),
            SIGHUP => Some(Self::Hangup),
            _ => None,
        }
    }

    /// Short name used in log events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Terminate => "SIGTERM",
            Self::Interrupt => "SIGINT",
            Self::Quit => "SIGQUIT",
            Self::Hangup => "SIGHUP",
            Self::SourceClosed => "closed",
        }
    }
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Blocks the launch sequence until the daemon should stop.
#[cfg_attr(test, mockall::automock)]
pub trait ShutdownSignal: Send + Sync {
    /// Blocks until shutdown should proceed and reports why.
    fn wait(&self) -> Result<ShutdownCause, ShutdownError>;
}

/// Errors reported while waiting for a stop request.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// The process signal handlers could not be installed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Waits for the first of `SIGTERM`, `SIGINT`, `SIGQUIT` or `SIGHUP`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShutdownSignal;

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<ShutdownCause, ShutdownError> {
        let mut signals =
            Signals::new(STOP_SIGNALS).map_err(|source| ShutdownError::Install { source })?;
        debug!(target: PROCESS_TARGET, "waiting for a stop signal");
        Ok(signals
            .forever()
            .find_map(ShutdownCause::from_signal)
            .unwrap_or(ShutdownCause::SourceClosed))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(SIGTERM, ShutdownCause::Terminate)]
    #[case(SIGINT, ShutdownCause::Interrupt)]
    #[case(SIGQUIT, ShutdownCause::Quit)]
    #[case(SIGHUP, ShutdownCause::Hangup)]
    fn stop_signals_map_to_causes(#[case] signal: i32, #[case] cause: ShutdownCause) {
        assert_eq!(ShutdownCause::from_signal(signal), Some(cause));
    }

    #[test]
    fn other_signals_are_not_stop_requests() {
        assert_eq!(ShutdownCause::from_signal(signal_hook::consts::signal::SIGUSR1), None);
    }

    #[test]
    fn causes_display_their_signal_name() {
        assert_eq!(ShutdownCause::Terminate.to_string(), "SIGTERM");
        assert_eq!(ShutdownCause::SourceClosed.to_string(), "closed");
    }
}
