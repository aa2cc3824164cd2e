//! Socket transport for the daemon.
//!
//! The listener binds the configured endpoint and hands each accepted
//! connection to a [`ConnectionHandler`] on its own thread.

mod errors;
mod handler;
mod listener;

pub use self::errors::ListenerError;
pub(crate) use self::handler::{ConnectionHandler, ConnectionStream};
#[cfg(test)]
pub(crate) use self::listener::ListenerHandle;
pub(crate) use self::listener::SocketListener;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
