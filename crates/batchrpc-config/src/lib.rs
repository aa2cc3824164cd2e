//! Shared configuration for the batchrpc daemon.
//!
//! Configuration is layered by [`ortho_config`]: built-in defaults, then an
//! optional TOML file (`--config-path` or `BATCHRPC_CONFIG_PATH`), then
//! `BATCHRPC_*` environment variables, then command-line flags. The resolved
//! [`Config`] is immutable for the lifetime of the process.

mod defaults;
mod modes;
mod socket;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use self::defaults::{
    DEFAULT_API_CACHE_MONTHS, DEFAULT_GENERIC_ERROR_MESSAGE, DEFAULT_LOG_FILTER,
    DEFAULT_ROUTER_URL, DEFAULT_TCP_PORT, default_log_filter, default_log_format,
    default_socket_endpoint,
};
pub use self::modes::{DispatchMode, DispatchModeParseError, LogFormat, LogFormatParseError};
pub use self::socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Resolved configuration for the router daemon.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "BATCHRPC")]
pub struct Config {
    /// Socket the daemon listens on for batch requests.
    #[ortho_config(default = defaults::default_socket_endpoint())]
    pub listen_socket: SocketEndpoint,
    /// `tracing` filter expression applied to daemon logs.
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Output format for daemon logs.
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
    /// Whether calls within a batch run sequentially or on worker threads.
    #[ortho_config(default = DispatchMode::Sequential)]
    pub dispatch_mode: DispatchMode,
    /// Message reported to clients when no exception mapping matches.
    #[ortho_config(default = defaults::default_generic_error_message())]
    pub generic_error_message: String,
    /// Optional namespace advertised in the API descriptor.
    #[ortho_config(default = String::new())]
    pub api_namespace: String,
    /// Router URL advertised in the API descriptor.
    #[ortho_config(default = defaults::default_router_url())]
    pub api_router_url: String,
    /// Lifetime of the cached API descriptor, in months of thirty days.
    #[ortho_config(default = DEFAULT_API_CACHE_MONTHS)]
    pub api_cache_months: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_socket: default_socket_endpoint(),
            log_filter: defaults::default_log_filter_string(),
            log_format: default_log_format(),
            dispatch_mode: DispatchMode::Sequential,
            generic_error_message: defaults::default_generic_error_message(),
            api_namespace: String::new(),
            api_router_url: defaults::default_router_url(),
            api_cache_months: DEFAULT_API_CACHE_MONTHS,
        }
    }
}

impl Config {
    /// Socket endpoint the daemon binds.
    #[must_use]
    pub const fn listen_socket(&self) -> &SocketEndpoint {
        &self.listen_socket
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Batch scheduling mode.
    #[must_use]
    pub const fn dispatch_mode(&self) -> DispatchMode {
        self.dispatch_mode
    }

    /// Generic client-facing error message.
    #[must_use]
    pub fn generic_error_message(&self) -> &str {
        &self.generic_error_message
    }

    /// API namespace, or `None` when unset.
    #[must_use]
    pub fn api_namespace(&self) -> Option<&str> {
        let namespace = self.api_namespace.trim();
        (!namespace.is_empty()).then_some(namespace)
    }

    /// Router URL advertised to clients.
    #[must_use]
    pub fn api_router_url(&self) -> &str {
        &self.api_router_url
    }

    /// Cache lifetime of the API descriptor in months.
    #[must_use]
    pub const fn api_cache_months(&self) -> u32 {
        self.api_cache_months
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_uses_generic_server_error() {
        let config = Config::default();
        assert_eq!(config.generic_error_message(), "Server Error");
        assert_eq!(config.dispatch_mode(), DispatchMode::Sequential);
        assert_eq!(config.api_cache_months(), 6);
    }

    #[test]
    fn blank_namespace_is_absent() {
        let config = Config {
            api_namespace: "  ".to_owned(),
            ..Config::default()
        };
        assert_eq!(config.api_namespace(), None);

        let named = Config {
            api_namespace: "App.direct".to_owned(),
            ..Config::default()
        };
        assert_eq!(named.api_namespace(), Some("App.direct"));
    }
}
