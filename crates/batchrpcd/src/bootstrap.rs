//! Daemon bootstrap orchestration.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use batchrpc::{
    ApiCache, ApiDescriptor, Dispatcher, DispatcherOptions, Registry, RegistryBuilder,
    RegistryError,
};
use batchrpc_config::Config;

use crate::health::HealthReporter;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Source of the daemon configuration.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader's error when no valid configuration is available.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader that hands out an already resolved configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// A handler or view could not be registered.
    #[error("failed to register handlers: {source}")]
    Registry {
        /// Underlying registration error.
        #[source]
        source: RegistryError,
    },
}

/// A bootstrapped daemon: resolved configuration plus the frozen router.
#[derive(Debug)]
pub struct Daemon {
    config: Config,
    telemetry: TelemetryHandle,
    dispatcher: Arc<Dispatcher>,
    api: Arc<ApiCache>,
}

impl Daemon {
    /// Resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Telemetry handle, mostly useful to tests.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Dispatcher shared by every connection.
    #[must_use]
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Cached API descriptor shared by every connection.
    #[must_use]
    pub fn api(&self) -> Arc<ApiCache> {
        Arc::clone(&self.api)
    }
}

/// Bootstraps the daemon using the supplied collaborators.
///
/// `install` registers handlers and views on an empty builder; the frozen
/// registry backs both the dispatcher and the API descriptor.
///
/// # Errors
///
/// Returns [`BootstrapError`] naming the stage that failed. The reporter is
/// told about the failure before it is returned.
pub fn bootstrap_with<F>(
    loader: &dyn ConfigLoader,
    reporter: &dyn HealthReporter,
    install: F,
) -> Result<Daemon, BootstrapError>
where
    F: FnOnce(&mut RegistryBuilder) -> Result<(), RegistryError>,
{
    reporter.bootstrap_starting();
    let result = assemble(loader, install);
    match &result {
        Ok(daemon) => reporter.bootstrap_succeeded(&daemon.config, daemon.dispatcher.registry().len()),
        Err(error) => reporter.bootstrap_failed(error),
    }
    result
}

fn assemble<F>(loader: &dyn ConfigLoader, install: F) -> Result<Daemon, BootstrapError>
where
    F: FnOnce(&mut RegistryBuilder) -> Result<(), RegistryError>,
{
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;

    let mut builder = Registry::builder();
    install(&mut builder).map_err(|source| BootstrapError::Registry { source })?;
    let registry = Arc::new(
        builder
            .build()
            .map_err(|source| BootstrapError::Registry { source })?,
    );

    let descriptor = ApiDescriptor::from_config(&registry, &config);
    let api = Arc::new(ApiCache::new(descriptor, config.api_cache_months()));
    let dispatcher = Arc::new(Dispatcher::new(
        registry,
        DispatcherOptions::from_config(&config),
    ));

    Ok(Daemon {
        config,
        telemetry,
        dispatcher,
        api,
    })
}
