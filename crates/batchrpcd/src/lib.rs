//! Reference daemon for the batchrpc router.
//!
//! The daemon loads configuration through [`batchrpc_config`], installs
//! structured telemetry, registers the demonstration handlers from [`demo`],
//! and serves batches over the configured socket. Each connection carries one
//! JSONL request line and receives one JSONL reply line:
//!
//! ```text
//! -> [{"action":"person","method":"load","type":"rpc","tid":1,"data":[{"limit":2}]}]
//! <- [{"action":"person","method":"load","type":"rpc","tid":1,"result":{"records":[...],"total":8,"success":true}}]
//! ```
//!
//! A request line may also wrap the batch with transport values that
//! header-, cookie- or query-sourced parameters read, or ask for the client
//! API descriptor:
//!
//! ```text
//! -> {"batch":[...],"headers":{"X-Client":"grid"}}
//! -> {"api":{"ifNoneMatch":"\"0f3a...\""}}
//! ```
//!
//! Bootstrap progress is reported through a [`HealthReporter`] so operators
//! can see which stage failed.

mod bootstrap;
pub mod demo;
mod dispatch;
mod health;
mod process;
mod telemetry;
mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{LaunchError, ShutdownCause, run_daemon};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
