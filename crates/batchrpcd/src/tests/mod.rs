//! Crate-level integration and BDD tests.


use std::sync::{Arc, Mutex};

use batchrpc::RegistryError;
use batchrpc_config::{Config, SocketEndpoint};

use crate::bootstrap::{BootstrapError, StaticConfigLoader, bootstrap_with};
use crate::demo;
use crate::health::HealthReporter;
use crate::process::ShutdownCause;
use crate::process::shutdown::MockShutdownSignal;
use crate::process::{LaunchPlan, run_daemon_with};

#[derive(Debug, Clone, PartialEq, Eq)]
enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded { handlers: usize },
    BootstrapFailed,
    ListenerReady,
    ShutdownRequested(ShutdownCause),
    ShutdownCompleted,
}

#[derive(Debug, Default)]
struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config, handlers: usize) {
        self.record(HealthEvent::BootstrapSucceeded { handlers });
    }

    fn bootstrap_failed(&self, _error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed);
    }

    fn listener_ready(&self, _endpoint: &SocketEndpoint) {
        self.record(HealthEvent::ListenerReady);
    }

    fn shutdown_requested(&self, cause: ShutdownCause) {
        self.record(HealthEvent::ShutdownRequested(cause));
    }

    fn shutdown_completed(&self) {
        self.record(HealthEvent::ShutdownCompleted);
    }
}

fn tcp_config() -> Config {
    Config {
        listen_socket: SocketEndpoint::tcp("127.0.0.1", 0),
        ..Config::default()
    }
}

#[test]
fn daemon_runs_until_shutdown_is_signalled() {
    let reporter = Arc::new(RecordingHealthReporter::default());
    let mut shutdown = MockShutdownSignal::new();
    shutdown
        .expect_wait()
        .times(1)
        .returning(|| Ok(ShutdownCause::Interrupt));

    run_daemon_with(LaunchPlan {
        loader: StaticConfigLoader::new(tcp_config()),
        reporter: Arc::clone(&reporter) as Arc<dyn HealthReporter>,
        shutdown,
    })
    .expect("daemon run");

    let events = reporter.events();
    assert_eq!(events.first(), Some(&HealthEvent::BootstrapStarting));
    assert!(matches!(
        events.get(1),
        Some(HealthEvent::BootstrapSucceeded { handlers }) if *handlers > 0
    ));
    assert_eq!(
        events.get(2..),
        Some(
            &[
                HealthEvent::ListenerReady,
                HealthEvent::ShutdownRequested(ShutdownCause::Interrupt),
                HealthEvent::ShutdownCompleted
            ][..]
        )
    );
}

#[test]
fn failed_registration_is_reported() {
    let reporter = RecordingHealthReporter::default();
    let loader = StaticConfigLoader::new(tcp_config());
    let result = bootstrap_with(&loader, &reporter, |builder| {
        demo::install(builder)?;
        demo::install(builder)
    });

    match result {
        Err(BootstrapError::Registry { source }) => assert!(matches!(
            source,
            RegistryError::DuplicateView { .. } | RegistryError::DuplicateHandler { .. }
        )),
        other => panic!("expected a registry failure, got {other:?}"),
    }
    assert_eq!(
        reporter.events(),
        vec![HealthEvent::BootstrapStarting, HealthEvent::BootstrapFailed]
    );
}

#[test]
fn bootstrap_lists_demo_actions() {
    let reporter = RecordingHealthReporter::default();
    let loader = StaticConfigLoader::new(tcp_config());
    let daemon = bootstrap_with(&loader, &reporter, demo::install).expect("bootstrap");
    let api = daemon.api();
    let actions: Vec<&str> = api.descriptor().action_names().collect();
    assert_eq!(actions, vec!["person"]);
    assert_eq!(daemon.config().listen_socket(), &SocketEndpoint::tcp("127.0.0.1", 0));
}
