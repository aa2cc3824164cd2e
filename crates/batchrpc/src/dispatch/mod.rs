//! Per-call dispatch and batch scheduling.
//!
//! Each call walks a small state machine:
//!
//! ```text
//! Pending -> Bound -> Invoked -> Succeeded
//!    |                   |
//!    +------> Failed <---+
//! ```
//!
//! Lookup and binding failures move a call straight from `Pending` to
//! `Failed`; handler errors, panics and shape mismatches move it from
//! `Invoked` to `Failed`. Every call reaches exactly one terminal state and
//! produces exactly one response, so one failing call never disturbs the
//! rest of its batch.

mod exception;

use std::any::Any;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use batchrpc_config::{Config, DEFAULT_GENERIC_ERROR_MESSAGE, DispatchMode};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::binder;
use crate::call::{Batch, BatchEntry, Call, HandlerCall, HandlerOutput, Tid};
use crate::context::TransportContext;
use crate::descriptor::{HandlerDescriptor, ReturnShape};
use crate::error::{CallError, HandlerFailure};
use crate::registry::{Handler, Registry, View};
use crate::response::{Response, ResponseEnvelope};
use crate::store::{StoreResult, ViewSelection};

pub use self::exception::{ExceptionMapping, ExceptionReply};

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Lifecycle state of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallState {
    /// Received, not yet resolved.
    Pending,
    /// Handler resolved and arguments bound.
    Bound,
    /// Handler running.
    Invoked,
    /// Handler returned a usable result.
    Succeeded,
    /// The call failed.
    Failed,
}

impl CallState {
    /// Whether the state ends the lifecycle.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Bound | Self::Failed)
                | (Self::Bound, Self::Invoked | Self::Failed)
                | (Self::Invoked, Self::Succeeded | Self::Failed)
        )
    }
}

struct Lifecycle {
    tid: Option<Tid>,
    states: Vec<CallState>,
}

impl Lifecycle {
    fn start(tid: Option<Tid>) -> Self {
        Self {
            tid,
            states: vec![CallState::Pending],
        }
    }

    fn current(&self) -> CallState {
        self.states.last().copied().unwrap_or(CallState::Pending)
    }

    fn advance(&mut self, next: CallState) {
        let from = self.current();
        debug_assert!(from.can_advance_to(next), "illegal transition {from:?} -> {next:?}");
        trace!(
            target: DISPATCH_TARGET,
            tid = ?self.tid,
            from = ?from,
            to = ?next,
            "call state transition"
        );
        self.states.push(next);
    }
}

/// Response for one call together with the states it passed through.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    response: Response,
    states: Vec<CallState>,
}

impl CallOutcome {
    fn finish(response: Response, lifecycle: Lifecycle) -> Self {
        Self {
            response,
            states: lifecycle.states,
        }
    }

    /// The call's response.
    #[must_use]
    pub const fn response(&self) -> &Response {
        &self.response
    }

    /// Consumes the outcome, returning the response.
    #[must_use]
    pub fn into_response(self) -> Response {
        self.response
    }

    /// States in the order they were entered.
    #[must_use]
    pub fn states(&self) -> &[CallState] {
        &self.states
    }

    /// Terminal state.
    #[must_use]
    pub fn final_state(&self) -> CallState {
        self.states.last().copied().unwrap_or(CallState::Pending)
    }
}

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    generic_message: String,
    mode: DispatchMode,
    exceptions: ExceptionMapping,
    worker_limit: NonZeroUsize,
    worker_stack_size: Option<usize>,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            generic_message: DEFAULT_GENERIC_ERROR_MESSAGE.to_owned(),
            mode: DispatchMode::Sequential,
            exceptions: ExceptionMapping::default(),
            worker_limit: default_worker_limit(),
            worker_stack_size: None,
        }
    }
}

fn default_worker_limit() -> NonZeroUsize {
    thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}

impl DispatcherOptions {
    /// Options taken from the daemon configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            generic_message: config.generic_error_message().to_owned(),
            mode: config.dispatch_mode(),
            ..Self::default()
        }
    }

    /// Sets the message used when no mapping matches.
    #[must_use]
    pub fn with_generic_message(mut self, message: impl Into<String>) -> Self {
        self.generic_message = message.into();
        self
    }

    /// Sets the batch scheduling mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the global exception mapping, consulted after handler mappings.
    #[must_use]
    pub fn with_exceptions(mut self, mapping: ExceptionMapping) -> Self {
        self.exceptions = mapping;
        self
    }

    /// Caps how many calls of one batch run at once in parallel mode.
    ///
    /// Defaults to the available parallelism of the host.
    #[must_use]
    pub const fn with_worker_limit(mut self, limit: NonZeroUsize) -> Self {
        self.worker_limit = limit;
        self
    }

    /// Sets the stack size of parallel worker threads.
    ///
    /// A worker that cannot be started runs its call on the dispatching
    /// thread instead.
    #[must_use]
    pub const fn with_worker_stack_size(mut self, bytes: usize) -> Self {
        self.worker_stack_size = Some(bytes);
        self
    }

    /// Maximum number of concurrently running calls in parallel mode.
    #[must_use]
    pub const fn worker_limit(&self) -> NonZeroUsize {
        self.worker_limit
    }

    /// Generic failure message.
    #[must_use]
    pub fn generic_message(&self) -> &str {
        &self.generic_message
    }

    /// Scheduling mode.
    #[must_use]
    pub const fn mode(&self) -> DispatchMode {
        self.mode
    }
}

/// Routes batches of calls to registered handlers.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    options: DispatcherOptions,
}

impl Dispatcher {
    /// Creates a dispatcher over a frozen registry.
    #[must_use]
    pub const fn new(registry: Arc<Registry>, options: DispatcherOptions) -> Self {
        Self { registry, options }
    }

    /// Registry used for lookups.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Dispatcher settings.
    #[must_use]
    pub const fn options(&self) -> &DispatcherOptions {
        &self.options
    }

    /// Dispatches every call of `batch` and assembles the envelope.
    #[must_use]
    pub fn dispatch(&self, batch: &Batch, transport: &dyn TransportContext) -> ResponseEnvelope {
        let responses = self
            .dispatch_outcomes(batch, transport)
            .into_iter()
            .map(CallOutcome::into_response)
            .collect();
        ResponseEnvelope::new(responses, batch.is_batched())
    }

    /// Dispatches already parsed calls, one response per call in order.
    #[must_use]
    pub fn handle_batch(&self, calls: Vec<Call>, transport: &dyn TransportContext) -> Vec<Response> {
        let batch = Batch::from_calls(calls);
        self.dispatch_outcomes(&batch, transport)
            .into_iter()
            .map(CallOutcome::into_response)
            .collect()
    }

    /// Dispatches every call of `batch`, returning outcomes in request order.
    #[must_use]
    pub fn dispatch_outcomes(
        &self,
        batch: &Batch,
        transport: &dyn TransportContext,
    ) -> Vec<CallOutcome> {
        let entries = batch.entries();
        debug!(
            target: DISPATCH_TARGET,
            calls = entries.len(),
            mode = %self.options.mode,
            "dispatching batch"
        );
        match self.options.mode {
            DispatchMode::Parallel if entries.len() > 1 => entries
                .chunks(self.options.worker_limit.get())
                .flat_map(|chunk| self.dispatch_concurrently(chunk, transport))
                .collect(),
            DispatchMode::Parallel | DispatchMode::Sequential => entries
                .iter()
                .map(|entry| self.dispatch_entry(entry, transport))
                .collect(),
        }
    }

    /// Runs each entry of `chunk` on its own scoped worker.
    ///
    /// Entries whose worker cannot be started run on the calling thread.
    fn dispatch_concurrently(
        &self,
        chunk: &[BatchEntry],
        transport: &dyn TransportContext,
    ) -> Vec<CallOutcome> {
        thread::scope(|scope| {
            let workers: Vec<_> = chunk
                .iter()
                .map(|entry| {
                    let mut builder = thread::Builder::new().name("batchrpc-call".to_owned());
                    if let Some(bytes) = self.options.worker_stack_size {
                        builder = builder.stack_size(bytes);
                    }
                    let worker =
                        builder.spawn_scoped(scope, move || self.dispatch_entry(entry, transport));
                    (entry, worker)
                })
                .collect();
            workers
                .into_iter()
                .map(|(entry, worker)| match worker {
                    Ok(handle) => handle.join().unwrap_or_else(|_| self.abandoned(entry)),
                    Err(error) => {
                        warn!(
                            target: DISPATCH_TARGET,
                            %error,
                            "failed to start call worker; running inline"
                        );
                        self.dispatch_entry(entry, transport)
                    }
                })
                .collect()
        })
    }

    fn dispatch_entry(&self, entry: &BatchEntry, transport: &dyn TransportContext) -> CallOutcome {
        match entry {
            BatchEntry::Call(call) => self.dispatch_call(call, transport),
            BatchEntry::Malformed {
                action,
                method,
                tid,
                reason,
            } => self.fail(
                action,
                method,
                *tid,
                None,
                &CallError::malformed(reason.as_str()),
                Lifecycle::start(*tid),
            ),
        }
    }

    /// Dispatches one call.
    #[must_use]
    pub fn dispatch_call(&self, call: &Call, transport: &dyn TransportContext) -> CallOutcome {
        let mut lifecycle = Lifecycle::start(Some(call.tid()));
        let entry = match self.registry.lookup(call.action(), call.method()) {
            Ok(entry) => entry,
            Err(error) => return self.fail_call(call, None, &error, lifecycle),
        };
        let descriptor = entry.descriptor();

        let binding = match binder::bind(descriptor, call.data(), transport) {
            Ok(binding) => binding,
            Err(error) => return self.fail_call(call, Some(descriptor), &error, lifecycle),
        };
        lifecycle.advance(CallState::Bound);

        let handler_call = HandlerCall::new(call, descriptor, binding);
        lifecycle.advance(CallState::Invoked);
        let rendered = invoke(entry.handler(), &handler_call)
            .and_then(|output| self.render(descriptor, output));

        match rendered {
            Ok(result) => {
                lifecycle.advance(CallState::Succeeded);
                debug!(
                    target: DISPATCH_TARGET,
                    action = call.action(),
                    method = call.method(),
                    tid = call.tid(),
                    "call succeeded"
                );
                CallOutcome::finish(
                    Response::rpc(call.action(), call.method(), call.tid(), result),
                    lifecycle,
                )
            }
            Err(failure) => {
                self.fail_call(call, Some(descriptor), &CallError::invocation(failure), lifecycle)
            }
        }
    }

    fn fail_call(
        &self,
        call: &Call,
        descriptor: Option<&HandlerDescriptor>,
        error: &CallError,
        lifecycle: Lifecycle,
    ) -> CallOutcome {
        self.fail(
            call.action(),
            call.method(),
            Some(call.tid()),
            descriptor,
            error,
            lifecycle,
        )
    }

    fn fail(
        &self,
        action: &str,
        method: &str,
        tid: Option<Tid>,
        descriptor: Option<&HandlerDescriptor>,
        error: &CallError,
        mut lifecycle: Lifecycle,
    ) -> CallOutcome {
        lifecycle.advance(CallState::Failed);
        warn!(
            target: DISPATCH_TARGET,
            action,
            method,
            tid = ?tid,
            kind = error.kind(),
            %error,
            "call failed"
        );
        let (message, location) = self.exception_reply(descriptor, error).into_parts();
        CallOutcome::finish(
            Response::exception(action, method, tid, message, location),
            lifecycle,
        )
    }

    fn exception_reply(
        &self,
        descriptor: Option<&HandlerDescriptor>,
        error: &CallError,
    ) -> ExceptionReply {
        let generic = || ExceptionReply::new(self.options.generic_message.as_str(), None);
        match error {
            CallError::HandlerNotFound { .. } | CallError::MalformedCall { .. } => generic(),
            _ => descriptor
                .and_then(|found| found.exception_mapping().resolve(error))
                .or_else(|| self.options.exceptions.resolve(error))
                .unwrap_or_else(generic),
        }
    }

    fn abandoned(&self, entry: &BatchEntry) -> CallOutcome {
        let (action, method, tid) = match entry {
            BatchEntry::Call(call) => (call.action(), call.method(), Some(call.tid())),
            BatchEntry::Malformed {
                action,
                method,
                tid,
                ..
            } => (action.as_str(), method.as_str(), *tid),
        };
        let failure = HandlerFailure::panicked("worker thread terminated");
        self.fail(
            action,
            method,
            tid,
            None,
            &CallError::invocation(failure),
            Lifecycle::start(tid),
        )
    }

    fn render(
        &self,
        descriptor: &HandlerDescriptor,
        output: HandlerOutput,
    ) -> Result<Value, HandlerFailure> {
        let declared = descriptor.return_shape();
        let view = descriptor.view_tag().and_then(|tag| self.view(tag));
        match (declared, output) {
            (ReturnShape::Single, HandlerOutput::Single(value)) => Ok(project(view, value)),
            (ReturnShape::List, HandlerOutput::List(items)) => Ok(Value::Array(
                items.into_iter().map(|item| project(view, item)).collect(),
            )),
            (ReturnShape::Store, HandlerOutput::Store(result)) => {
                self.render_store(descriptor, result)
            }
            (ReturnShape::Store, HandlerOutput::List(items)) => {
                self.render_store(descriptor, StoreResult::new(items))
            }
            (ReturnShape::Raw, HandlerOutput::Raw(text)) => serde_json::from_str(&text)
                .map_err(|error| {
                    HandlerFailure::new("shape", "raw output is not valid JSON").with_source(error)
                }),
            (expected, other) => Err(HandlerFailure::new(
                "shape",
                format!(
                    "handler declared a {expected:?} result but returned {:?}",
                    other.shape()
                ),
            )),
        }
    }

    fn render_store(
        &self,
        descriptor: &HandlerDescriptor,
        mut result: StoreResult,
    ) -> Result<Value, HandlerFailure> {
        let tag = match result.view() {
            ViewSelection::Inherit => descriptor.view_tag().map(str::to_owned),
            ViewSelection::Disabled => None,
            ViewSelection::Named(tag) => Some(tag.clone()),
        };
        if let Some(view) = tag.as_deref().and_then(|name| self.view(name)) {
            for record in result.records_mut() {
                *record = view.project(std::mem::take(record));
            }
        }
        serde_json::to_value(&result).map_err(|error| {
            HandlerFailure::new("serialization", error.to_string()).with_source(error)
        })
    }

    fn view(&self, tag: &str) -> Option<&View> {
        let found = self.registry.view(tag);
        if found.is_none() {
            warn!(target: DISPATCH_TARGET, view = tag, "unknown view; result left unprojected");
        }
        found
    }
}

fn project(view: Option<&View>, value: Value) -> Value {
    match view {
        Some(found) => found.project(value),
        None => value,
    }
}

fn invoke(handler: &dyn Handler, call: &HandlerCall<'_>) -> Result<HandlerOutput, HandlerFailure> {
    panic::catch_unwind(AssertUnwindSafe(|| handler.invoke(call)))
        .unwrap_or_else(|payload| Err(HandlerFailure::panicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_owned())
}

#[cfg(test)]
mod tests;
