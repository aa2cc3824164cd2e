//! Unit tests for call dispatch.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rstest::{fixture, rstest};
use serde_json::json;

use super::*;
use crate::context::NoTransport;
use crate::descriptor::{CallStyle, ParamSpec, ParamType};
use crate::registry::RegistryBuilder;

// ----------------------------------------------------------------------------
// Fixtures
// ----------------------------------------------------------------------------

fn greet(call: &HandlerCall<'_>) -> Result<HandlerOutput, HandlerFailure> {
    let name = call.arguments().string("name").unwrap_or("stranger");
    let times = call.arguments().int("times").unwrap_or(1);
    HandlerOutput::single(&format!("hello {name} x{times}"))
}

fn people() -> Vec<Value> {
    vec![
        json!({"id": 1, "firstName": "Ada", "ssn": "111"}),
        json!({"id": 2, "firstName": "Grace", "ssn": "222"}),
    ]
}

#[fixture]
fn registry() -> Arc<Registry> {
    let mut builder = RegistryBuilder::new();
    builder
        .register_view("public", ["id", "firstName"])
        .expect("public view");
    builder
        .register_view("ids", ["id"])
        .expect("ids view");
    builder
        .register_fn(
            HandlerDescriptor::new("greeter", "greet", CallStyle::Simple)
                .param(ParamSpec::required("name", ParamType::String))
                .param(ParamSpec::optional("times", ParamType::Int).with_default(1)),
            greet,
        )
        .expect("greeter.greet");
    builder
        .register_fn(
            HandlerDescriptor::new("mission", "launch", CallStyle::Simple).exceptions(
                ExceptionMapping::new().category("space", "Houston, we have a problem", Some("Space")),
            ),
            |_call: &HandlerCall<'_>| Err(HandlerFailure::new("space", "oxygen tank ruptured")),
        )
        .expect("mission.launch");
    builder
        .register_fn(
            HandlerDescriptor::new("mission", "abort", CallStyle::Simple),
            |_call: &HandlerCall<'_>| Err(HandlerFailure::new("abort", "crew requested abort")),
        )
        .expect("mission.abort");
    builder
        .register_fn(
            HandlerDescriptor::new("mission", "explode", CallStyle::Simple),
            |_call: &HandlerCall<'_>| -> Result<HandlerOutput, HandlerFailure> {
                panic!("booster failure")
            },
        )
        .expect("mission.explode");
    builder
        .register_fn(
            HandlerDescriptor::new("person", "load", CallStyle::StoreRead),
            |_call: &HandlerCall<'_>| Ok(HandlerOutput::List(people())),
        )
        .expect("person.load");
    builder
        .register_fn(
            HandlerDescriptor::new("person", "loadPublic", CallStyle::StoreRead).view("public"),
            |call: &HandlerCall<'_>| {
                let request = call.read_request().cloned().unwrap_or_default();
                let result =
                    call.store_processor()
                        .process(people(), &request, &crate::store::JsonFieldOrdering);
                let view = match request.params().get("view").and_then(Value::as_str) {
                    Some("none") => ViewSelection::Disabled,
                    Some(tag) => ViewSelection::Named(tag.to_owned()),
                    None => ViewSelection::Inherit,
                };
                Ok(HandlerOutput::Store(result.with_view(view)))
            },
        )
        .expect("person.loadPublic");
    builder
        .register_fn(
            HandlerDescriptor::new("person", "names", CallStyle::Simple)
                .returns(ReturnShape::List)
                .view("public"),
            |_call: &HandlerCall<'_>| Ok(HandlerOutput::List(people())),
        )
        .expect("person.names");
    builder
        .register_fn(
            HandlerDescriptor::new("person", "count", CallStyle::Simple),
            |_call: &HandlerCall<'_>| Ok(HandlerOutput::List(people())),
        )
        .expect("person.count");
    builder
        .register_fn(
            HandlerDescriptor::new("person", "raw", CallStyle::Simple)
                .returns(ReturnShape::Raw)
                .param(ParamSpec::required("json", ParamType::String)),
            |call: &HandlerCall<'_>| {
                let text = call.arguments().string("json").unwrap_or_default().to_owned();
                Ok(HandlerOutput::Raw(text))
            },
        )
        .expect("person.raw");
    Arc::new(builder.build().expect("registry"))
}

fn dispatcher(registry: Arc<Registry>) -> Dispatcher {
    let global = ExceptionMapping::new()
        .passthrough("abort", Some("mission"))
        .category("space", "global space handler", None);
    Dispatcher::new(
        registry,
        DispatcherOptions::default().with_exceptions(global),
    )
}

fn call(action: &str, method: &str, tid: Tid, data: Value) -> Call {
    Call::new(action, method, tid, data)
}

fn run(registry: Arc<Registry>, call: &Call) -> CallOutcome {
    dispatcher(registry).dispatch_call(call, &NoTransport)
}

// ----------------------------------------------------------------------------
// Lifecycle
// ----------------------------------------------------------------------------

#[rstest]
fn successful_call_walks_every_state(registry: Arc<Registry>) {
    let outcome = run(registry, &call("greeter", "greet", 1, json!(["Ada", 2])));
    assert_eq!(
        outcome.states(),
        &[
            CallState::Pending,
            CallState::Bound,
            CallState::Invoked,
            CallState::Succeeded
        ]
    );
    assert_eq!(outcome.response().result(), Some(&json!("hello Ada x2")));
}

#[rstest]
fn unknown_handler_fails_from_pending(registry: Arc<Registry>) {
    let outcome = run(registry, &call("greeter", "shout", 5, json!([])));
    assert_eq!(outcome.states(), &[CallState::Pending, CallState::Failed]);
    let response = outcome.response();
    assert!(response.is_exception());
    assert_eq!(response.message(), Some("Server Error"));
    assert_eq!(response.location(), None);
    assert_eq!(response.tid(), Some(5));
}

#[rstest]
fn missing_parameter_fails_before_invocation(registry: Arc<Registry>) {
    let outcome = run(registry, &call("greeter", "greet", 6, Value::Null));
    assert_eq!(outcome.states(), &[CallState::Pending, CallState::Failed]);
    assert_eq!(outcome.response().message(), Some("Server Error"));
}

#[rstest]
fn handler_failure_fails_after_invocation(registry: Arc<Registry>) {
    let outcome = run(registry, &call("mission", "abort", 7, Value::Null));
    assert_eq!(outcome.final_state(), CallState::Failed);
    assert_eq!(outcome.states().len(), 4);
}

// ----------------------------------------------------------------------------
// Exception mapping
// ----------------------------------------------------------------------------

#[rstest]
fn handler_mapping_wins_over_global(registry: Arc<Registry>) {
    let outcome = run(registry, &call("mission", "launch", 8, Value::Null));
    let response = outcome.response();
    assert_eq!(response.message(), Some("Houston, we have a problem"));
    assert_eq!(response.location(), Some("Space"));
}

#[rstest]
fn passthrough_mapping_reports_handler_message(registry: Arc<Registry>) {
    let outcome = run(registry, &call("mission", "abort", 9, Value::Null));
    let response = outcome.response();
    assert_eq!(response.message(), Some("crew requested abort"));
    assert_eq!(response.location(), Some("mission"));
}

#[rstest]
fn panic_becomes_generic_exception(registry: Arc<Registry>) {
    let outcome = run(registry, &call("mission", "explode", 10, Value::Null));
    assert_eq!(outcome.final_state(), CallState::Failed);
    assert_eq!(outcome.response().message(), Some("Server Error"));
}

#[rstest]
fn generic_message_is_configurable(registry: Arc<Registry>) {
    let dispatcher = Dispatcher::new(
        registry,
        DispatcherOptions::default().with_generic_message("Try again later"),
    );
    let outcome = dispatcher.dispatch_call(&call("nobody", "home", 1, Value::Null), &NoTransport);
    assert_eq!(outcome.response().message(), Some("Try again later"));
}

// ----------------------------------------------------------------------------
// Result rendering
// ----------------------------------------------------------------------------

#[rstest]
fn store_read_list_is_wrapped_without_total(registry: Arc<Registry>) {
    let outcome = run(registry, &call("person", "load", 11, json!([{}])));
    let result = outcome.response().result().expect("result");
    assert_eq!(result.get("success"), Some(&json!(true)));
    assert_eq!(result.get("records").and_then(Value::as_array).map(Vec::len), Some(2));
    assert!(result.get("total").is_none());
}

#[rstest]
#[case(json!([{}]), json!({"id": 1, "firstName": "Ada"}))]
#[case(json!([{"view": "ids"}]), json!({"id": 1}))]
#[case(json!([{"view": "none"}]), json!({"id": 1, "firstName": "Ada", "ssn": "111"}))]
fn result_view_overrides_declared_view(
    registry: Arc<Registry>,
    #[case] data: Value,
    #[case] first: Value,
) {
    let outcome = run(registry, &call("person", "loadPublic", 12, data));
    let result = outcome.response().result().expect("result");
    assert_eq!(result.pointer("/records/0"), Some(&first));
    assert_eq!(result.get("total"), Some(&json!(2)));
}

#[rstest]
fn list_results_are_projected(registry: Arc<Registry>) {
    let outcome = run(registry, &call("person", "names", 13, Value::Null));
    assert_eq!(
        outcome.response().result(),
        Some(&json!([
            {"id": 1, "firstName": "Ada"},
            {"id": 2, "firstName": "Grace"}
        ]))
    );
}

#[rstest]
fn shape_mismatch_fails_the_call(registry: Arc<Registry>) {
    let outcome = run(registry, &call("person", "count", 14, Value::Null));
    assert_eq!(outcome.final_state(), CallState::Failed);
    assert_eq!(outcome.states().len(), 4);
}

#[rstest]
#[case(r#"{"ok":true}"#, Some(json!({"ok": true})))]
#[case("{not json", None)]
fn raw_output_must_be_json(
    registry: Arc<Registry>,
    #[case] text: &str,
    #[case] expected: Option<Value>,
) {
    let outcome = run(registry, &call("person", "raw", 15, json!([text])));
    assert_eq!(outcome.response().result().cloned(), expected);
}

// ----------------------------------------------------------------------------
// Batches
// ----------------------------------------------------------------------------

#[rstest]
fn batch_responses_follow_request_order(registry: Arc<Registry>) {
    let batch = Batch::from_value(json!([
        {"action": "greeter", "method": "greet", "tid": 3, "data": ["A"]},
        {"action": "ghost", "method": "boo", "tid": 1, "data": null},
        {"action": "greeter", "method": "greet", "tid": 3, "data": ["B"]},
        {"action": "mission", "method": "explode", "tid": 2}
    ]))
    .expect("batch");
    let envelope = dispatcher(registry).dispatch(&batch, &NoTransport);
    let responses = envelope.responses();
    assert_eq!(responses.len(), 4);
    let tids: Vec<_> = responses.iter().map(Response::tid).collect();
    assert_eq!(tids, vec![Some(3), Some(1), Some(3), Some(2)]);
    let kinds: Vec<_> = responses.iter().map(Response::kind).collect();
    assert_eq!(kinds, vec!["rpc", "exception", "rpc", "exception"]);
    assert_eq!(responses.first().and_then(Response::result), Some(&json!("hello A x1")));
}

#[rstest]
fn handle_batch_answers_each_call(registry: Arc<Registry>) {
    let calls = vec![
        call("greeter", "greet", 10, json!(["A"])),
        call("greeter", "wave", 11, json!([])),
        call("greeter", "greet", 12, json!(["B", 3])),
    ];
    let responses = dispatcher(registry).handle_batch(calls, &NoTransport);
    let tids: Vec<_> = responses.iter().map(Response::tid).collect();
    assert_eq!(tids, vec![Some(10), Some(11), Some(12)]);
    let failed: Vec<_> = responses.iter().map(Response::is_exception).collect();
    assert_eq!(failed, vec![false, true, false]);
    assert_eq!(responses.last().and_then(Response::result), Some(&json!("hello B x3")));
}

#[rstest]
fn malformed_entry_gets_its_own_exception(registry: Arc<Registry>) {
    let batch = Batch::from_value(json!([
        {"action": "greeter", "method": "greet", "tid": 1, "data": ["A"]},
        {"action": "greeter", "tid": 2}
    ]))
    .expect("batch");
    let outcomes = dispatcher(registry).dispatch_outcomes(&batch, &NoTransport);
    let last = outcomes.last().expect("second outcome");
    assert_eq!(last.states(), &[CallState::Pending, CallState::Failed]);
    assert_eq!(last.response().tid(), Some(2));
    assert_eq!(last.response().action(), "greeter");
    assert_eq!(last.response().method(), "");
}

#[rstest]
fn parallel_mode_preserves_order() {
    let started = Arc::new(AtomicUsize::new(0));
    let mut builder = RegistryBuilder::new();
    let counter = Arc::clone(&started);
    builder
        .register_fn(
            HandlerDescriptor::new("clock", "wait", CallStyle::Simple)
                .param(ParamSpec::required("millis", ParamType::Int)),
            move |call: &HandlerCall<'_>| {
                counter.fetch_add(1, Ordering::SeqCst);
                let millis = call.arguments().int("millis").unwrap_or_default();
                thread::sleep(Duration::from_millis(u64::try_from(millis).unwrap_or_default()));
                HandlerOutput::single(&millis)
            },
        )
        .expect("clock.wait");
    let dispatcher = Dispatcher::new(
        Arc::new(builder.build().expect("registry")),
        DispatcherOptions::default().with_mode(DispatchMode::Parallel),
    );
    let batch = Batch::from_calls([
        call("clock", "wait", 1, json!([40])),
        call("clock", "wait", 2, json!([0])),
        call("clock", "wait", 3, json!([20])),
    ]);
    let envelope = dispatcher.dispatch(&batch, &NoTransport);
    let results: Vec<_> = envelope
        .responses()
        .iter()
        .filter_map(Response::result)
        .cloned()
        .collect();
    assert_eq!(results, vec![json!(40), json!(0), json!(20)]);
    assert_eq!(started.load(Ordering::SeqCst), 3);
}

fn thread_reporter() -> Arc<Registry> {
    let mut builder = RegistryBuilder::new();
    builder
        .register_fn(
            HandlerDescriptor::new("worker", "thread", CallStyle::Simple),
            |_call: &HandlerCall<'_>| {
                HandlerOutput::single(&thread::current().name().unwrap_or("unnamed").to_owned())
            },
        )
        .expect("worker.thread");
    Arc::new(builder.build().expect("registry"))
}

#[rstest]
fn unstartable_workers_fall_back_to_the_calling_thread() {
    let dispatcher = Dispatcher::new(
        thread_reporter(),
        DispatcherOptions::default()
            .with_mode(DispatchMode::Parallel)
            .with_worker_stack_size(1 << 50),
    );
    let caller = thread::current().name().map(str::to_owned);
    let responses = dispatcher.handle_batch(
        vec![
            call("worker", "thread", 1, json!([])),
            call("worker", "thread", 2, json!([])),
        ],
        &NoTransport,
    );
    let tids: Vec<_> = responses.iter().map(Response::tid).collect();
    assert_eq!(tids, vec![Some(1), Some(2)]);
    for response in &responses {
        assert!(!response.is_exception(), "unexpected exception: {response:?}");
        assert_eq!(
            response.result().and_then(Value::as_str),
            Some(caller.as_deref().unwrap_or("unnamed"))
        );
    }
}

#[rstest]
fn started_workers_are_named() {
    let dispatcher = Dispatcher::new(
        thread_reporter(),
        DispatcherOptions::default().with_mode(DispatchMode::Parallel),
    );
    let responses = dispatcher.handle_batch(
        vec![
            call("worker", "thread", 1, json!([])),
            call("worker", "thread", 2, json!([])),
        ],
        &NoTransport,
    );
    let names: Vec<_> = responses
        .iter()
        .filter_map(|response| response.result().and_then(Value::as_str))
        .collect();
    assert_eq!(names, vec!["batchrpc-call", "batchrpc-call"]);
}

#[rstest]
fn worker_limit_caps_concurrent_calls() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut builder = RegistryBuilder::new();
    let (active, highest) = (Arc::clone(&running), Arc::clone(&peak));
    builder
        .register_fn(
            HandlerDescriptor::new("clock", "hold", CallStyle::Simple),
            move |_call: &HandlerCall<'_>| {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                highest.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(10));
                active.fetch_sub(1, Ordering::SeqCst);
                HandlerOutput::single(&now)
            },
        )
        .expect("clock.hold");
    let limit = NonZeroUsize::new(2).expect("non-zero");
    let dispatcher = Dispatcher::new(
        Arc::new(builder.build().expect("registry")),
        DispatcherOptions::default()
            .with_mode(DispatchMode::Parallel)
            .with_worker_limit(limit),
    );
    let calls = (1..=5).map(|tid| call("clock", "hold", tid, json!([]))).collect();
    let responses = dispatcher.handle_batch(calls, &NoTransport);
    assert_eq!(responses.len(), 5);
    assert!(responses.iter().all(|response| !response.is_exception()));
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[rstest]
fn options_follow_configuration() {
    let config = Config {
        generic_error_message: "Unavailable".to_owned(),
        dispatch_mode: DispatchMode::Parallel,
        ..Config::default()
    };
    let options = DispatcherOptions::from_config(&config);
    assert_eq!(options.generic_message(), "Unavailable");
    assert_eq!(options.mode(), DispatchMode::Parallel);
}
