//! Crate-level integration and BDD tests.


use std::sync::Arc;

use serde_json::{Value, json};

use crate::{
    Batch, CallStyle, Dispatcher, DispatcherOptions, HandlerCall, HandlerDescriptor, HandlerFailure,
    HandlerOutput, NoTransport, ParamSpec, ParamType, Registry,
};

fn echo(call: &HandlerCall<'_>) -> Result<HandlerOutput, HandlerFailure> {
    let text = call.arguments().string("text").unwrap_or_default();
    HandlerOutput::single(&text.to_uppercase())
}

#[test]
fn end_to_end_batch_round_trip() {
    let mut builder = Registry::builder();
    builder
        .register_fn(
            HandlerDescriptor::new("echo", "shout", CallStyle::Simple)
                .param(ParamSpec::required("text", ParamType::String)),
            echo,
        )
        .expect("echo.shout");
    let registry = Arc::new(builder.build().expect("registry"));
    let dispatcher = Dispatcher::new(registry, DispatcherOptions::default());

    let body = br#"[
        {"action":"echo","method":"shout","type":"rpc","tid":4,"data":["quiet"]},
        {"action":"echo","method":"whisper","type":"rpc","tid":5,"data":null}
    ]"#;
    let batch = Batch::parse(body).expect("parse batch");
    let envelope = dispatcher.dispatch(&batch, &NoTransport);

    let mut line = Vec::new();
    envelope.write_line(&mut line).expect("write envelope");
    assert_eq!(line.last(), Some(&b'\n'));
    let parsed: Value = serde_json::from_slice(&line).expect("parse envelope");
    assert_eq!(
        parsed,
        json!([
            {"action":"echo","method":"shout","type":"rpc","tid":4,"result":"QUIET"},
            {"action":"echo","method":"whisper","type":"exception","tid":5,"message":"Server Error","where":null}
        ])
    );
}
