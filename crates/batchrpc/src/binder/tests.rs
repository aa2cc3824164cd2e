//! Unit tests for parameter binding.

use mockall::predicate::eq;
use rstest::{fixture, rstest};
use serde_json::{Value, json};
use time::macros::{date, datetime};

use super::*;
use crate::context::{MockTransportContext, NoTransport};
use crate::descriptor::ParamType;

// ----------------------------------------------------------------------------
// Fixtures
// ----------------------------------------------------------------------------

#[fixture]
fn lookup() -> HandlerDescriptor {
    HandlerDescriptor::new("person", "lookup", CallStyle::Simple)
        .param(ParamSpec::required("id", ParamType::Int))
        .param(ParamSpec::optional("active", ParamType::Bool).with_default(true))
        .param(ParamSpec::optional("since", ParamType::Date))
}

fn bind_plain(descriptor: &HandlerDescriptor, data: &Value) -> Result<Binding, CallError> {
    bind(descriptor, data, &NoTransport)
}

// ----------------------------------------------------------------------------
// Positional binding
// ----------------------------------------------------------------------------

#[rstest]
fn binds_positional_arguments_in_order(lookup: HandlerDescriptor) {
    let binding = bind_plain(&lookup, &json!([7, "off", "2024-02-29"])).expect("binding");
    let args = &binding.arguments;
    assert_eq!(args.int("id"), Some(7));
    assert_eq!(args.bool("active"), Some(false));
    assert_eq!(args.date("since"), Some(date!(2024 - 02 - 29)));
    assert_eq!(args.positional(0), Some(&BoundValue::Int(7)));
}

#[rstest]
fn null_falls_back_to_default(lookup: HandlerDescriptor) {
    let binding = bind_plain(&lookup, &json!([1, null])).expect("binding");
    assert_eq!(binding.arguments.bool("active"), Some(true));
    assert_eq!(binding.arguments.get("since"), Some(&BoundValue::Null));
}

#[rstest]
fn missing_required_parameter_fails(lookup: HandlerDescriptor) {
    let error = bind_plain(&lookup, &json!([])).expect_err("missing id");
    assert!(matches!(
        error,
        CallError::MissingRequiredParameter { ref parameter } if parameter == "id"
    ));
}

#[rstest]
#[case(json!(["abc"]), "\"abc\"")]
#[case(json!([1.5]), "1.5")]
#[case(json!([true]), "true")]
fn non_numeric_id_fails_coercion(
    lookup: HandlerDescriptor,
    #[case] data: Value,
    #[case] rendered: &str,
) {
    match bind_plain(&lookup, &data) {
        Err(CallError::TypeCoercion {
            parameter,
            expected,
            received,
        }) => {
            assert_eq!(parameter, "id");
            assert_eq!(expected, ParamType::Int);
            assert_eq!(received, rendered);
        }
        other => panic!("expected coercion failure, got {other:?}"),
    }
}

#[rstest]
fn scalar_payload_is_the_first_argument(lookup: HandlerDescriptor) {
    let binding = bind_plain(&lookup, &json!(42)).expect("binding");
    assert_eq!(binding.arguments.int("id"), Some(42));
}

// ----------------------------------------------------------------------------
// Coercion
// ----------------------------------------------------------------------------

#[rstest]
#[case(ParamType::Int, json!("12"), BoundValue::Int(12))]
#[case(ParamType::Float, json!("2.5"), BoundValue::Float(2.5))]
#[case(ParamType::Bool, json!("yes"), BoundValue::Bool(true))]
#[case(ParamType::Bool, json!(0), BoundValue::Bool(false))]
#[case(ParamType::String, json!(10), BoundValue::String("10".to_owned()))]
#[case(
    ParamType::DateTime,
    json!("2023-11-05T08:30:00"),
    BoundValue::DateTime(datetime!(2023-11-05 08:30:00))
)]
#[case(ParamType::Json, json!({"a": [1]}), BoundValue::Json(json!({"a": [1]})))]
fn coerces_supported_types(
    #[case] param_type: ParamType,
    #[case] raw: Value,
    #[case] expected: BoundValue,
) {
    let descriptor = HandlerDescriptor::new("types", "check", CallStyle::Simple)
        .param(ParamSpec::required("value", param_type));
    let binding = bind_plain(&descriptor, &json!([raw])).expect("binding");
    assert_eq!(binding.arguments.get("value"), Some(&expected));
}

#[rstest]
#[case(ParamType::Date, json!("29/02/2024"))]
#[case(ParamType::Bool, json!("maybe"))]
#[case(ParamType::Float, json!("NaN"))]
#[case(ParamType::String, json!({"nested": true}))]
fn rejects_unconvertible_values(#[case] param_type: ParamType, #[case] raw: Value) {
    let descriptor = HandlerDescriptor::new("types", "check", CallStyle::Simple)
        .param(ParamSpec::required("value", param_type));
    let error = bind_plain(&descriptor, &json!([raw])).expect_err("coercion failure");
    assert_eq!(error.kind(), "type_coercion");
}

#[test]
fn blank_string_counts_as_absent_for_typed_parameters() {
    let descriptor = HandlerDescriptor::new("types", "check", CallStyle::Simple)
        .param(ParamSpec::optional("count", ParamType::Int).with_default("0"))
        .param(ParamSpec::optional("label", ParamType::String));
    let binding = bind_plain(&descriptor, &json!(["  ", ""])).expect("binding");
    assert_eq!(binding.arguments.int("count"), Some(0));
    assert_eq!(binding.arguments.string("label"), Some(""));
}

// ----------------------------------------------------------------------------
// Named and store styles
// ----------------------------------------------------------------------------

#[test]
fn form_binds_by_field_name() {
    let descriptor = HandlerDescriptor::new("profile", "save", CallStyle::Form)
        .param(ParamSpec::required("email", ParamType::String))
        .param(ParamSpec::optional("age", ParamType::Int));
    let binding = bind_plain(&descriptor, &json!({"age": "41", "email": "a@b.c"})).expect("binding");
    assert_eq!(binding.arguments.string("email"), Some("a@b.c"));
    assert_eq!(binding.arguments.int("age"), Some(41));
}

#[test]
fn store_read_binds_extra_request_fields() {
    let descriptor = HandlerDescriptor::new("person", "loadWithPaging", CallStyle::StoreRead)
        .param(ParamSpec::optional("no", ParamType::Int).with_default("0"))
        .param(ParamSpec::required("id", ParamType::Int));
    let binding = bind_plain(
        &descriptor,
        &json!([{"start": "10", "limit": "10", "id": 10}]),
    )
    .expect("binding");
    assert_eq!(binding.arguments.int("id"), Some(10));
    assert_eq!(binding.arguments.int("no"), Some(0));
    let request = binding.read_request.expect("read request");
    assert_eq!(request.start(), Some(10));
    assert_eq!(request.limit(), Some(10));
}

#[test]
fn store_read_rejects_non_numeric_limit() {
    let descriptor = HandlerDescriptor::new("person", "load", CallStyle::StoreRead);
    let error = bind_plain(&descriptor, &json!([{"limit": "ten"}])).expect_err("bad limit");
    assert!(matches!(
        error,
        CallError::TypeCoercion { ref parameter, .. } if parameter == "limit"
    ));
}

#[rstest]
#[case(json!([[{"id": 1}, {"id": 2}]]), 2)]
#[case(json!([{"id": 1}]), 1)]
#[case(json!({"id": 1}), 1)]
#[case(Value::Null, 0)]
fn store_modify_collects_records(#[case] data: Value, #[case] expected: usize) {
    let descriptor = HandlerDescriptor::new("person", "update", CallStyle::StoreModify);
    let binding = bind_plain(&descriptor, &data).expect("binding");
    assert_eq!(binding.records.len(), expected);
}

// ----------------------------------------------------------------------------
// Transport sources
// ----------------------------------------------------------------------------

#[test]
fn transport_sources_are_consulted_by_name() {
    let descriptor = HandlerDescriptor::new("session", "touch", CallStyle::Simple)
        .param(ParamSpec::required("id", ParamType::Int))
        .param(ParamSpec::required("agent", ParamType::String).from_source(ParamSource::Header))
        .param(ParamSpec::optional("session", ParamType::String).from_source(ParamSource::Cookie))
        .param(ParamSpec::optional("page", ParamType::Int).from_source(ParamSource::Query));

    let mut transport = MockTransportContext::new();
    transport
        .expect_header_value()
        .with(eq("agent"))
        .times(1)
        .returning(|_| Some("cli/1.0".to_owned()));
    transport
        .expect_cookie_value()
        .with(eq("session"))
        .times(1)
        .returning(|_| None);
    transport
        .expect_query_value()
        .with(eq("page"))
        .times(1)
        .returning(|_| Some("3".to_owned()));

    let binding = bind(&descriptor, &json!([5]), &transport).expect("binding");
    assert_eq!(binding.arguments.int("id"), Some(5));
    assert_eq!(binding.arguments.string("agent"), Some("cli/1.0"));
    assert_eq!(binding.arguments.get("session"), Some(&BoundValue::Null));
    assert_eq!(binding.arguments.int("page"), Some(3));
}

#[test]
fn missing_required_header_fails() {
    let descriptor = HandlerDescriptor::new("session", "touch", CallStyle::Simple)
        .param(ParamSpec::required("token", ParamType::String).from_source(ParamSource::Header));
    let error = bind_plain(&descriptor, &Value::Null).expect_err("missing header");
    assert_eq!(error.kind(), "missing_required_parameter");
}
