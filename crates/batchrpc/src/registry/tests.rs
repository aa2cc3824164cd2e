//! Unit tests for the handler registry.

use rstest::{fixture, rstest};
use serde_json::json;

use super::*;
use crate::descriptor::{CallStyle, ParamSpec, ParamType};

// ----------------------------------------------------------------------------
// Fixtures
// ----------------------------------------------------------------------------

fn echo(call: &HandlerCall<'_>) -> Result<HandlerOutput, HandlerFailure> {
    Ok(HandlerOutput::Single(call.data().clone()))
}

fn descriptor(action: &str, method: &str) -> HandlerDescriptor {
    HandlerDescriptor::new(action, method, CallStyle::Simple)
}

#[fixture]
fn builder() -> RegistryBuilder {
    let mut builder = RegistryBuilder::new();
    builder
        .register_fn(descriptor("person", "load"), echo)
        .expect("register person.load");
    builder
        .register_fn(
            descriptor("person", "find").param(ParamSpec::required("id", ParamType::Int)),
            echo,
        )
        .expect("register person.find");
    builder
        .register_fn(descriptor("audit", "log"), echo)
        .expect("register audit.log");
    builder
}

// ----------------------------------------------------------------------------
// Registration
// ----------------------------------------------------------------------------

#[rstest]
fn rejects_duplicate_registration(mut builder: RegistryBuilder) {
    let error = builder
        .register_fn(descriptor("person", "load"), echo)
        .expect_err("duplicate");
    assert_eq!(error, RegistryError::duplicate("person", "load"));
}

#[rstest]
fn same_method_under_another_action_is_distinct(mut builder: RegistryBuilder) {
    builder
        .register_fn(descriptor("company", "load"), echo)
        .expect("distinct action");
    let registry = builder.build().expect("build");
    assert_eq!(registry.len(), 4);
}

#[rstest]
fn rejects_malformed_descriptor(mut builder: RegistryBuilder) {
    let error = builder
        .register_fn(descriptor("", "load"), echo)
        .expect_err("empty action");
    assert!(matches!(error, RegistryError::MalformedDescriptor { .. }));
}

#[rstest]
fn rejects_unregistered_view(mut builder: RegistryBuilder) {
    builder
        .register_fn(descriptor("person", "summary").view("summary"), echo)
        .expect("register");
    let error = builder.build().expect_err("missing view");
    assert!(error.to_string().contains("view 'summary' is not registered"));
}

#[rstest]
fn rejects_duplicate_view(mut builder: RegistryBuilder) {
    builder
        .register_view("summary", ["id"])
        .expect("first view");
    assert_eq!(
        builder.register_view("summary", ["name"]),
        Err(RegistryError::DuplicateView {
            view: "summary".to_owned()
        })
    );
}

// ----------------------------------------------------------------------------
// Lookup
// ----------------------------------------------------------------------------

#[rstest]
fn lookup_resolves_registered_pair(builder: RegistryBuilder) {
    let registry = builder.build().expect("build");
    let entry = registry.lookup("person", "find").expect("person.find");
    assert_eq!(entry.descriptor().params().len(), 1);
}

#[rstest]
#[case("person", "Load")]
#[case("Person", "load")]
#[case("person", "destroy")]
#[case("ghost", "load")]
fn lookup_is_exact(builder: RegistryBuilder, #[case] action: &str, #[case] method: &str) {
    let registry = builder.build().expect("build");
    let error = registry.lookup(action, method).expect_err("not found");
    assert!(matches!(error, CallError::HandlerNotFound { .. }));
}

#[rstest]
fn actions_iterate_in_name_order(builder: RegistryBuilder) {
    let registry = builder.build().expect("build");
    let listing: Vec<(String, Vec<String>)> = registry
        .actions()
        .map(|(action, methods)| {
            (
                action.to_owned(),
                methods.map(|m| m.method().to_owned()).collect(),
            )
        })
        .collect();
    assert_eq!(
        listing,
        vec![
            ("audit".to_owned(), vec!["log".to_owned()]),
            (
                "person".to_owned(),
                vec!["find".to_owned(), "load".to_owned()]
            ),
        ]
    );
}

// ----------------------------------------------------------------------------
// Views
// ----------------------------------------------------------------------------

#[test]
fn view_keeps_only_listed_fields() {
    let mut builder = RegistryBuilder::new();
    builder
        .register_view("summary", ["id", "lastName"])
        .expect("view");
    let registry = builder.build().expect("build");
    let view = registry.view("summary").expect("summary view");
    let projected = view.project(json!({"id": 1, "lastName": "Ng", "ssn": "secret"}));
    assert_eq!(projected, json!({"id": 1, "lastName": "Ng"}));
    assert_eq!(view.project(json!(7)), json!(7));
}
