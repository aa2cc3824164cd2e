//! Binding of call payloads onto declared handler parameters.
//!
//! The calling style decides where body parameters are read from:
//!
//! - `Simple` handlers receive the payload array positionally.
//! - `Form` and `Poll` handlers receive the payload object by field name.
//! - `StoreRead` handlers receive a parsed [`ReadRequest`]; any extra
//!   request fields bind to body parameters by name.
//! - `StoreModify` handlers receive the submitted records.
//!
//! Parameters with a header, cookie or query source are read through the
//! [`TransportContext`]. A `null` value counts as absent, so the declared
//! default applies before the required check.

mod coerce;

use serde_json::{Map, Value};
use time::{Date, PrimitiveDateTime};

use crate::context::TransportContext;
use crate::descriptor::{CallStyle, HandlerDescriptor, ParamSource, ParamSpec};
use crate::error::CallError;
use crate::store::ReadRequest;

/// A parameter value after coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    /// Optional parameter with no value.
    Null,
    /// Text value.
    String(String),
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Boolean value.
    Bool(bool),
    /// Calendar date.
    Date(Date),
    /// Date and time.
    DateTime(PrimitiveDateTime),
    /// Untyped JSON.
    Json(Value),
}

impl BoundValue {
    /// Whether the value is [`BoundValue::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Text content.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text),
            _ => None,
        }
    }

    /// Integer content.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(number) => Some(*number),
            _ => None,
        }
    }

    /// Float content.
    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(number) => Some(*number),
            _ => None,
        }
    }

    /// Boolean content.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    /// Date content.
    #[must_use]
    pub const fn as_date(&self) -> Option<Date> {
        match self {
            Self::Date(date) => Some(*date),
            _ => None,
        }
    }

    /// Date-time content.
    #[must_use]
    pub const fn as_datetime(&self) -> Option<PrimitiveDateTime> {
        match self {
            Self::DateTime(moment) => Some(*moment),
            _ => None,
        }
    }

    /// JSON content.
    #[must_use]
    pub const fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }
}

/// Bound arguments in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArguments {
    values: Vec<(String, BoundValue)>,
}

impl BoundArguments {
    /// Looks up an argument by parameter name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&BoundValue> {
        self.values
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, value)| value)
    }

    /// Looks up an argument by declaration position.
    #[must_use]
    pub fn positional(&self, index: usize) -> Option<&BoundValue> {
        self.values.get(index).map(|(_, value)| value)
    }

    /// Text argument.
    #[must_use]
    pub fn string(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(BoundValue::as_str)
    }

    /// Integer argument.
    #[must_use]
    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(BoundValue::as_int)
    }

    /// Float argument.
    #[must_use]
    pub fn float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(BoundValue::as_float)
    }

    /// Boolean argument.
    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(BoundValue::as_bool)
    }

    /// Date argument.
    #[must_use]
    pub fn date(&self, name: &str) -> Option<Date> {
        self.get(name).and_then(BoundValue::as_date)
    }

    /// Date-time argument.
    #[must_use]
    pub fn datetime(&self, name: &str) -> Option<PrimitiveDateTime> {
        self.get(name).and_then(BoundValue::as_datetime)
    }

    /// JSON argument.
    #[must_use]
    pub fn json(&self, name: &str) -> Option<&Value> {
        self.get(name).and_then(BoundValue::as_json)
    }

    /// Iterates `(name, value)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BoundValue)> {
        self.values
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Number of bound arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no arguments were bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Everything the binder extracts for one call.
#[derive(Debug, Default)]
pub(crate) struct Binding {
    pub(crate) arguments: BoundArguments,
    pub(crate) read_request: Option<ReadRequest>,
    pub(crate) records: Vec<Value>,
}

enum Body<'a> {
    Positional(Vec<&'a Value>),
    Named(Option<&'a Map<String, Value>>),
}

impl Body<'_> {
    fn take(&self, name: &str, position: &mut usize) -> Option<Value> {
        match self {
            Self::Positional(values) => {
                let value = values.get(*position).map(|value| (*value).clone());
                *position += 1;
                value
            }
            Self::Named(fields) => fields.and_then(|map| map.get(name)).cloned(),
        }
    }
}

/// Binds `data` onto the parameters declared by `descriptor`.
pub(crate) fn bind(
    descriptor: &HandlerDescriptor,
    data: &Value,
    transport: &dyn TransportContext,
) -> Result<Binding, CallError> {
    let read_request = match descriptor.style() {
        CallStyle::StoreRead => Some(ReadRequest::from_payload(data)?),
        _ => None,
    };
    let records = match descriptor.style() {
        CallStyle::StoreModify => modified_records(data),
        _ => Vec::new(),
    };

    let body = match descriptor.style() {
        CallStyle::Simple => Body::Positional(positional(data)),
        CallStyle::Form | CallStyle::Poll => Body::Named(named(data)),
        CallStyle::StoreRead => Body::Named(read_request.as_ref().map(ReadRequest::params)),
        CallStyle::StoreModify => Body::Named(None),
    };

    let mut position = 0;
    let mut values = Vec::with_capacity(descriptor.params().len());
    for spec in descriptor.params() {
        let raw = match spec.source() {
            ParamSource::Body => body.take(spec.name(), &mut position),
            ParamSource::Query => transport.query_value(spec.name()).map(Value::String),
            ParamSource::Header => transport.header_value(spec.name()).map(Value::String),
            ParamSource::Cookie => transport.cookie_value(spec.name()).map(Value::String),
        };
        values.push((spec.name().to_owned(), resolve(spec, raw)?));
    }

    Ok(Binding {
        arguments: BoundArguments { values },
        read_request,
        records,
    })
}

fn resolve(spec: &ParamSpec, raw: Option<Value>) -> Result<BoundValue, CallError> {
    let supplied = raw.filter(|value| !coerce::is_absent(value, spec.param_type()));
    match supplied.as_ref().or(spec.default_value()) {
        Some(value) => coerce::coerce(spec, value),
        None if spec.is_required() => Err(CallError::missing(spec.name())),
        None => Ok(BoundValue::Null),
    }
}

fn positional(data: &Value) -> Vec<&Value> {
    match data {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn named(data: &Value) -> Option<&Map<String, Value>> {
    match data {
        Value::Object(fields) => Some(fields),
        Value::Array(items) => items.first().and_then(Value::as_object),
        _ => None,
    }
}

fn modified_records(data: &Value) -> Vec<Value> {
    match data {
        Value::Array(items) => match items.as_slice() {
            [Value::Array(records)] => records.clone(),
            _ => items.clone(),
        },
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

#[cfg(test)]
mod tests;
