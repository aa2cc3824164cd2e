//! Conversion of raw JSON values into declared parameter types.

use serde_json::Value;
use time::macros::format_description;
use time::{Date, PrimitiveDateTime};

use crate::descriptor::{ParamSpec, ParamType};
use crate::error::CallError;

use super::BoundValue;

const MAX_RENDERED_CHARS: usize = 64;

/// Coerces `value` into the type declared by `spec`.
pub(super) fn coerce(spec: &ParamSpec, value: &Value) -> Result<BoundValue, CallError> {
    let converted = match spec.param_type() {
        ParamType::String => string(value).map(BoundValue::String),
        ParamType::Int => int(value).map(BoundValue::Int),
        ParamType::Float => float(value).map(BoundValue::Float),
        ParamType::Bool => boolean(value).map(BoundValue::Bool),
        ParamType::Date => text(value).and_then(date).map(BoundValue::Date),
        ParamType::DateTime => text(value).and_then(datetime).map(BoundValue::DateTime),
        ParamType::Json => Some(BoundValue::Json(value.clone())),
    };
    converted.ok_or_else(|| CallError::coercion(spec.name(), spec.param_type(), render(value)))
}

/// Whether a supplied value counts as "not supplied" for the given type.
pub(super) fn is_absent(value: &Value, param_type: ParamType) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => param_type != ParamType::String && text.trim().is_empty(),
        _ => false,
    }
}

fn text(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim)
}

fn string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|parsed| parsed.is_finite()),
        _ => None,
    }
}

fn boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => match number.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "on" | "yes" | "1" => Some(true),
            "false" | "off" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn date(input: &str) -> Option<Date> {
    Date::parse(input, format_description!("[year]-[month]-[day]")).ok()
}

fn datetime(input: &str) -> Option<PrimitiveDateTime> {
    PrimitiveDateTime::parse(
        input,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    )
    .or_else(|_| {
        PrimitiveDateTime::parse(
            input,
            format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        )
    })
    .ok()
}

fn render(value: &Value) -> String {
    let rendered = value.to_string();
    if rendered.chars().count() <= MAX_RENDERED_CHARS {
        return rendered;
    }
    let mut clipped: String = rendered.chars().take(MAX_RENDERED_CHARS).collect();
    clipped.push('…');
    clipped
}
