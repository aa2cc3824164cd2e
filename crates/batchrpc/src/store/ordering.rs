//! Comparators used to sort store records by named property.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

/// Compares two records by a named property.
///
/// Returning `None` means the property is unknown; the processor then treats
/// the key as neutral and leaves the relative order untouched.
pub trait RecordOrdering<T> {
    /// Ascending comparison of `left` and `right` by `property`.
    fn compare(&self, property: &str, left: &T, right: &T) -> Option<Ordering>;
}

type Comparator<T> = Box<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Table of comparators for typed records, keyed by property name.
pub struct FieldOrderings<T> {
    comparators: HashMap<String, Comparator<T>>,
}

impl<T> FieldOrderings<T> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            comparators: HashMap::new(),
        }
    }

    /// Registers an ascending comparator for `property`.
    #[must_use]
    pub fn with<F>(mut self, property: impl Into<String>, comparator: F) -> Self
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        self.comparators.insert(property.into(), Box::new(comparator));
        self
    }

    /// Registers a comparator that orders by a derived key.
    #[must_use]
    pub fn by_key<K, F>(self, property: impl Into<String>, key: F) -> Self
    where
        K: Ord,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.with(property, move |left, right| key(left).cmp(&key(right)))
    }

    /// Whether a comparator exists for `property`.
    #[must_use]
    pub fn contains(&self, property: &str) -> bool {
        self.comparators.contains_key(property)
    }
}

impl<T> Default for FieldOrderings<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for FieldOrderings<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut properties: Vec<&str> = self.comparators.keys().map(String::as_str).collect();
        properties.sort_unstable();
        formatter
            .debug_struct("FieldOrderings")
            .field("properties", &properties)
            .finish()
    }
}

impl<T> RecordOrdering<T> for FieldOrderings<T> {
    fn compare(&self, property: &str, left: &T, right: &T) -> Option<Ordering> {
        self.comparators
            .get(property)
            .map(|comparator| comparator(left, right))
    }
}

/// Orders JSON object records by their fields.
///
/// Missing fields compare as `null`. Values of different kinds order as
/// null, boolean, number, string, array, object.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFieldOrdering;

impl RecordOrdering<Value> for JsonFieldOrdering {
    fn compare(&self, property: &str, left: &Value, right: &Value) -> Option<Ordering> {
        let left_field = left.get(property).unwrap_or(&Value::Null);
        let right_field = right.get(property).unwrap_or(&Value::Null);
        Some(compare_json(left_field, right_field))
    }
}

const fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values.
#[must_use]
pub fn compare_json(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = a.as_f64().unwrap_or_default();
                let y = b.as_f64().unwrap_or_default();
                x.total_cmp(&y)
            }
        },
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => a
            .iter()
            .zip(b)
            .map(|(x, y)| compare_json(x, y))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        _ => rank(left).cmp(&rank(right)),
    }
}
