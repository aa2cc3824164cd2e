//! Parsing of store read requests.
//!
//! Grid clients are loose about encoding: paging numbers often arrive as
//! strings, sorting may use the legacy `sort`/`dir` pair or a list of sorter
//! objects, and grouping may use `groupBy`/`groupDir` or a `group` list. The
//! modern list form wins when both are present.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::descriptor::ParamType;
use crate::error::CallError;

const RESERVED_FIELDS: [&str; 10] = [
    "query", "start", "limit", "page", "sort", "dir", "group", "groupBy", "groupDir", "filter",
];

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    /// Ascending order.
    #[default]
    Asc,
    /// Descending order.
    Desc,
}

impl SortDirection {
    /// Parses a direction; anything other than `desc` (any case) is ascending.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        if input.trim().eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }

    /// Applies the direction to an ascending comparison.
    #[must_use]
    pub const fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

/// One sort or group key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    property: String,
    direction: SortDirection,
}

impl SortSpec {
    /// Creates a key.
    #[must_use]
    pub fn new(property: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            property: property.into(),
            direction,
        }
    }

    /// Record property name.
    #[must_use]
    pub fn property(&self) -> &str {
        &self.property
    }

    /// Direction.
    #[must_use]
    pub const fn direction(&self) -> SortDirection {
        self.direction
    }
}

/// One filter condition, left for the handler to interpret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    property: String,
    value: Value,
}

impl FilterSpec {
    /// Creates a filter.
    #[must_use]
    pub fn new(property: impl Into<String>, value: Value) -> Self {
        Self {
            property: property.into(),
            value,
        }
    }

    /// Filtered property.
    #[must_use]
    pub fn property(&self) -> &str {
        &self.property
    }

    /// Filter value.
    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.value
    }
}

/// A field of a read request could not be interpreted.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("read request field '{field}' expects {expected}, received {received}")]
pub struct ReadRequestError {
    field: String,
    expected: ParamType,
    received: String,
}

impl ReadRequestError {
    fn new(field: &str, expected: ParamType, received: &Value) -> Self {
        Self {
            field: field.to_owned(),
            expected,
            received: received.to_string(),
        }
    }

    /// Offending field.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }
}

impl From<ReadRequestError> for CallError {
    fn from(error: ReadRequestError) -> Self {
        Self::coercion(error.field, error.expected, error.received)
    }
}

/// Paging, sorting, grouping and filtering parameters of a store read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadRequest {
    query: Option<String>,
    start: Option<usize>,
    limit: Option<usize>,
    page: Option<usize>,
    sorters: Vec<SortSpec>,
    groups: Vec<SortSpec>,
    filters: Vec<FilterSpec>,
    params: Map<String, Value>,
}

impl ReadRequest {
    /// Creates an empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the record offset.
    #[must_use]
    pub const fn with_start(mut self, start: usize) -> Self {
        self.start = Some(start);
        self
    }

    /// Sets the page size.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the 1-based page number.
    #[must_use]
    pub const fn with_page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    /// Sets the free-text query.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Appends a sort key.
    #[must_use]
    pub fn sorted_by(mut self, property: impl Into<String>, direction: SortDirection) -> Self {
        self.sorters.push(SortSpec::new(property, direction));
        self
    }

    /// Appends a group key.
    #[must_use]
    pub fn grouped_by(mut self, property: impl Into<String>, direction: SortDirection) -> Self {
        self.groups.push(SortSpec::new(property, direction));
        self
    }

    /// Appends a filter.
    #[must_use]
    pub fn filtered_by(mut self, property: impl Into<String>, value: Value) -> Self {
        self.filters.push(FilterSpec::new(property, value));
        self
    }

    /// Adds a non-reserved request field.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    /// Extracts the request from a call payload: an object, a one-element
    /// array holding an object, or nothing at all.
    ///
    /// # Errors
    ///
    /// Returns [`ReadRequestError`] when a paging field is not a
    /// non-negative integer or a sorter list is not a list of objects.
    pub fn from_payload(data: &Value) -> Result<Self, ReadRequestError> {
        match data {
            Value::Object(fields) => Self::from_fields(fields),
            Value::Array(items) => match items.first() {
                Some(Value::Object(fields)) => Self::from_fields(fields),
                Some(other) if !other.is_null() => {
                    Err(ReadRequestError::new("readRequest", ParamType::Json, other))
                }
                _ => Ok(Self::default()),
            },
            Value::Null => Ok(Self::default()),
            other => Err(ReadRequestError::new("readRequest", ParamType::Json, other)),
        }
    }

    fn from_fields(fields: &Map<String, Value>) -> Result<Self, ReadRequestError> {
        let query = match fields.get("query") {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(text.clone()),
            Some(other) => Some(other.to_string()),
        };

        let sorters = keys(fields, "sort", "dir")?;
        let groups = match keys(fields, "group", "groupDir")? {
            list if list.is_empty() => keys(fields, "groupBy", "groupDir")?,
            list => list,
        };

        let params = fields
            .iter()
            .filter(|(name, _)| !RESERVED_FIELDS.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Ok(Self {
            query,
            start: count(fields, "start")?,
            limit: count(fields, "limit")?,
            page: count(fields, "page")?,
            sorters,
            groups,
            filters: filters(fields.get("filter")),
            params,
        })
    }

    /// Free-text query.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Record offset.
    #[must_use]
    pub const fn start(&self) -> Option<usize> {
        self.start
    }

    /// Page size.
    #[must_use]
    pub const fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// 1-based page number.
    #[must_use]
    pub const fn page(&self) -> Option<usize> {
        self.page
    }

    /// Offset implied by `start`, or by `page` and `limit` when `start` is
    /// absent.
    #[must_use]
    pub fn effective_start(&self) -> Option<usize> {
        self.start.or_else(|| {
            let page = self.page?;
            let limit = self.limit?;
            Some(page.saturating_sub(1).saturating_mul(limit))
        })
    }

    /// Sort keys in priority order.
    #[must_use]
    pub fn sorters(&self) -> &[SortSpec] {
        &self.sorters
    }

    /// Group keys in priority order.
    #[must_use]
    pub fn groups(&self) -> &[SortSpec] {
        &self.groups
    }

    /// Filter conditions.
    #[must_use]
    pub fn filters(&self) -> &[FilterSpec] {
        &self.filters
    }

    /// Non-reserved request fields, available for named parameter binding.
    #[must_use]
    pub const fn params(&self) -> &Map<String, Value> {
        &self.params
    }
}

fn count(fields: &Map<String, Value>, name: &str) -> Result<Option<usize>, ReadRequestError> {
    let Some(value) = fields.get(name) else {
        return Ok(None);
    };
    let parsed = match value {
        Value::Null => return Ok(None),
        Value::String(text) if text.trim().is_empty() => return Ok(None),
        Value::Number(number) => number.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(text) => text.trim().parse::<usize>().ok(),
        _ => None,
    };
    parsed
        .map(Some)
        .ok_or_else(|| ReadRequestError::new(name, ParamType::Int, value))
}

/// Reads sort or group keys from `list_field`: either a list of sorter
/// objects or a single property name paired with `direction_field`.
fn keys(
    fields: &Map<String, Value>,
    list_field: &str,
    direction_field: &str,
) -> Result<Vec<SortSpec>, ReadRequestError> {
    let legacy_direction = fields
        .get(direction_field)
        .and_then(Value::as_str)
        .map(SortDirection::parse)
        .unwrap_or_default();

    match fields.get(list_field) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| sorter(list_field, item))
            .collect(),
        Some(Value::String(property)) if !property.is_empty() => {
            Ok(vec![SortSpec::new(property.as_str(), legacy_direction)])
        }
        None | Some(Value::Null | Value::String(_)) => Ok(Vec::new()),
        Some(other) => Err(ReadRequestError::new(list_field, ParamType::Json, other)),
    }
}

fn sorter(field: &str, item: &Value) -> Result<SortSpec, ReadRequestError> {
    let property = item
        .get("property")
        .and_then(Value::as_str)
        .ok_or_else(|| ReadRequestError::new(field, ParamType::Json, item))?;
    let direction = item
        .get("direction")
        .and_then(Value::as_str)
        .map(SortDirection::parse)
        .unwrap_or_default();
    Ok(SortSpec::new(property, direction))
}

fn filters(value: Option<&Value>) -> Vec<FilterSpec> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let property = item.get("property").and_then(Value::as_str)?;
            let operand = item.get("value").cloned().unwrap_or(Value::Null);
            Some(FilterSpec::new(property, operand))
        })
        .collect()
}
