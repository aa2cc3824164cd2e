//! Incoming calls, batch parsing, and the handler-facing call view.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::binder::{Binding, BoundArguments};
use crate::descriptor::{HandlerDescriptor, ReturnShape};
use crate::error::HandlerFailure;
use crate::store::{ReadRequest, StoreProcessor, StoreResult};

/// Client-assigned transaction id, echoed back unchanged.
pub type Tid = i64;

fn rpc_type() -> String {
    "rpc".to_owned()
}

/// One call within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    action: String,
    method: String,
    #[serde(rename = "type", default = "rpc_type")]
    kind: String,
    tid: Tid,
    #[serde(default)]
    data: Value,
}

impl Call {
    /// Creates an `rpc` call.
    #[must_use]
    pub fn new(action: impl Into<String>, method: impl Into<String>, tid: Tid, data: Value) -> Self {
        Self {
            action: action.into(),
            method: method.into(),
            kind: rpc_type(),
            tid,
            data,
        }
    }

    /// Target action.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Target method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Call type as sent by the client, normally `rpc`.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Transaction id.
    #[must_use]
    pub const fn tid(&self) -> Tid {
        self.tid
    }

    /// Raw payload.
    #[must_use]
    pub const fn data(&self) -> &Value {
        &self.data
    }
}

/// A batch element, either a well-formed call or the identifiers salvaged
/// from an element that could not be read.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEntry {
    /// Parsed call.
    Call(Call),
    /// Element that failed to parse.
    Malformed {
        /// Action name if one could be read.
        action: String,
        /// Method name if one could be read.
        method: String,
        /// Transaction id if one could be read.
        tid: Option<Tid>,
        /// Why the element was rejected.
        reason: String,
    },
}

impl BatchEntry {
    fn from_value(value: Value) -> Self {
        let field = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned()
        };
        let action = field("action");
        let method = field("method");
        let tid = value.get("tid").and_then(Value::as_i64);

        match serde_json::from_value::<Call>(value) {
            Ok(call) if call.action.trim().is_empty() || call.method.trim().is_empty() => {
                Self::Malformed {
                    action,
                    method,
                    tid,
                    reason: "action and method must be non-empty".to_owned(),
                }
            }
            Ok(call) => Self::Call(call),
            Err(error) => Self::Malformed {
                action,
                method,
                tid,
                reason: error.to_string(),
            },
        }
    }
}

/// Errors that reject a request before any call is dispatched.
#[derive(Debug, Error)]
pub enum BatchParseError {
    /// Request body is not JSON.
    #[error("request is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Request body is JSON but neither an object nor an array.
    #[error("request must be a call object or an array of calls")]
    NotABatch,
}

/// Ordered calls submitted together.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    entries: Vec<BatchEntry>,
    batched: bool,
}

impl Batch {
    /// Parses a request body.
    ///
    /// # Errors
    ///
    /// Returns [`BatchParseError`] when the body is not JSON or is neither an
    /// object nor an array. Individual malformed elements do not fail the
    /// batch; they become [`BatchEntry::Malformed`].
    pub fn parse(body: &[u8]) -> Result<Self, BatchParseError> {
        let value: Value = serde_json::from_slice(body)?;
        Self::from_value(value)
    }

    /// Builds a batch from an already-decoded request body.
    ///
    /// # Errors
    ///
    /// Returns [`BatchParseError::NotABatch`] for scalar bodies.
    pub fn from_value(value: Value) -> Result<Self, BatchParseError> {
        match value {
            Value::Array(items) => Ok(Self {
                entries: items.into_iter().map(BatchEntry::from_value).collect(),
                batched: true,
            }),
            Value::Object(_) => Ok(Self {
                entries: vec![BatchEntry::from_value(value)],
                batched: false,
            }),
            _ => Err(BatchParseError::NotABatch),
        }
    }

    /// Builds an array-form batch from calls.
    #[must_use]
    pub fn from_calls(calls: impl IntoIterator<Item = Call>) -> Self {
        Self {
            entries: calls.into_iter().map(BatchEntry::Call).collect(),
            batched: true,
        }
    }

    /// Entries in request order.
    #[must_use]
    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    /// Whether the request was an array.
    #[must_use]
    pub const fn is_batched(&self) -> bool {
        self.batched
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What a handler sees when it is invoked.
#[derive(Debug)]
pub struct HandlerCall<'a> {
    call: &'a Call,
    descriptor: &'a HandlerDescriptor,
    arguments: BoundArguments,
    read_request: Option<ReadRequest>,
    records: Vec<Value>,
}

impl<'a> HandlerCall<'a> {
    pub(crate) fn new(call: &'a Call, descriptor: &'a HandlerDescriptor, binding: Binding) -> Self {
        Self {
            call,
            descriptor,
            arguments: binding.arguments,
            read_request: binding.read_request,
            records: binding.records,
        }
    }

    /// Action name.
    #[must_use]
    pub fn action(&self) -> &str {
        self.call.action()
    }

    /// Method name.
    #[must_use]
    pub fn method(&self) -> &str {
        self.call.method()
    }

    /// Transaction id.
    #[must_use]
    pub const fn tid(&self) -> Tid {
        self.call.tid()
    }

    /// Raw call payload.
    #[must_use]
    pub const fn data(&self) -> &Value {
        self.call.data()
    }

    /// Descriptor the call resolved to.
    #[must_use]
    pub const fn descriptor(&self) -> &HandlerDescriptor {
        self.descriptor
    }

    /// Typed arguments in declaration order.
    #[must_use]
    pub const fn arguments(&self) -> &BoundArguments {
        &self.arguments
    }

    /// Store read request, for store-read handlers.
    #[must_use]
    pub const fn read_request(&self) -> Option<&ReadRequest> {
        self.read_request.as_ref()
    }

    /// Records submitted to a store-modify handler.
    #[must_use]
    pub fn records(&self) -> &[Value] {
        &self.records
    }

    /// Processor configured with the handler's grid schema, if any.
    #[must_use]
    pub fn store_processor(&self) -> StoreProcessor {
        self.descriptor
            .grid_schema()
            .map_or_else(StoreProcessor::new, |schema| {
                StoreProcessor::with_schema(schema.clone())
            })
    }
}

/// Value returned by a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutput {
    /// One value.
    Single(Value),
    /// A list of records.
    List(Vec<Value>),
    /// A processed store result.
    Store(StoreResult),
    /// Pre-serialized JSON text.
    Raw(String),
}

fn serialization_failure(error: serde_json::Error) -> HandlerFailure {
    HandlerFailure::new("serialization", error.to_string()).with_source(error)
}

impl HandlerOutput {
    /// Serializes one value.
    ///
    /// # Errors
    ///
    /// Returns a `serialization` failure when the value cannot be encoded.
    pub fn single<T: Serialize + ?Sized>(value: &T) -> Result<Self, HandlerFailure> {
        serde_json::to_value(value)
            .map(Self::Single)
            .map_err(serialization_failure)
    }

    /// Serializes a list of records.
    ///
    /// # Errors
    ///
    /// Returns a `serialization` failure when any record cannot be encoded.
    pub fn list<T: Serialize>(items: &[T]) -> Result<Self, HandlerFailure> {
        items
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Self::List)
            .map_err(serialization_failure)
    }

    /// Serializes a typed store result.
    ///
    /// # Errors
    ///
    /// Returns a `serialization` failure when any record cannot be encoded.
    pub fn store<T: Serialize>(result: StoreResult<T>) -> Result<Self, HandlerFailure> {
        result
            .into_json()
            .map(Self::Store)
            .map_err(serialization_failure)
    }

    /// Shape of this output.
    #[must_use]
    pub const fn shape(&self) -> ReturnShape {
        match self {
            Self::Single(_) => ReturnShape::Single,
            Self::List(_) => ReturnShape::List,
            Self::Store(_) => ReturnShape::Store,
            Self::Raw(_) => ReturnShape::Raw,
        }
    }
}
