//! Per-call responses and the batch envelope.
//!
//! Every response echoes the call's `action`, `method` and `tid`. Successful
//! calls carry `"type":"rpc"` and a `result`; failed calls carry
//! `"type":"exception"`, a `message`, and a `where` that is `null` unless an
//! exception mapping supplied one.

use std::io::{self, Write};

use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde_json::Value;

use crate::call::Tid;

/// Payload of a response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// Successful call.
    Rpc {
        /// Serialized handler result.
        result: Value,
    },
    /// Failed call.
    Exception {
        /// Client-visible message.
        message: String,
        /// Optional failure location.
        location: Option<String>,
    },
}

/// Response to one call.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    action: String,
    method: String,
    tid: Option<Tid>,
    body: ResponseBody,
}

impl Response {
    /// Successful response.
    #[must_use]
    pub fn rpc(action: impl Into<String>, method: impl Into<String>, tid: Tid, result: Value) -> Self {
        Self {
            action: action.into(),
            method: method.into(),
            tid: Some(tid),
            body: ResponseBody::Rpc { result },
        }
    }

    /// Exception response. `tid` is `None` only when the call's own id could
    /// not be read.
    #[must_use]
    pub fn exception(
        action: impl Into<String>,
        method: impl Into<String>,
        tid: Option<Tid>,
        message: impl Into<String>,
        location: Option<String>,
    ) -> Self {
        Self {
            action: action.into(),
            method: method.into(),
            tid,
            body: ResponseBody::Exception {
                message: message.into(),
                location,
            },
        }
    }

    /// Echoed action.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Echoed method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Echoed transaction id.
    #[must_use]
    pub const fn tid(&self) -> Option<Tid> {
        self.tid
    }

    /// Response payload.
    #[must_use]
    pub const fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// Wire `type` value.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self.body {
            ResponseBody::Rpc { .. } => "rpc",
            ResponseBody::Exception { .. } => "exception",
        }
    }

    /// Whether this is an exception response.
    #[must_use]
    pub const fn is_exception(&self) -> bool {
        matches!(self.body, ResponseBody::Exception { .. })
    }

    /// Result of a successful call.
    #[must_use]
    pub const fn result(&self) -> Option<&Value> {
        match &self.body {
            ResponseBody::Rpc { result } => Some(result),
            ResponseBody::Exception { .. } => None,
        }
    }

    /// Message of a failed call.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match &self.body {
            ResponseBody::Exception { message, .. } => Some(message),
            ResponseBody::Rpc { .. } => None,
        }
    }

    /// Location of a failed call.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        match &self.body {
            ResponseBody::Exception { location, .. } => location.as_deref(),
            ResponseBody::Rpc { .. } => None,
        }
    }
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Response", 6)?;
        state.serialize_field("action", &self.action)?;
        state.serialize_field("method", &self.method)?;
        state.serialize_field("type", self.kind())?;
        state.serialize_field("tid", &self.tid)?;
        match &self.body {
            ResponseBody::Rpc { result } => {
                state.serialize_field("result", result)?;
            }
            ResponseBody::Exception { message, location } => {
                state.serialize_field("message", message)?;
                state.serialize_field("where", location)?;
            }
        }
        state.end()
    }
}

/// Ordered responses for one request.
///
/// Serializes as an array when the request was an array and as a bare
/// object when the request was a single call.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    responses: Vec<Response>,
    batched: bool,
}

impl ResponseEnvelope {
    /// Wraps responses produced for a request.
    #[must_use]
    pub const fn new(responses: Vec<Response>, batched: bool) -> Self {
        Self { responses, batched }
    }

    /// Responses in request order.
    #[must_use]
    pub fn responses(&self) -> &[Response] {
        &self.responses
    }

    /// Whether the envelope serializes as an array.
    #[must_use]
    pub const fn is_batched(&self) -> bool {
        self.batched
    }

    /// Writes the envelope as one line of JSON.
    ///
    /// # Errors
    ///
    /// Returns an error when serialization or writing fails.
    pub fn write_line<W: Write>(&self, mut writer: W) -> io::Result<()> {
        serde_json::to_writer(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

impl Serialize for ResponseEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match (self.batched, self.responses.as_slice()) {
            (false, [single]) => single.serialize(serializer),
            _ => self.responses.serialize(serializer),
        }
    }
}
