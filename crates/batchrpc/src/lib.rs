//! Batched remote procedure call routing.
//!
//! A client submits a batch of calls, each naming an `action` and a `method`
//! and carrying a client-assigned transaction id. The router resolves every
//! call against a [`Registry`] of handlers, binds the call payload onto the
//! handler's declared parameters, invokes the handler, and assembles one
//! response per call, in request order, into a single envelope.
//!
//! Failures never escape a call: a missing handler, a parameter that cannot
//! be coerced, or a handler that errors or panics all produce an `exception`
//! response for that call only, while the rest of the batch proceeds.
//!
//! Store-read handlers receive a [`ReadRequest`] and can delegate sorting,
//! grouping, pagination and grid metadata to the [`StoreProcessor`].
//!
//! ```text
//! [{"action":"person","method":"load","type":"rpc","tid":1,"data":[{"limit":10}]}]
//! -> [{"action":"person","method":"load","type":"rpc","tid":1,"result":{...}}]
//! ```

mod api;
mod binder;
mod call;
mod context;
mod descriptor;
mod dispatch;
mod error;
mod registry;
mod response;
mod store;

#[cfg(test)]
mod tests;

pub use batchrpc_config::DispatchMode;

pub use self::api::{ApiCache, ApiDescriptor, ApiError, ApiReply, CacheHeaders};
pub use self::binder::{BoundArguments, BoundValue};
pub use self::call::{Batch, BatchEntry, BatchParseError, Call, HandlerCall, HandlerOutput, Tid};
pub use self::context::{NoTransport, StaticTransport, TransportContext};
pub use self::descriptor::{
    CallStyle, HandlerDescriptor, ParamSource, ParamSpec, ParamType, ReturnShape,
};
pub use self::dispatch::{
    CallOutcome, CallState, Dispatcher, DispatcherOptions, ExceptionMapping, ExceptionReply,
};
pub use self::error::{CallError, HandlerFailure, RegistryError};
pub use self::registry::{Handler, RegisteredHandler, Registry, RegistryBuilder, View};
pub use self::response::{Response, ResponseBody, ResponseEnvelope};
pub use self::store::{
    FieldOrderings, FieldSpec, FieldType, FilterSpec, GridSchema, JsonFieldOrdering, ReadRequest,
    ReadRequestError, RecordOrdering, SortDirection, SortInfo, SortSpec, StoreMetadata,
    StoreProcessor, StoreResult, ViewSelection, compare_json,
};
