//! JSONL request handling for daemon connections.
//!
//! Each connection carries one request line and receives one reply line.
//! The line is a batch (a call object or an array of calls), a batch wrapped
//! with transport values, or an API descriptor request:
//!
//! ```json
//! [{"action":"person","method":"find","type":"rpc","tid":1,"data":[3]}]
//! {"batch":[...],"headers":{"X-Client":"grid"},"cookies":{},"query":{}}
//! {"api":{"ifNoneMatch":"\"0c2f...\""}}
//! ```
//!
//! Lines that cannot be read or parsed get a single exception record
//! located at `transport`, since no call is known to attribute it to.

mod errors;
mod handler;
mod request;
mod response;

pub(crate) use self::handler::RouterConnectionHandler;

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
