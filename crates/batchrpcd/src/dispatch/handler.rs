//! Connection handler that feeds request lines to the router.

use std::io::{self, Read, Write};
use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, warn};

use batchrpc::{ApiCache, Dispatcher};

use crate::transport::{ConnectionHandler, ConnectionStream};

use super::DISPATCH_TARGET;
use super::errors::RequestError;
use super::request::RouterRequest;
use super::response::ReplyWriter;

/// Maximum size of a request line in bytes.
pub(crate) const MAX_REQUEST_BYTES: usize = 1024 * 1024;

type Clock = fn() -> OffsetDateTime;

/// Serves one request line per connection against a shared dispatcher.
#[derive(Debug)]
pub(crate) struct RouterConnectionHandler {
    dispatcher: Arc<Dispatcher>,
    api: Arc<ApiCache>,
    clock: Clock,
}

impl RouterConnectionHandler {
    pub(crate) fn new(dispatcher: Arc<Dispatcher>, api: Arc<ApiCache>) -> Self {
        Self {
            dispatcher,
            api,
            clock: OffsetDateTime::now_utc,
        }
    }

    #[cfg(test)]
    pub(crate) const fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Reads one request line from `input` and writes one reply line to
    /// `output`.
    pub(crate) fn serve<R: Read, W: Write>(&self, input: &mut R, output: W) {
        let mut writer = ReplyWriter::new(output);
        let line = match read_request_line(input) {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!(target: DISPATCH_TARGET, "client disconnected without request");
                return;
            }
            Err(error) => {
                report(&mut writer, &error);
                return;
            }
        };
        if let Err(error) = self.answer(&line, &mut writer) {
            report(&mut writer, &error);
        }
    }

    fn answer<W: Write>(&self, line: &[u8], writer: &mut ReplyWriter<W>) -> Result<(), RequestError> {
        match RouterRequest::parse(line)? {
            RouterRequest::Batch { batch, transport } => {
                debug!(
                    target: DISPATCH_TARGET,
                    calls = batch.len(),
                    batched = batch.is_batched(),
                    "dispatching batch"
                );
                let envelope = self.dispatcher.dispatch(&batch, &transport);
                writer.write_envelope(&envelope)
            }
            RouterRequest::Api { if_none_match } => {
                debug!(
                    target: DISPATCH_TARGET,
                    conditional = if_none_match.is_some(),
                    "serving API descriptor"
                );
                let reply = self.api.serve(if_none_match.as_deref(), (self.clock)())?;
                writer.write_api(&reply)
            }
        }
    }
}

impl ConnectionHandler for RouterConnectionHandler {
    fn handle(&self, mut stream: ConnectionStream) {
        let mut input = match stream.try_clone() {
            Ok(input) => input,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "failed to clone connection");
                return;
            }
        };
        self.serve(&mut input, &mut stream);
    }
}

/// Logs `error` and, unless the connection itself failed, tells the client.
fn report<W: Write>(writer: &mut ReplyWriter<W>, error: &RequestError) {
    if error.is_client_error() {
        warn!(target: DISPATCH_TARGET, %error, "rejected request");
    } else {
        warn!(target: DISPATCH_TARGET, %error, "request failed");
    }
    if matches!(error, RequestError::Io(_)) {
        return;
    }
    if let Err(write_error) = writer.write_fault(error) {
        warn!(target: DISPATCH_TARGET, error = %write_error, "failed to write fault");
    }
}

/// Reads a bounded request line.
///
/// Returns `Ok(None)` when the client disconnects without sending anything.
/// A final line without a newline is accepted at end of stream.
fn read_request_line<R: Read>(input: &mut R) -> Result<Option<Vec<u8>>, RequestError> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 4096];
    loop {
        let read = read_with_retry(input, &mut chunk)?;
        let Some(received) = chunk.get(..read).filter(|bytes| !bytes.is_empty()) else {
            return Ok((!buffer.is_empty()).then_some(buffer));
        };
        match received.iter().position(|byte| *byte == b'\n') {
            Some(newline) => {
                buffer.extend(received.iter().take(newline + 1));
                enforce_limit(buffer.len())?;
                return Ok(Some(buffer));
            }
            None => {
                buffer.extend_from_slice(received);
                enforce_limit(buffer.len())?;
            }
        }
    }
}

fn read_with_retry<R: Read>(input: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match input.read(buf) {
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            other => return other,
        }
    }
}

const fn enforce_limit(size: usize) -> Result<(), RequestError> {
    if size > MAX_REQUEST_BYTES {
        return Err(RequestError::request_too_large(size, MAX_REQUEST_BYTES));
    }
    Ok(())
}
