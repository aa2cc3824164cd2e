//! Reply serialization for the connection handler.

use std::io::Write;

use serde::Serialize;
use serde_json::Value;

use batchrpc::{ApiReply, ResponseEnvelope};

use super::errors::RequestError;

const TRANSPORT_LOCATION: &str = "transport";

/// Reply records that are not call responses.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ReplyRecord<'a> {
    /// API descriptor reply, shaped after an HTTP response.
    #[serde(rename_all = "camelCase")]
    Api {
        status: u16,
        etag: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        expires: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        descriptor: Option<Value>,
    },
    /// Failure that happened before any call could be identified.
    Exception {
        tid: Option<i64>,
        message: String,
        #[serde(rename = "where")]
        location: &'static str,
    },
}

/// Writes one JSONL reply line.
pub(crate) struct ReplyWriter<W> {
    writer: W,
}

impl<W: Write> ReplyWriter<W> {
    pub(crate) const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes the router's response envelope.
    pub(crate) fn write_envelope(&mut self, envelope: &ResponseEnvelope) -> Result<(), RequestError> {
        envelope.write_line(&mut self.writer)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Writes an API descriptor reply.
    pub(crate) fn write_api(&mut self, reply: &ApiReply<'_>) -> Result<(), RequestError> {
        let record = match reply {
            ApiReply::NotModified { etag } => ReplyRecord::Api {
                status: 304,
                etag,
                cache_control: None,
                expires: None,
                descriptor: None,
            },
            ApiReply::Fresh { body, headers } => ReplyRecord::Api {
                status: 200,
                etag: headers.etag(),
                cache_control: Some(headers.cache_control()),
                expires: Some(headers.expires()),
                descriptor: Some(serde_json::from_slice(body).map_err(RequestError::Serialize)?),
            },
        };
        self.write_record(&record)
    }

    /// Writes a transport-level exception describing `error`.
    pub(crate) fn write_fault(&mut self, error: &RequestError) -> Result<(), RequestError> {
        self.write_record(&ReplyRecord::Exception {
            tid: None,
            message: error.to_string(),
            location: TRANSPORT_LOCATION,
        })
    }

    fn write_record(&mut self, record: &ReplyRecord<'_>) -> Result<(), RequestError> {
        serde_json::to_writer(&mut self.writer, record).map_err(RequestError::Serialize)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
