//! Parsing of request lines.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use batchrpc::{Batch, StaticTransport};

use super::errors::RequestError;

/// A parsed request line.
#[derive(Debug)]
pub(crate) enum RouterRequest {
    /// Calls to dispatch, with the transport values they may read.
    Batch {
        batch: Batch,
        transport: StaticTransport,
    },
    /// Conditional fetch of the API descriptor.
    Api { if_none_match: Option<String> },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ApiRequest {
    #[serde(default)]
    if_none_match: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WrappedBatch {
    batch: Value,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    cookies: BTreeMap<String, String>,
    #[serde(default)]
    query: BTreeMap<String, String>,
}

impl WrappedBatch {
    fn transport(&self) -> StaticTransport {
        let with_headers = self
            .headers
            .iter()
            .fold(StaticTransport::new(), |transport, (name, value)| {
                transport.with_header(name, value.as_str())
            });
        let with_cookies = self
            .cookies
            .iter()
            .fold(with_headers, |transport, (name, value)| {
                transport.with_cookie(name.as_str(), value.as_str())
            });
        self.query
            .iter()
            .fold(with_cookies, |transport, (name, value)| {
                transport.with_query(name.as_str(), value.as_str())
            })
    }
}

impl RouterRequest {
    /// Parses one request line; trailing whitespace is ignored.
    pub(crate) fn parse(line: &[u8]) -> Result<Self, RequestError> {
        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            return Err(RequestError::malformed("empty request line"));
        }
        let value: Value = serde_json::from_slice(trimmed).map_err(RequestError::from_json_error)?;
        Self::from_value(value)
    }

    fn from_value(value: Value) -> Result<Self, RequestError> {
        if let Some(api) = value.get("api") {
            let request = if api.is_null() {
                ApiRequest::default()
            } else {
                ApiRequest::deserialize(api).map_err(|error| {
                    RequestError::invalid_structure(format!("api request: {error}"))
                })?
            };
            return Ok(Self::Api {
                if_none_match: request.if_none_match,
            });
        }

        if value.get("batch").is_some() {
            let wrapped = WrappedBatch::deserialize(value).map_err(|error| {
                RequestError::invalid_structure(format!("wrapped batch: {error}"))
            })?;
            let transport = wrapped.transport();
            return Ok(Self::Batch {
                batch: Batch::from_value(wrapped.batch)?,
                transport,
            });
        }

        Ok(Self::Batch {
            batch: Batch::from_value(value)?,
            transport: StaticTransport::new(),
        })
    }
}
