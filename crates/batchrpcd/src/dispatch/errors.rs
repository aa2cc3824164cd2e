//! Errors raised while reading and answering a request line.

use std::io;

use thiserror::Error;

use batchrpc::{ApiError, BatchParseError};

/// Failures that prevent a request line from reaching the router.
#[derive(Debug, Error)]
pub(crate) enum RequestError {
    /// The line is not valid JSON.
    #[error("malformed JSONL: {message}")]
    MalformedJson {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// The JSON does not describe a batch or an API request.
    #[error("invalid request structure: {message}")]
    InvalidStructure { message: String },

    /// The line exceeds the size limit.
    #[error("request too large: {size} bytes exceeds {max_size} byte limit")]
    RequestTooLarge { size: usize, max_size: usize },

    /// Reading or writing the connection failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The reply could not be serialized.
    #[error("failed to serialize reply: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The API descriptor could not be served.
    #[error("failed to serve API descriptor: {0}")]
    Api(#[from] ApiError),
}

impl RequestError {
    pub(crate) fn from_json_error(source: serde_json::Error) -> Self {
        Self::MalformedJson {
            message: source.to_string(),
            source: Some(source),
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedJson {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    pub(crate) const fn request_too_large(size: usize, max_size: usize) -> Self {
        Self::RequestTooLarge { size, max_size }
    }

    /// Whether the client caused the failure, as opposed to the daemon.
    pub(crate) const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedJson { .. } | Self::InvalidStructure { .. } | Self::RequestTooLarge { .. }
        )
    }
}

impl From<BatchParseError> for RequestError {
    fn from(error: BatchParseError) -> Self {
        match error {
            BatchParseError::Json(source) => Self::from_json_error(source),
            BatchParseError::NotABatch => {
                Self::invalid_structure("expected a call object or an array of calls")
            }
        }
    }
}
