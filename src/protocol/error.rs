//! Protocol error types
//!
//! Every variant here is recoverable: the offending message is dropped and the
//! connection stays open.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("empty binary frame")]
    EmptyFrame,

    #[error("malformed control envelope: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

impl ProtocolError {
    pub(crate) fn invalid(field: &'static str, reason: &'static str) -> Self {
        ProtocolError::Invalid { field, reason }
    }
}
