//! Classified handler errors and their mapping onto the wire taxonomy.

use crate::client::ApiError;
use forgelink_auth::AuthError;
use forgelink_protocol::{ErrorKind, ErrorPayload};
use forgelink_repo_context::ContextError;
use serde_json::json;
use thiserror::Error;

/// Everything a tool handler can fail with. Converted to exactly one error
/// envelope at the dispatch boundary; `Cancelled` is the exception: it
/// means the connection is going away and no response is owed.
#[derive(Error, Debug, Clone)]
pub enum ToolError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Upstream(#[from] ApiError),

    #[error("deadline exceeded")]
    Timeout,

    #[error("request cancelled")]
    Cancelled,

    #[error("{0}")]
    Internal(String),
}

impl ToolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::Context(ContextError::NotARepository(_)) => ErrorKind::NotARepository,
            Self::Context(ContextError::NoRemote { .. }) => ErrorKind::NoRemote,
            Self::Context(ContextError::UnrecognizedHost { .. }) => ErrorKind::UnrecognizedHost,
            Self::Context(ContextError::MalformedUrl { .. }) => ErrorKind::MalformedUrl,
            Self::Auth(AuthError::Missing) => ErrorKind::AuthMissing,
            Self::Auth(AuthError::Invalid { .. }) => ErrorKind::AuthInvalid,
            Self::Auth(AuthError::Unreachable { .. }) => ErrorKind::AuthUnreachable,
            Self::Upstream(_) => ErrorKind::UpstreamError,
            Self::Timeout | Self::Cancelled => ErrorKind::Timeout,
            Self::Internal(_) => ErrorKind::InternalFault,
        }
    }

    /// Wire rendering. Internal faults are deliberately opaque: the detail
    /// goes to the log, never to the caller.
    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            Self::Internal(detail) => {
                log::error!("internal fault: {detail}");
                ErrorPayload::new(ErrorKind::InternalFault, "internal error")
            }
            Self::Upstream(err) => ErrorPayload::new(ErrorKind::UpstreamError, err.message.clone())
                .with_data(json!({
                    "retryable": err.retryable,
                    "status": err.status,
                })),
            other => ErrorPayload::new(other.kind(), other.to_string()),
        }
    }
}
