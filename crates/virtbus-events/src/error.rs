//! Error types for entity proxies.

use thiserror::Error;
use virtbus_core::config::ValidationError;
use virtbus_core::domain::{BusError, DomainError};

/// Errors returned by proxy operations
///
/// Nothing that happens while delivering a signal is reported here; only
/// the synchronous parts of subscribe and the RPC calls fail.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The reply body did not have the shape the method declares
    #[error("unexpected reply from {method}: {detail}")]
    UnexpectedReply { method: String, detail: String },

    #[error("metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Every problem [`Config::validate`](virtbus_core::config::Config::validate) found
    #[error("invalid configuration: {}", join_errors(.0))]
    Config(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ProxyError {
    pub(crate) fn unexpected(method: impl Into<String>, detail: impl Into<String>) -> Self {
        ProxyError::UnexpectedReply {
            method: method.into(),
            detail: detail.into(),
        }
    }
}
