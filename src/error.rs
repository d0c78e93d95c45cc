//! Error taxonomy for remote Service failures.
//!
//! Every error coming back from the Service is classified into a
//! [`ServiceError`] variant. The variant decides locally whether the failure
//! is retried, absorbed, or surfaced to the user (see the propagation rules
//! on [`ServiceError::is_retryable`] and the dispatcher in
//! [`crate::lifecycle`]).

use thiserror::Error;

use crate::schema::Diagnostic;

/// Errors produced by the Service or by the reconciliation core itself.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The addressed object does not exist on the remote.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The session role lacks a privilege for the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The Service rejected a request value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An object with the same identifier already exists.
    #[error("object already exists: {0}")]
    Conflict(String),

    /// A feature flag, edition, or required precondition is not met.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// A failure that may resolve on retry (throttling, brief outage).
    #[error("transient service failure: {0}")]
    Transient(String),

    /// The Service reply could not be parsed into the expected shape.
    #[error("unparseable service response: {0}")]
    Protocol(String),

    /// A qualified name or state encoding could not be parsed.
    #[error(transparent)]
    MalformedIdentifier(#[from] crate::ident::MalformedIdentifier),

    /// State or snapshot (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The per-operation deadline elapsed; transient retries are exhausted.
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// The host cancelled the operation.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// An internal invariant of the core was violated.
    #[error("internal error: {0}")]
    Fatal(String),
}

impl ServiceError {
    /// Whether the retry primitive may re-attempt after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Whether this error means the addressed object is gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// The remote (or internal) message, without the classification prefix.
    pub fn message(&self) -> String {
        match self {
            Self::NotFound(msg)
            | Self::PermissionDenied(msg)
            | Self::InvalidArgument(msg)
            | Self::Conflict(msg)
            | Self::PreconditionFailed(msg)
            | Self::Transient(msg)
            | Self::Protocol(msg)
            | Self::DeadlineExceeded(msg)
            | Self::Cancelled(msg)
            | Self::Fatal(msg) => msg.clone(),
            Self::MalformedIdentifier(err) => err.to_string(),
            Self::Serialization(err) => err.to_string(),
        }
    }

    /// Convert into a user-facing error diagnostic, preserving the remote
    /// message and attaching the triggering attribute path when known.
    pub fn into_diagnostic(self, attribute: Option<&str>) -> Diagnostic {
        let diag = Diagnostic::error(self.to_string()).with_detail(self.message());
        match attribute {
            Some(path) => diag.with_attribute(path),
            None => diag,
        }
    }
}
