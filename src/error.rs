//! Fatal diagnostics.
//!
//! Every error in this crate is fatal by default: the runtime is collective,
//! so locally recovering from a peer-visible inconsistency is not
//! meaningful. [`GaError::abort`] formats the diagnostic, logs it, and
//! panics (which aborts the process under the `panic = "abort"` release
//! profile, same as the teacher crate's own `assert!`-driven invariants).

use std::fmt;

#[derive(Debug, Clone)]
pub enum GaError {
    InvalidHandle { handle: i32 },
    InvalidArgument { detail: String },
    ResourceExhausted { detail: String },
    UsageError { detail: String },
    Internal { detail: String },
}

impl GaError {
    pub fn invalid_handle(handle: i32) -> Self {
        GaError::InvalidHandle { handle }
    }

    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        GaError::InvalidArgument { detail: detail.into() }
    }

    pub fn resource_exhausted(detail: impl Into<String>) -> Self {
        GaError::ResourceExhausted { detail: detail.into() }
    }

    pub fn usage(detail: impl Into<String>) -> Self {
        GaError::UsageError { detail: detail.into() }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        GaError::Internal { detail: detail.into() }
    }

    fn message(&self) -> String {
        match self {
            GaError::InvalidHandle { handle } => format!("invalid handle: {handle}"),
            GaError::InvalidArgument { detail } => format!("invalid argument: {detail}"),
            GaError::ResourceExhausted { detail } => format!("resource exhausted: {detail}"),
            GaError::UsageError { detail } => format!("usage error: {detail}"),
            GaError::Internal { detail } => format!("internal error: {detail}"),
        }
    }

    /// Format `<operation>: <message>`, log it, and abort the process.
    #[cold]
    pub fn abort(&self, operation: &str) -> ! {
        let line = format!("{operation}: {}", self.message());
        log::error!("{line}");
        panic!("{line}");
    }
}

impl fmt::Display for GaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for GaError {}

pub type GaResult<T> = Result<T, GaError>;

/// Convenience for call sites that have only a `Result`, not direct access to
/// the operation name: unwrap or abort with the diagnostic.
pub(crate) trait OrAbort<T> {
    fn or_abort(self, operation: &str) -> T;
}

impl<T> OrAbort<T> for GaResult<T> {
    fn or_abort(self, operation: &str) -> T {
        match self {
            Ok(v) => v,
            Err(e) => e.abort(operation),
        }
    }
}
