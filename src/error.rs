//! Error types.
//!
//! Inside the crate everything is an `anyhow::Error` (see `Res`). When an error crosses the
//! public boundary of a command it is wrapped in `Error`, which carries an `ErrorType` so that the
//! CLI and MCP server can report what kind of failure occurred.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The result type used internally.
pub(crate) type Res<T> = anyhow::Result<T>;

/// The result type returned by public functions.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad categories of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// The home directory or `config.json` is missing or invalid.
    Config,
    /// A SQLite operation failed or a record was not found.
    Database,
    /// The acting user is unknown, inactive, or lacks the required permission.
    Permission,
    /// The input was rejected before anything was written.
    Validation,
    /// The payment provider could not be reached or refused a request.
    Payment,
    /// A report could not be rendered or written.
    Report,
    /// The MCP service failed.
    Service,
    /// Something unexpected.
    Internal,
}

serde_plain::derive_display_from_serialize!(ErrorType);
serde_plain::derive_fromstr_from_deserialize!(ErrorType);

/// A public error: an `ErrorType` plus the underlying error chain.
#[derive(Debug)]
pub struct Error {
    error_type: ErrorType,
    source: anyhow::Error,
}

impl Error {
    pub fn new(error_type: ErrorType, source: impl Into<anyhow::Error>) -> Self {
        Self {
            error_type,
            source: source.into(),
        }
    }

    /// Creates an error of the given type from a message.
    pub fn msg(error_type: ErrorType, message: impl Display) -> Self {
        Self::new(error_type, anyhow::anyhow!("{message}"))
    }

    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} error: {:#}", self.error_type, self.source)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let inner: &(dyn std::error::Error + 'static) = &*self.source;
        Some(inner)
    }
}

/// Converts an internal result into a public one, tagging the error with an `ErrorType`.
pub(crate) trait IntoResult<T> {
    fn pub_result(self, error_type: ErrorType) -> Result<T>;
}

impl<T> IntoResult<T> for Res<T> {
    fn pub_result(self, error_type: ErrorType) -> Result<T> {
        self.map_err(|e| Error::new(error_type, e))
    }
}
