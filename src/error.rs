//! Error type shared by the whole crate.

use crate::defs::{Handle, HandleType};
use crate::diagnostics::{collect_diagnostics, log_diagnostics, DiagRecord};
use crate::sql_result::SqlResult;
use thiserror::Error as ThisError;

#[derive(Debug, Clone, ThisError)]
pub enum Error {
    /// The driver manager library could not be loaded or a required symbol
    /// was missing. Terminal: every later operation reports the same error.
    #[error("cannot initialise ODBC: failed to load driver manager from '{path}': {reason}")]
    FailedToLoad { path: String, reason: String },

    /// An ODBC call failed and left a diagnostic chain on the handle.
    #[error("ODBC call to {function} failed: {}", format_records(.records))]
    Diagnostics {
        /// Entry point which produced the diagnostics.
        function: &'static str,
        /// All records attached to the handle, in driver order.
        records: Vec<DiagRecord>,
    },

    /// An ODBC call failed without leaving any diagnostic record.
    #[error("ODBC call to {function} failed without diagnostic records")]
    NoDiagnostics { function: &'static str },

    /// The connection is closed, was reset mid-transaction, or a ping probe
    /// surfaced a connection-class diagnostic. Pools should evict the handle.
    #[error("bad connection")]
    BadConnection,

    /// Execution was aborted because a cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// A value could not be bound: unmarshallable value, out-of-range
    /// ordinal, or a named parameter without a supplied value.
    #[error("parameter {name}: {message}")]
    Parameter { name: String, message: String },

    /// Decimal construction or validation failed.
    #[error("decimal: {0}")]
    Decimal(String),

    /// A GUID string had the wrong length or non-hex digits.
    #[error("guid: {0}")]
    Guid(String),

    /// `begin_transaction` was called while a transaction is already live.
    #[error("already in a transaction")]
    AlreadyInTransaction,

    /// One parameter set of a batch was rejected by the driver.
    #[error("parameter set {row} was rejected during array execution")]
    BatchRow { row: usize },
}

fn format_records(records: &[DiagRecord]) -> String {
    if records.is_empty() {
        return "unknown ODBC error".to_string();
    }
    records
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Builds a diagnostic-carrying error from whatever the driver left on
    /// `handle`.
    pub(crate) fn from_diagnostics(
        function: &'static str,
        handle_type: HandleType,
        handle: Handle,
    ) -> Self {
        let records = collect_diagnostics(handle_type, handle);
        if records.is_empty() {
            Error::NoDiagnostics { function }
        } else {
            Error::Diagnostics { function, records }
        }
    }

    pub(crate) fn parameter(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Parameter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Diagnostic records attached to this error, if any.
    pub fn records(&self) -> &[DiagRecord] {
        match self {
            Error::Diagnostics { records, .. } => records,
            _ => &[],
        }
    }

    /// True if the error signals a lost or unusable connection.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Error::BadConnection => true,
            Error::Diagnostics { records, .. } => records
                .first()
                .map(DiagRecord::is_connection_error)
                .unwrap_or(false),
            _ => false,
        }
    }

    /// True if the failed operation may succeed when retried (after
    /// re-binding parameters).
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Diagnostics { records, .. } => records
                .first()
                .map(DiagRecord::is_retryable)
                .unwrap_or(false),
            _ => false,
        }
    }

    /// True if the leading diagnostic reports data truncation.
    pub fn is_data_truncation(&self) -> bool {
        match self {
            Error::Diagnostics { records, .. } => records
                .first()
                .map(DiagRecord::is_data_truncation)
                .unwrap_or(false),
            _ => false,
        }
    }
}

impl<T> SqlResult<T> {
    /// Success and success-with-info become `Ok`; in the latter case any
    /// diagnostics are logged. Errors are converted via the handle's
    /// diagnostic chain. `NoData` is unexpected here.
    pub(crate) fn into_result(self, handle_type: HandleType, handle: Handle) -> Result<T, Error> {
        self.into_result_with(handle_type, handle, None)
    }

    /// Like [`Self::into_result`] but maps `NoData` to the supplied value.
    pub(crate) fn into_result_with(
        self,
        handle_type: HandleType,
        handle: Handle,
        no_data: Option<T>,
    ) -> Result<T, Error> {
        match self {
            SqlResult::Success(value) => Ok(value),
            SqlResult::SuccessWithInfo(value) => {
                log_diagnostics(handle_type, handle);
                Ok(value)
            }
            SqlResult::NoData => match no_data {
                Some(value) => Ok(value),
                None => Err(Error::NoDiagnostics {
                    function: "unexpected SQL_NO_DATA",
                }),
            },
            SqlResult::NeedData | SqlResult::StillExecuting => Err(Error::NoDiagnostics {
                function: "unexpected asynchronous return code",
            }),
            SqlResult::Error { function } => {
                Err(Error::from_diagnostics(function, handle_type, handle))
            }
            SqlResult::InvalidHandle { function } => {
                Err(Error::from_diagnostics(function, handle_type, handle))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn diag(state: &str) -> Error {
        Error::Diagnostics {
            function: "SQLExecute",
            records: vec![DiagRecord {
                state: state.to_string(),
                native_error: 0,
                message: "boom".to_string(),
            }],
        }
    }

    #[test]
    fn classification_follows_the_leading_record() {
        assert!(diag("08S01").is_connection_error());
        assert!(diag("40001").is_retryable());
        assert!(diag("01004").is_data_truncation());
        assert!(!diag("42000").is_retryable());
    }

    #[test]
    fn bad_connection_is_a_connection_error() {
        assert!(Error::BadConnection.is_connection_error());
        assert!(!Error::Cancelled.is_connection_error());
    }

    #[test]
    fn diagnostics_render_in_order() {
        let err = Error::Diagnostics {
            function: "SQLExecute",
            records: vec![
                DiagRecord {
                    state: "42000".to_string(),
                    native_error: 102,
                    message: "Incorrect syntax".to_string(),
                },
                DiagRecord {
                    state: "01000".to_string(),
                    native_error: 0,
                    message: "general warning".to_string(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("SQLExecute"));
        let a = text.find("42000").unwrap();
        let b = text.find("01000").unwrap();
        assert!(a < b);
    }
}
