//! Retrieval and classification of ODBC diagnostic records.

use crate::defs::{Handle, HandleType, Integer, SmallInt, SqlReturn};
use crate::loader::{driver_manager, DriverManager};
use log::warn;
use std::fmt;

/// SQLStates which warrant a retry of the failed operation: connection
/// failures, serialization failure / deadlock, completion unknown and the two
/// timeout classes.
const RETRYABLE_STATES: &[&str] = &["40001", "40003", "HYT00", "HYT01"];

/// A single diagnostic record as returned by `SQLGetDiagRec`.
///
/// Two records compare equal iff their SQLStates match; the native code and
/// the driver-supplied message are advisory.
#[derive(Debug, Clone, Eq)]
pub struct DiagRecord {
    /// Five-character SQLSTATE class/subclass code.
    pub state: String,
    /// Driver-specific native error code.
    pub native_error: i32,
    /// Driver-supplied message text.
    pub message: String,
}

impl PartialEq for DiagRecord {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state
    }
}

impl fmt::Display for DiagRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} (native error: {})",
            self.state, self.message, self.native_error
        )
    }
}

impl DiagRecord {
    /// True if the record reports a connection-class failure (SQLSTATE `08xxx`).
    pub fn is_connection_error(&self) -> bool {
        self.state.starts_with("08")
    }

    /// True if the record reports data truncation (SQLSTATE `01004`).
    pub fn is_data_truncation(&self) -> bool {
        self.state == "01004"
    }

    /// True if retrying the failed operation may succeed.
    pub fn is_retryable(&self) -> bool {
        self.is_connection_error() || RETRYABLE_STATES.contains(&self.state.as_str())
    }
}

/// Walks the diagnostic record chain attached to `handle`, in order. Stops at
/// the first record index for which the driver reports no data.
pub(crate) fn collect_diagnostics(handle_type: HandleType, handle: Handle) -> Vec<DiagRecord> {
    let Ok(dm) = driver_manager() else {
        // A handle can only exist if loading succeeded earlier.
        return Vec::new();
    };
    collect_with(dm, handle_type, handle)
}

fn collect_with(dm: &DriverManager, handle_type: HandleType, handle: Handle) -> Vec<DiagRecord> {
    let mut records = Vec::new();
    let mut state = [0u8; 6];
    let mut message = [0u8; 1024];
    let mut rec_number: SmallInt = 1;
    loop {
        let mut native_error: Integer = 0;
        let mut message_len: SmallInt = 0;
        let ret = unsafe {
            (dm.get_diag_rec)(
                handle_type as SmallInt,
                handle,
                rec_number,
                state.as_mut_ptr(),
                &mut native_error,
                message.as_mut_ptr(),
                message.len() as SmallInt,
                &mut message_len,
            )
        };
        if ret != SqlReturn::SUCCESS && ret != SqlReturn::SUCCESS_WITH_INFO {
            break;
        }
        let end = (message_len.max(0) as usize).min(message.len());
        records.push(DiagRecord {
            state: String::from_utf8_lossy(&state[..5]).into_owned(),
            native_error,
            message: String::from_utf8_lossy(&message[..end]).into_owned(),
        });
        rec_number += 1;
    }
    records
}

/// Logs the diagnostics currently attached to a handle. Used after calls which
/// came back with `SUCCESS_WITH_INFO`.
pub(crate) fn log_diagnostics(handle_type: HandleType, handle: Handle) {
    if log::log_enabled!(log::Level::Warn) {
        for record in collect_diagnostics(handle_type, handle) {
            warn!("ODBC diagnostic: {record}");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn record(state: &str) -> DiagRecord {
        DiagRecord {
            state: state.to_string(),
            native_error: 0,
            message: String::new(),
        }
    }

    #[test]
    fn connection_class_states_are_connection_errors() {
        for state in ["08001", "08003", "08004", "08007", "08S01"] {
            assert!(record(state).is_connection_error(), "{state}");
            assert!(record(state).is_retryable(), "{state}");
        }
        assert!(!record("42000").is_connection_error());
    }

    #[test]
    fn truncation_state_is_exactly_01004() {
        assert!(record("01004").is_data_truncation());
        assert!(!record("01000").is_data_truncation());
    }

    #[test]
    fn retryable_set_is_classified() {
        for state in ["40001", "40003", "HYT00", "HYT01"] {
            assert!(record(state).is_retryable(), "{state}");
        }
        assert!(!record("42S02").is_retryable());
        assert!(!record("23000").is_retryable());
    }

    #[test]
    fn records_compare_by_sqlstate_only() {
        let a = DiagRecord {
            state: "HY000".to_string(),
            native_error: 1,
            message: "one".to_string(),
        };
        let b = DiagRecord {
            state: "HY000".to_string(),
            native_error: 2,
            message: "two".to_string(),
        };
        assert_eq!(a, b);
        assert_ne!(a, record("HY001"));
    }

    #[test]
    fn display_carries_state_and_native_code() {
        let r = DiagRecord {
            state: "HY010".to_string(),
            native_error: 7,
            message: "Function sequence error".to_string(),
        };
        assert_eq!(
            "[HY010] Function sequence error (native error: 7)",
            format!("{r}")
        );
    }
}
