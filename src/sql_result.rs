//! Uniform representation of the ODBC return-code protocol.

use crate::defs::SqlReturn;

/// Outcome of a single ODBC function call. `SuccessWithInfo` carries the same
/// payload as `Success`; diagnostics attached to it are informational and must
/// not derail the main control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SqlResult<T> {
    Success(T),
    SuccessWithInfo(T),
    /// No more data is available, or the operation affected nothing.
    NoData,
    NeedData,
    StillExecuting,
    /// The driver reported an error. Diagnostics are attached to the handle.
    Error {
        /// Name of the ODBC entry point which failed. Preserved so the error
        /// still names its origin after bubbling up.
        function: &'static str,
    },
    /// The handle passed to the call was not valid.
    InvalidHandle {
        function: &'static str,
    },
}

impl SqlResult<()> {
    pub fn on_success<F, T>(self, f: F) -> SqlResult<T>
    where
        F: FnOnce() -> T,
    {
        self.map(|()| f())
    }
}

impl<T> SqlResult<T> {
    pub fn is_err(&self) -> bool {
        matches!(
            self,
            SqlResult::Error { .. } | SqlResult::InvalidHandle { .. }
        )
    }

    pub fn map<U, F>(self, f: F) -> SqlResult<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            SqlResult::Success(v) => SqlResult::Success(f(v)),
            SqlResult::SuccessWithInfo(v) => SqlResult::SuccessWithInfo(f(v)),
            SqlResult::NoData => SqlResult::NoData,
            SqlResult::NeedData => SqlResult::NeedData,
            SqlResult::StillExecuting => SqlResult::StillExecuting,
            SqlResult::Error { function } => SqlResult::Error { function },
            SqlResult::InvalidHandle { function } => SqlResult::InvalidHandle { function },
        }
    }
}

pub(crate) trait ExtSqlReturn {
    fn into_sql_result(self, function: &'static str) -> SqlResult<()>;
}

impl ExtSqlReturn for SqlReturn {
    fn into_sql_result(self, function: &'static str) -> SqlResult<()> {
        match self {
            SqlReturn::SUCCESS => SqlResult::Success(()),
            SqlReturn::SUCCESS_WITH_INFO => SqlResult::SuccessWithInfo(()),
            SqlReturn::NO_DATA => SqlResult::NoData,
            SqlReturn::NEED_DATA => SqlResult::NeedData,
            SqlReturn::STILL_EXECUTING => SqlResult::StillExecuting,
            SqlReturn::INVALID_HANDLE => SqlResult::InvalidHandle { function },
            _ => SqlResult::Error { function },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn return_codes_map_to_variants() {
        assert_eq!(
            SqlResult::Success(()),
            SqlReturn::SUCCESS.into_sql_result("SQLFetch")
        );
        assert_eq!(
            SqlResult::SuccessWithInfo(()),
            SqlReturn::SUCCESS_WITH_INFO.into_sql_result("SQLFetch")
        );
        assert_eq!(
            SqlResult::NoData,
            SqlReturn::NO_DATA.into_sql_result("SQLFetch")
        );
        assert!(SqlReturn::ERROR.into_sql_result("SQLFetch").is_err());
        assert!(SqlReturn::INVALID_HANDLE
            .into_sql_result("SQLFetch")
            .is_err());
    }

    #[test]
    fn success_with_info_is_not_an_error() {
        assert!(!SqlReturn::SUCCESS_WITH_INFO
            .into_sql_result("SQLGetData")
            .is_err());
    }
}
