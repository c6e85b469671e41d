//! # About
//!
//! `odbcdirect` is a database-agnostic SQL client built on the ODBC driver
//! manager. Unlike sys-crate based wrappers it never links `libodbc` at
//! build time: the shared library is located and loaded at runtime (set
//! [`LIBRARY_PATH_ENV`] to override the search), which keeps a
//! single binary portable across machines with differently installed driver
//! managers.
//!
//! ```no_run
//! use odbcdirect::{Connection, Value};
//!
//! let conn = Connection::connect("DSN=warehouse;UID=app;PWD=secret")?;
//! let stmt = conn.prepare("INSERT INTO users (name, age) VALUES (:name, :age)")?;
//! let result = stmt.execute_named(&[
//!     odbcdirect::NamedValue::named("name", "Ada"),
//!     odbcdirect::NamedValue::named("age", 36i64),
//! ])?;
//! assert_eq!(1, result.rows_affected());
//!
//! let mut rows = conn.query("SELECT name, age FROM users", &[])?;
//! while let Some(row) = rows.next_row()? {
//!     println!("{row:?}");
//! }
//! # Ok::<(), odbcdirect::Error>(())
//! ```

mod batch;
mod cancel;
mod connection;
mod convert;
/// Raw ODBC ABI declarations, exposed for applications which need to
/// interpret driver-specific type codes.
pub mod defs;
mod diagnostics;
mod error;
mod functions;
mod loader;
mod named;
mod rows;
mod sql_result;
mod statement;
mod transaction;
mod value;

pub use self::{
    cancel::CancelToken,
    connection::{Connection, ConnectionOptions, TransactionOptions},
    diagnostics::DiagRecord,
    error::Error,
    named::{parse_named_params, NamedParams},
    rows::{Column, FetchOrientation, Nullability, Rows, ScanType},
    statement::{
        BatchResult, ExecResult, NamedValue, ParameterDescription, Statement,
    },
    transaction::Transaction,
    value::{
        CursorType, Decimal, Guid, IntervalDaySecond, IntervalYearMonth, IsolationLevel,
        LastInsertIdBehavior, OutputParam, ParamDirection, Timestamp, TimestampPrecision,
        TimestampTz, Value,
    },
};
pub use loader::LIBRARY_PATH_ENV;
