//! Connection state: handle ownership, transactions, probes and the
//! identity-retrieval helper.

use crate::defs::{
    CDataType, Handle, HandleType, Len, Pointer, ULen, SQL_ATTR_ACCESS_MODE, SQL_ATTR_AUTOCOMMIT,
    SQL_ATTR_CURSOR_SCROLLABLE, SQL_ATTR_CURSOR_TYPE, SQL_ATTR_LOGIN_TIMEOUT,
    SQL_ATTR_ODBC_VERSION, SQL_ATTR_TXN_ISOLATION, SQL_AUTOCOMMIT_OFF, SQL_AUTOCOMMIT_ON,
    SQL_CURSOR_DYNAMIC, SQL_CURSOR_FORWARD_ONLY, SQL_CURSOR_KEYSET_DRIVEN, SQL_CURSOR_STATIC,
    SQL_DBMS_NAME, SQL_MODE_READ_ONLY, SQL_MODE_READ_WRITE, SQL_NULL_DATA, SQL_OV_ODBC3,
    SQL_SCROLLABLE, SQL_TXN_READ_COMMITTED, SQL_TXN_READ_UNCOMMITTED, SQL_TXN_REPEATABLE_READ,
    SQL_TXN_SERIALIZABLE,
};
use crate::error::Error;
use crate::loader::{driver_manager, DriverManager};
use crate::named::parse_named_params;
use crate::rows::{Rows, StmtRef};
use crate::sql_result::SqlResult;
use crate::statement::{positional, ExecResult, NamedValue, Statement};
use crate::transaction::Transaction;
use crate::value::{CursorType, IsolationLevel, LastInsertIdBehavior, Value};
use chrono::FixedOffset;
use log::debug;
use std::mem::size_of;
use std::ptr::null_mut;
use std::sync::Mutex;
use std::time::Duration;

/// Identity queries per DBMS. Matched by case-insensitive substring against
/// the name reported at connect time; more specific names come first.
const LAST_INSERT_ID_QUERIES: &[(&str, &str)] = &[
    ("microsoft sql server", "SELECT SCOPE_IDENTITY()"),
    ("sql server", "SELECT SCOPE_IDENTITY()"),
    ("mysql", "SELECT LAST_INSERT_ID()"),
    ("mariadb", "SELECT LAST_INSERT_ID()"),
    ("sqlite3", "SELECT last_insert_rowid()"),
    ("sqlite", "SELECT last_insert_rowid()"),
];

/// Per-connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Timezone applied to retrieved timestamps. Defaults to UTC.
    pub timezone: FixedOffset,
    /// Fractional precision used for timestamps crossing the boundary.
    pub timestamp_precision: crate::value::TimestampPrecision,
    /// Identity-retrieval behaviour after INSERT statements.
    pub last_insert_id: LastInsertIdBehavior,
    /// Per-query timeout, applied as a statement attribute before each
    /// execution. `None` leaves the driver default.
    pub query_timeout: Option<Duration>,
    /// Login timeout applied before connecting.
    pub login_timeout: Option<Duration>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        ConnectionOptions {
            timezone: FixedOffset::east_opt(0).unwrap(),
            timestamp_precision: crate::value::TimestampPrecision::default(),
            last_insert_id: LastInsertIdBehavior::default(),
            query_timeout: None,
            login_timeout: None,
        }
    }
}

impl ConnectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timezone(mut self, timezone: FixedOffset) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn timestamp_precision(
        mut self,
        precision: crate::value::TimestampPrecision,
    ) -> Self {
        self.timestamp_precision = precision;
        self
    }

    pub fn last_insert_id(mut self, behavior: LastInsertIdBehavior) -> Self {
        self.last_insert_id = behavior;
        self
    }

    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    pub fn login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = Some(timeout);
        self
    }
}

/// Options for [`Connection::begin_transaction`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionOptions {
    pub isolation: Option<IsolationLevel>,
    pub read_only: bool,
}

struct ConnState {
    env: Handle,
    dbc: Handle,
    closed: bool,
    in_tx: bool,
}

/// A single database connection: owns the environment and connection
/// handles, serialises all operations on itself and tracks the one live
/// transaction.
///
/// Autocommit is on except between [`Connection::begin_transaction`] and the
/// matching commit or rollback.
pub struct Connection {
    dm: &'static DriverManager,
    options: ConnectionOptions,
    dbms_name: String,
    state: Mutex<ConnState>,
}

// The ODBC driver manager is required to support concurrent use of distinct
// connection handles; access to this one is serialised by the state mutex.
unsafe impl Send for Connection {}
unsafe impl Sync for Connection {}

impl Connection {
    /// Connects with default options. The connection string is passed to the
    /// driver manager verbatim.
    pub fn connect(connection_string: &str) -> Result<Self, Error> {
        Self::connect_with(connection_string, ConnectionOptions::default())
    }

    /// Connects with explicit options.
    pub fn connect_with(
        connection_string: &str,
        options: ConnectionOptions,
    ) -> Result<Self, Error> {
        let dm = driver_manager()?;

        let env = dm
            .alloc_handle(HandleType::Env, null_mut())
            .into_result(HandleType::Env, null_mut())?;
        if let Err(err) = dm
            .set_env_attr(env, SQL_ATTR_ODBC_VERSION, SQL_OV_ODBC3)
            .into_result(HandleType::Env, env)
        {
            let _ = dm.free_handle(HandleType::Env, env);
            return Err(err);
        }

        let dbc = match dm
            .alloc_handle(HandleType::Dbc, env)
            .into_result(HandleType::Env, env)
        {
            Ok(dbc) => dbc,
            Err(err) => {
                let _ = dm.free_handle(HandleType::Env, env);
                return Err(err);
            }
        };

        if let Some(timeout) = options.login_timeout {
            // Not every driver honours a login timeout; failure to set it is
            // not fatal.
            let _ = dm.set_connect_attr(dbc, SQL_ATTR_LOGIN_TIMEOUT, timeout.as_secs() as ULen);
        }

        if let Err(err) = dm
            .driver_connect(dbc, connection_string)
            .into_result(HandleType::Dbc, dbc)
        {
            let _ = dm.free_handle(HandleType::Dbc, dbc);
            let _ = dm.free_handle(HandleType::Env, env);
            return Err(err);
        }

        let dbms_name = if options.last_insert_id == LastInsertIdBehavior::Auto {
            match dm.get_info_string(dbc, SQL_DBMS_NAME) {
                SqlResult::Success(name) | SqlResult::SuccessWithInfo(name) => name,
                _ => String::new(),
            }
        } else {
            String::new()
        };
        debug!("connected, DBMS reported as {dbms_name:?}");

        Ok(Connection {
            dm,
            options,
            dbms_name,
            state: Mutex::new(ConnState {
                env,
                dbc,
                closed: false,
                in_tx: false,
            }),
        })
    }

    pub(crate) fn dm(&self) -> &'static DriverManager {
        self.dm
    }

    pub(crate) fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// The DBMS name the driver reported at connect time, empty when
    /// identity retrieval is not in automatic mode.
    pub fn dbms_name(&self) -> &str {
        &self.dbms_name
    }

    /// Disconnects and frees the handles. Safe to call more than once.
    pub fn close(&self) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        let dbc = state.dbc;
        let env = state.env;
        state.dbc = null_mut();
        state.env = null_mut();
        debug!("disconnecting");
        let disconnected = self
            .dm
            .disconnect(dbc)
            .into_result(HandleType::Dbc, dbc);
        let _ = self.dm.free_handle(HandleType::Dbc, dbc);
        let _ = self.dm.free_handle(HandleType::Env, env);
        disconnected
    }

    /// True while the connection is open and its handle is live.
    pub fn is_valid(&self) -> bool {
        let state = self.state.lock().unwrap();
        !state.closed && !state.dbc.is_null()
    }

    /// Allocates a statement handle off the connection.
    fn alloc_stmt(&self) -> Result<Handle, Error> {
        let state = self.state.lock().unwrap();
        if state.closed {
            return Err(Error::BadConnection);
        }
        self.dm
            .alloc_handle(HandleType::Stmt, state.dbc)
            .into_result(HandleType::Dbc, state.dbc)
    }

    /// Prepares a statement. Named parameters (`:name`, `@name`, `$name`)
    /// are rewritten to positional markers first.
    pub fn prepare(&self, sql: &str) -> Result<Statement<'_>, Error> {
        self.prepare_with_cursor(sql, CursorType::ForwardOnly)
    }

    /// Prepares a statement with an explicit cursor type. Cursor
    /// configuration failures degrade to forward-only behaviour instead of
    /// erroring.
    pub fn prepare_with_cursor(
        &self,
        sql: &str,
        cursor: CursorType,
    ) -> Result<Statement<'_>, Error> {
        let handle = self.alloc_stmt()?;

        if cursor != CursorType::ForwardOnly {
            let _ = self
                .dm
                .set_stmt_attr(handle, SQL_ATTR_CURSOR_TYPE, cursor_type_mask(cursor));
            let _ = self
                .dm
                .set_stmt_attr(handle, SQL_ATTR_CURSOR_SCROLLABLE, SQL_SCROLLABLE);
        }

        let named = parse_named_params(sql);
        let text = named.as_ref().map_or(sql, |n| n.query.as_str());
        if let Err(err) = self
            .dm
            .prepare(handle, text)
            .into_result(HandleType::Stmt, handle)
        {
            let _ = self.dm.free_handle(HandleType::Stmt, handle);
            return Err(err);
        }

        // Some drivers cannot report the marker count; -1 means unknown.
        let num_params = match self.dm.num_params(handle) {
            SqlResult::Success(count) | SqlResult::SuccessWithInfo(count) => count,
            _ => -1,
        };

        Ok(Statement::new(
            self,
            handle,
            sql.to_string(),
            num_params,
            named,
        ))
    }

    /// Executes a statement which returns no rows. Without parameters the
    /// statement goes through the direct-execution fast path.
    pub fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult, Error> {
        if args.is_empty() {
            return self.exec_direct(sql);
        }
        let stmt = self.prepare(sql)?;
        stmt.execute(args)
    }

    /// Executes a statement with named parameters.
    pub fn execute_named(&self, sql: &str, args: &[NamedValue]) -> Result<ExecResult, Error> {
        let stmt = self.prepare(sql)?;
        stmt.execute_named(args)
    }

    fn exec_direct(&self, sql: &str) -> Result<ExecResult, Error> {
        let handle = self.alloc_stmt()?;
        let executed = match self.dm.exec_direct(handle, sql) {
            // DML affecting zero rows comes back as SQL_NO_DATA.
            SqlResult::NoData => Ok(()),
            other => other.into_result(HandleType::Stmt, handle),
        };
        if let Err(err) = executed {
            let _ = self.dm.free_handle(HandleType::Stmt, handle);
            return Err(err);
        }
        let rows_affected = match self.dm.row_count(handle) {
            SqlResult::Success(count) | SqlResult::SuccessWithInfo(count) => count as i64,
            _ => 0,
        };
        let _ = self.dm.free_handle(HandleType::Stmt, handle);
        Ok(ExecResult::with_rows_affected(rows_affected))
    }

    /// Runs a row-returning statement. Without parameters the statement goes
    /// through direct execution on a throwaway handle owned by the returned
    /// iterator.
    pub fn query(&self, sql: &str, args: &[Value]) -> Result<Rows<'_>, Error> {
        if args.is_empty() {
            return self.query_direct(sql);
        }
        let stmt = self.prepare(sql)?;
        stmt.execute_for_query(&positional(args), None)?;
        Rows::new(StmtRef::Owned(stmt))
    }

    /// Runs a row-returning statement with named parameters.
    pub fn query_named(&self, sql: &str, args: &[NamedValue]) -> Result<Rows<'_>, Error> {
        let stmt = self.prepare(sql)?;
        stmt.execute_for_query(args, None)?;
        Rows::new(StmtRef::Owned(stmt))
    }

    fn query_direct(&self, sql: &str) -> Result<Rows<'_>, Error> {
        let handle = self.alloc_stmt()?;
        if let Err(err) = self
            .dm
            .exec_direct(handle, sql)
            .into_result(HandleType::Stmt, handle)
        {
            let _ = self.dm.free_handle(HandleType::Stmt, handle);
            return Err(err);
        }
        let stmt = Statement::new(self, handle, sql.to_string(), -1, None);
        Rows::new(StmtRef::Owned(stmt))
    }

    /// Starts a transaction by disabling autocommit, after applying the
    /// requested isolation level and access mode.
    pub fn begin_transaction(
        &self,
        options: TransactionOptions,
    ) -> Result<Transaction<'_>, Error> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(Error::BadConnection);
        }
        if state.in_tx {
            return Err(Error::AlreadyInTransaction);
        }
        let dbc = state.dbc;

        if let Some(level) = options.isolation {
            self.dm
                .set_connect_attr(dbc, SQL_ATTR_TXN_ISOLATION, isolation_mask(level))
                .into_result(HandleType::Dbc, dbc)?;
        }
        if options.read_only {
            self.dm
                .set_connect_attr(dbc, SQL_ATTR_ACCESS_MODE, SQL_MODE_READ_ONLY)
                .into_result(HandleType::Dbc, dbc)?;
        }
        self.dm
            .set_connect_attr(dbc, SQL_ATTR_AUTOCOMMIT, SQL_AUTOCOMMIT_OFF)
            .into_result(HandleType::Dbc, dbc)?;

        state.in_tx = true;
        Ok(Transaction::new(self))
    }

    /// Issues the end-transaction call and restores autocommit and access
    /// mode. A no-op when no transaction is live, so commit and rollback are
    /// safe on an already-ended transaction.
    pub(crate) fn end_transaction(
        &self,
        completion: crate::defs::CompletionType,
    ) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(Error::BadConnection);
        }
        if !state.in_tx {
            return Ok(());
        }
        let dbc = state.dbc;

        let ended = self
            .dm
            .end_tran(HandleType::Dbc, dbc, completion)
            .into_result(HandleType::Dbc, dbc);

        // Clear the flag before restoration so a restoration failure cannot
        // leave it set.
        state.in_tx = false;
        let _ = self
            .dm
            .set_connect_attr(dbc, SQL_ATTR_AUTOCOMMIT, SQL_AUTOCOMMIT_ON);
        let _ = self
            .dm
            .set_connect_attr(dbc, SQL_ATTR_ACCESS_MODE, SQL_MODE_READ_WRITE);

        ended
    }

    /// Reads back the autocommit attribute from the driver.
    pub fn autocommit(&self) -> Result<bool, Error> {
        let state = self.state.lock().unwrap();
        if state.closed {
            return Err(Error::BadConnection);
        }
        let value = self
            .dm
            .get_connect_attr_ulen(state.dbc, SQL_ATTR_AUTOCOMMIT)
            .into_result(HandleType::Dbc, state.dbc)?;
        Ok(value == SQL_AUTOCOMMIT_ON)
    }

    /// True while a transaction is live on this connection.
    pub fn in_transaction(&self) -> bool {
        self.state.lock().unwrap().in_tx
    }

    /// Verifies the connection with a probe statement. Drivers which reject
    /// the probe SQL for other reasons still count as alive; only a
    /// connection-class diagnostic fails the ping.
    pub fn ping(&self) -> Result<(), Error> {
        let handle = self.alloc_stmt()?;
        let result = match self.dm.exec_direct(handle, "SELECT 1") {
            SqlResult::NoData => Ok(()),
            other => other.into_result(HandleType::Stmt, handle),
        };
        let _ = self.dm.free_handle(HandleType::Stmt, handle);
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.is_connection_error() => Err(Error::BadConnection),
            Err(_) => Ok(()),
        }
    }

    /// Called before a pooled connection is reused. A session still inside a
    /// transaction is unusable.
    pub fn reset_session(&self) -> Result<(), Error> {
        let state = self.state.lock().unwrap();
        if state.closed || state.in_tx {
            return Err(Error::BadConnection);
        }
        Ok(())
    }

    /// Lists tables via the driver's catalog entry point. `None` arguments
    /// match everything.
    pub fn tables(
        &self,
        catalog: Option<&str>,
        schema: Option<&str>,
        table: Option<&str>,
        table_type: Option<&str>,
    ) -> Result<Rows<'_>, Error> {
        let handle = self.alloc_stmt()?;
        if let Err(err) = self
            .dm
            .tables(handle, catalog, schema, table, table_type)
            .into_result(HandleType::Stmt, handle)
        {
            let _ = self.dm.free_handle(HandleType::Stmt, handle);
            return Err(err);
        }
        let stmt = Statement::new(self, handle, String::new(), -1, None);
        Rows::new(StmtRef::Owned(stmt))
    }

    /// Lists columns via the driver's catalog entry point.
    pub fn columns(
        &self,
        catalog: Option<&str>,
        schema: Option<&str>,
        table: Option<&str>,
        column: Option<&str>,
    ) -> Result<Rows<'_>, Error> {
        let handle = self.alloc_stmt()?;
        if let Err(err) = self
            .dm
            .columns(handle, catalog, schema, table, column)
            .into_result(HandleType::Stmt, handle)
        {
            let _ = self.dm.free_handle(HandleType::Stmt, handle);
            return Err(err);
        }
        let stmt = Statement::new(self, handle, String::new(), -1, None);
        Rows::new(StmtRef::Owned(stmt))
    }

    /// Best-effort identity retrieval after an INSERT. Any failure reports
    /// zero; identity is an enrichment, not a contract.
    pub(crate) fn last_insert_id(&self) -> i64 {
        if self.options.last_insert_id != LastInsertIdBehavior::Auto {
            return 0;
        }
        let Some(query) = identity_query(&self.dbms_name) else {
            return 0;
        };
        let Ok(handle) = self.alloc_stmt() else {
            return 0;
        };
        let id = self.fetch_single_i64(handle, query);
        let _ = self.dm.free_handle(HandleType::Stmt, handle);
        id
    }

    fn fetch_single_i64(&self, handle: Handle, query: &str) -> i64 {
        if self.dm.exec_direct(handle, query).is_err() {
            return 0;
        }
        match self.dm.fetch(handle) {
            SqlResult::Success(()) | SqlResult::SuccessWithInfo(()) => {}
            _ => return 0,
        }
        let mut value: i64 = 0;
        let mut indicator: Len = 0;
        let fetched = unsafe {
            self.dm.get_data(
                handle,
                1,
                CDataType::SBigInt,
                &mut value as *mut i64 as Pointer,
                size_of::<i64>() as Len,
                &mut indicator,
            )
        };
        if fetched.is_err() || indicator == SQL_NULL_DATA {
            return 0;
        }
        value
    }
}

fn cursor_type_mask(cursor: CursorType) -> ULen {
    match cursor {
        CursorType::ForwardOnly => SQL_CURSOR_FORWARD_ONLY,
        CursorType::Static => SQL_CURSOR_STATIC,
        CursorType::Keyset => SQL_CURSOR_KEYSET_DRIVEN,
        CursorType::Dynamic => SQL_CURSOR_DYNAMIC,
    }
}

/// Maps the requested isolation level onto the driver's bit mask. Levels
/// without an ODBC equivalent use the nearest stricter one.
fn isolation_mask(level: IsolationLevel) -> ULen {
    match level {
        IsolationLevel::ReadUncommitted => SQL_TXN_READ_UNCOMMITTED,
        IsolationLevel::ReadCommitted | IsolationLevel::WriteCommitted => SQL_TXN_READ_COMMITTED,
        IsolationLevel::RepeatableRead => SQL_TXN_REPEATABLE_READ,
        IsolationLevel::Snapshot
        | IsolationLevel::Serializable
        | IsolationLevel::Linearizable => SQL_TXN_SERIALIZABLE,
    }
}

/// Finds the identity query for a DBMS name, matched case-insensitively by
/// substring.
fn identity_query(dbms_name: &str) -> Option<&'static str> {
    if dbms_name.is_empty() {
        return None;
    }
    let lowered = dbms_name.to_lowercase();
    LAST_INSERT_ID_QUERIES
        .iter()
        .find(|(name, _)| lowered.contains(name))
        .map(|(_, query)| *query)
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn isolation_levels_map_onto_driver_masks() {
        assert_eq!(
            SQL_TXN_READ_UNCOMMITTED,
            isolation_mask(IsolationLevel::ReadUncommitted)
        );
        assert_eq!(
            SQL_TXN_READ_COMMITTED,
            isolation_mask(IsolationLevel::ReadCommitted)
        );
        assert_eq!(
            SQL_TXN_READ_COMMITTED,
            isolation_mask(IsolationLevel::WriteCommitted)
        );
        assert_eq!(
            SQL_TXN_REPEATABLE_READ,
            isolation_mask(IsolationLevel::RepeatableRead)
        );
        for strict in [
            IsolationLevel::Snapshot,
            IsolationLevel::Serializable,
            IsolationLevel::Linearizable,
        ] {
            assert_eq!(SQL_TXN_SERIALIZABLE, isolation_mask(strict));
        }
    }

    #[test]
    fn identity_query_matches_known_dbms_names() {
        assert_eq!(
            Some("SELECT SCOPE_IDENTITY()"),
            identity_query("Microsoft SQL Server")
        );
        assert_eq!(
            Some("SELECT LAST_INSERT_ID()"),
            identity_query("MySQL Community Server")
        );
        assert_eq!(
            Some("SELECT LAST_INSERT_ID()"),
            identity_query("MariaDB 11")
        );
        assert_eq!(
            Some("SELECT last_insert_rowid()"),
            identity_query("SQLite3")
        );
        assert_eq!(None, identity_query("PostgreSQL"));
        assert_eq!(None, identity_query(""));
    }

    #[test]
    fn cursor_types_map_onto_driver_values() {
        assert_eq!(SQL_CURSOR_FORWARD_ONLY, cursor_type_mask(CursorType::ForwardOnly));
        assert_eq!(SQL_CURSOR_STATIC, cursor_type_mask(CursorType::Static));
        assert_eq!(SQL_CURSOR_KEYSET_DRIVEN, cursor_type_mask(CursorType::Keyset));
        assert_eq!(SQL_CURSOR_DYNAMIC, cursor_type_mask(CursorType::Dynamic));
    }
}
