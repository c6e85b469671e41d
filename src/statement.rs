//! Prepared statements: parameter binding, execution, batches and output
//! parameters.

use crate::batch::{allocate_column, ColumnBuffer};
use crate::cancel::CancelToken;
use crate::connection::Connection;
use crate::convert::{allocate_output_buffer, convert_output, to_odbc, BoundParam, ParamBuffer};
use crate::defs::{
    CDataType, FreeStmtOption, Handle, HandleType, Len, ParamType, Pointer, SqlNullability, ULen,
    SQL_ATTR_PARAMSET_SIZE, SQL_ATTR_PARAMS_PROCESSED_PTR, SQL_ATTR_PARAM_BIND_TYPE,
    SQL_ATTR_PARAM_STATUS_PTR, SQL_ATTR_QUERY_TIMEOUT, SQL_PARAM_BIND_BY_COLUMN,
    SQL_PARAM_ERROR, SQL_PARAM_SUCCESS, SQL_PARAM_SUCCESS_WITH_INFO, SQL_PARAM_UNUSED,
};
use crate::error::Error;
use crate::loader::DriverManager;
use crate::named::NamedParams;
use crate::rows::{Nullability, Rows, StmtRef};
use crate::sql_result::SqlResult;
use crate::value::{ParamDirection, Value};
use num_traits::FromPrimitive;
use std::collections::HashMap;
use std::ptr::null_mut;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

/// Hard cap on parameter ordinals, preventing unbounded growth of the
/// binding vectors from a typo'd ordinal.
pub(crate) const MAX_PARAMETERS: usize = 10_000;

static NULL_VALUE: Value = Value::Null;

/// A parameter supplied to execution, addressed by name or 1-based ordinal.
#[derive(Debug, Clone)]
pub struct NamedValue {
    name: Option<String>,
    ordinal: usize,
    value: Value,
}

impl NamedValue {
    /// Addresses a named parameter (`:name`, `@name` or `$name`).
    pub fn named(name: impl Into<String>, value: impl Into<Value>) -> Self {
        NamedValue {
            name: Some(name.into()),
            ordinal: 0,
            value: value.into(),
        }
    }

    /// Addresses a positional marker by its 1-based ordinal.
    pub fn positional(ordinal: usize, value: impl Into<Value>) -> Self {
        NamedValue {
            name: None,
            ordinal,
            value: value.into(),
        }
    }
}

/// Outcome of a non-query execution.
#[derive(Debug, Default)]
pub struct ExecResult {
    rows_affected: i64,
    last_insert_id: i64,
    output_params: Vec<Option<Value>>,
}

impl ExecResult {
    /// Envelope for the direct-execution path, which reports rows affected
    /// only.
    pub(crate) fn with_rows_affected(rows_affected: i64) -> Self {
        ExecResult {
            rows_affected,
            ..Default::default()
        }
    }

    /// Rows affected as reported by the driver after execution.
    pub fn rows_affected(&self) -> i64 {
        self.rows_affected
    }

    /// The identity generated by an INSERT, or 0 when identity retrieval is
    /// disabled, unsupported by the DBMS, or failed. A genuine identity of 0
    /// is indistinguishable from "none".
    pub fn last_insert_id(&self) -> i64 {
        self.last_insert_id
    }

    /// Output-parameter values by 0-based parameter index. Input-only
    /// positions hold `None`; an SQL NULL output holds `Some(Value::Null)`.
    pub fn output_params(&self) -> &[Option<Value>] {
        &self.output_params
    }

    pub fn output_param(&self, index: usize) -> Option<&Value> {
        self.output_params.get(index).and_then(Option::as_ref)
    }
}

/// Outcome of a batch execution.
#[derive(Debug, Default)]
pub struct BatchResult {
    /// Sum of rows affected over all parameter sets.
    pub total_rows_affected: i64,
    /// Rows affected per parameter set.
    pub row_counts: Vec<i64>,
    /// Per-set failure, `None` on success.
    pub errors: Vec<Option<Error>>,
    /// True if the driver executed the batch through array binding; false if
    /// the row-by-row fallback ran.
    pub array_bound: bool,
}

impl BatchResult {
    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(Option::is_some)
    }
}

/// Metadata of one parameter marker, from `SQLDescribeParam`.
#[derive(Debug, Clone, Copy)]
pub struct ParameterDescription {
    /// Raw SQL data type tag.
    pub data_type: i16,
    pub size: u64,
    pub decimal_digits: i16,
    pub nullability: Nullability,
}

#[derive(Debug)]
struct OutputBinding {
    index: usize,
    c_type: CDataType,
}

pub(crate) struct StmtInner {
    pub(crate) handle: Handle,
    pub(crate) closed: bool,
    // Owners of the bound buffers and their length/indicator cells. The
    // driver holds their addresses between bind and execute; boxes keep the
    // addresses stable while the vectors grow.
    param_buffers: Vec<ParamBuffer>,
    indicators: Vec<Box<Len>>,
    outputs: Vec<OutputBinding>,
}

/// A prepared statement bound to its connection.
///
/// All operations on one statement serialise on an internal mutex. The
/// statement owns its driver handle and every parameter buffer bound to it;
/// buffers live until the next bind or [`Statement::close`].
pub struct Statement<'c> {
    conn: &'c Connection,
    query: String,
    num_params: i16,
    named: Option<NamedParams>,
    inner: Mutex<StmtInner>,
}

// An ODBC driver manager must be fully thread safe; access to the handle is
// serialised by the inner mutex.
unsafe impl Send for Statement<'_> {}
unsafe impl Sync for Statement<'_> {}

impl<'c> Statement<'c> {
    pub(crate) fn new(
        conn: &'c Connection,
        handle: Handle,
        query: String,
        num_params: i16,
        named: Option<NamedParams>,
    ) -> Self {
        Statement {
            conn,
            query,
            num_params,
            named,
            inner: Mutex::new(StmtInner {
                handle,
                closed: false,
                param_buffers: Vec::new(),
                indicators: Vec::new(),
                outputs: Vec::new(),
            }),
        }
    }

    pub(crate) fn connection(&self) -> &'c Connection {
        self.conn
    }

    pub(crate) fn lock_inner(&self) -> MutexGuard<'_, StmtInner> {
        self.inner.lock().unwrap()
    }

    /// Number of parameter markers reported by the driver at prepare time,
    /// or -1 if the driver could not tell.
    pub fn parameter_count(&self) -> i16 {
        self.num_params
    }

    /// The SQL text handed to the driver, after named-parameter rewriting.
    pub fn sql(&self) -> &str {
        self.named.as_ref().map_or(&self.query, |n| &n.query)
    }

    /// Names of the statement's named parameters in order of first
    /// appearance; empty for positional-only statements.
    pub fn parameter_names(&self) -> &[String] {
        self.named.as_ref().map_or(&[], |n| n.names.as_slice())
    }

    /// Releases the statement handle. Safe to call more than once; only the
    /// first call frees anything.
    pub fn close(&self) -> Result<(), Error> {
        let mut inner = self.lock_inner();
        if inner.closed {
            return Ok(());
        }
        inner.closed = true;
        let handle = inner.handle;
        inner.param_buffers.clear();
        inner.indicators.clear();
        inner.outputs.clear();
        self.conn
            .dm()
            .free_handle(HandleType::Stmt, handle)
            .into_result(HandleType::Stmt, handle)
    }

    /// Executes with positional values: the first value binds marker 1 and
    /// so on.
    pub fn execute(&self, args: &[Value]) -> Result<ExecResult, Error> {
        self.execute_named(&positional(args))
    }

    /// Executes with named or positional values.
    pub fn execute_named(&self, args: &[NamedValue]) -> Result<ExecResult, Error> {
        self.execute_inner(args, None)
    }

    /// Executes under a cancellation token. A token fired before any driver
    /// call fails immediately with [`Error::Cancelled`]; one fired during
    /// execution cancels the in-flight driver call.
    pub fn execute_with_cancel(
        &self,
        args: &[NamedValue],
        token: &CancelToken,
    ) -> Result<ExecResult, Error> {
        self.execute_inner(args, Some(token))
    }

    /// Runs a row-returning statement with positional values.
    pub fn query(&self, args: &[Value]) -> Result<Rows<'_>, Error> {
        self.query_named(&positional(args))
    }

    /// Runs a row-returning statement with named or positional values.
    pub fn query_named(&self, args: &[NamedValue]) -> Result<Rows<'_>, Error> {
        self.query_inner(args, None)
    }

    /// Runs a row-returning statement under a cancellation token.
    pub fn query_with_cancel(
        &self,
        args: &[NamedValue],
        token: &CancelToken,
    ) -> Result<Rows<'_>, Error> {
        self.query_inner(args, Some(token))
    }

    /// Describes the parameter marker at 1-based `ordinal`.
    pub fn describe_parameter(&self, ordinal: u16) -> Result<ParameterDescription, Error> {
        let inner = self.lock_inner();
        if inner.closed {
            return Err(Error::BadConnection);
        }
        let (data_type, size, decimal_digits, nullable) = self
            .conn
            .dm()
            .describe_param(inner.handle, ordinal)
            .into_result(HandleType::Stmt, inner.handle)?;
        Ok(ParameterDescription {
            data_type,
            size: size as u64,
            decimal_digits,
            nullability: match SqlNullability::from_i16(nullable) {
                Some(SqlNullability::NoNulls) => Nullability::NoNulls,
                Some(SqlNullability::Nullable) => Nullability::Nullable,
                _ => Nullability::Unknown,
            },
        })
    }

    fn execute_inner(
        &self,
        args: &[NamedValue],
        token: Option<&CancelToken>,
    ) -> Result<ExecResult, Error> {
        let mut inner = self.lock_inner();
        if inner.closed {
            return Err(Error::BadConnection);
        }
        let dm = self.conn.dm();
        let handle = inner.handle;

        if token.is_some_and(CancelToken::is_fired) {
            return Err(Error::Cancelled);
        }
        self.apply_query_timeout(dm, handle);
        self.bind_args(&mut inner, args)?;

        let exec = run_with_watcher(dm, handle, token);
        if exec.is_err() {
            if token.is_some_and(CancelToken::is_fired) {
                return Err(Error::Cancelled);
            }
            exec.into_result(HandleType::Stmt, handle)?;
        } else {
            // SQL_NO_DATA is fine here: DML which affected zero rows.
            exec.into_result_with(HandleType::Stmt, handle, Some(()))?;
        }

        let rows_affected = match dm.row_count(handle) {
            SqlResult::Success(count) | SqlResult::SuccessWithInfo(count) => count as i64,
            _ => 0,
        };

        let output_params = self.collect_outputs(&inner);

        let last_insert_id = if is_insert_statement(&self.query) {
            self.conn.last_insert_id()
        } else {
            0
        };

        // Clear the bindings so the statement can be re-executed.
        let _ = dm.free_stmt(handle, FreeStmtOption::ResetParams);
        inner.outputs.clear();

        Ok(ExecResult {
            rows_affected,
            last_insert_id,
            output_params,
        })
    }

    fn query_inner(
        &self,
        args: &[NamedValue],
        token: Option<&CancelToken>,
    ) -> Result<Rows<'_>, Error> {
        self.execute_for_query(args, token)?;
        Rows::new(StmtRef::Borrowed(self))
    }

    /// Binds and executes without building the row iterator. Used by the
    /// connection's direct-query path, which hands the statement itself to
    /// the iterator afterwards.
    pub(crate) fn execute_for_query(
        &self,
        args: &[NamedValue],
        token: Option<&CancelToken>,
    ) -> Result<(), Error> {
        let mut inner = self.lock_inner();
        if inner.closed {
            return Err(Error::BadConnection);
        }
        let dm = self.conn.dm();
        let handle = inner.handle;

        if token.is_some_and(CancelToken::is_fired) {
            return Err(Error::Cancelled);
        }
        self.apply_query_timeout(dm, handle);
        self.bind_args(&mut inner, args)?;

        let exec = run_with_watcher(dm, handle, token);
        if exec.is_err() {
            if token.is_some_and(CancelToken::is_fired) {
                return Err(Error::Cancelled);
            }
            exec.into_result(HandleType::Stmt, handle)?;
        } else {
            exec.into_result_with(HandleType::Stmt, handle, Some(()))?;
        }
        Ok(())
    }

    /// Executes the statement once per parameter set, packing all sets into
    /// driver-side array binding where the driver supports it and falling
    /// back to row-by-row execution otherwise.
    pub fn execute_batch(&self, sets: &[Vec<Value>]) -> Result<BatchResult, Error> {
        let mut inner = self.lock_inner();
        if inner.closed {
            return Err(Error::BadConnection);
        }
        if sets.is_empty() {
            return Ok(BatchResult::default());
        }
        for row in sets {
            if row.iter().any(|v| matches!(v, Value::Output(_))) {
                return Err(Error::parameter(
                    "<output>",
                    "output parameters are not supported in batch execution",
                ));
            }
        }

        let dm = self.conn.dm();
        let rows = sets.len();
        let num_params = sets[0].len();
        let mut result = BatchResult {
            total_rows_affected: 0,
            row_counts: vec![0; rows],
            errors: (0..rows).map(|_| None).collect(),
            array_bound: false,
        };

        let array_bound =
            num_params > 0 && self.run_array_binding(&mut inner, dm, sets, num_params, &mut result);
        if array_bound {
            result.array_bound = true;
        } else {
            self.run_row_by_row(&mut inner, dm, sets, &mut result);
        }
        inner.outputs.clear();
        Ok(result)
    }

    /// Attempts array binding. Returns false when any setup step is refused
    /// by the driver, in which case the statement attributes are restored
    /// and the caller falls back to row-by-row execution.
    fn run_array_binding(
        &self,
        inner: &mut StmtInner,
        dm: &'static DriverManager,
        sets: &[Vec<Value>],
        num_params: usize,
        result: &mut BatchResult,
    ) -> bool {
        let handle = inner.handle;
        let rows = sets.len();

        if dm
            .set_stmt_attr(handle, SQL_ATTR_PARAMSET_SIZE, rows as ULen)
            .is_err()
        {
            return false;
        }
        let reset = |dm: &DriverManager| {
            let _ = dm.set_stmt_attr(handle, SQL_ATTR_PARAMSET_SIZE, 1);
            let _ = dm.free_stmt(handle, FreeStmtOption::ResetParams);
        };
        if dm
            .set_stmt_attr(handle, SQL_ATTR_PARAM_BIND_TYPE, SQL_PARAM_BIND_BY_COLUMN)
            .is_err()
        {
            reset(dm);
            return false;
        }

        let mut status = vec![SQL_PARAM_UNUSED; rows];
        let mut processed: ULen = 0;
        unsafe {
            if dm
                .set_stmt_attr_ptr(
                    handle,
                    SQL_ATTR_PARAM_STATUS_PTR,
                    status.as_mut_ptr() as Pointer,
                )
                .is_err()
            {
                reset(dm);
                return false;
            }
            if dm
                .set_stmt_attr_ptr(
                    handle,
                    SQL_ATTR_PARAMS_PROCESSED_PTR,
                    &mut processed as *mut ULen as Pointer,
                )
                .is_err()
            {
                reset(dm);
                return false;
            }
        }

        // Pack one column-major buffer per parameter and bind it once. The
        // buffers must outlive the execute call below.
        let mut columns: Vec<ColumnBuffer> = Vec::with_capacity(num_params);
        for param_idx in 0..num_params {
            let values: Vec<&Value> = sets
                .iter()
                .map(|row| row.get(param_idx).unwrap_or(&NULL_VALUE))
                .collect();
            columns.push(allocate_column(&values));
            let column = columns.last_mut().expect("column was just pushed");
            let data_ptr = column.data_ptr();
            let bound = unsafe {
                dm.bind_parameter(
                    handle,
                    (param_idx + 1) as u16,
                    ParamType::Input,
                    column.c_type,
                    column.sql_type,
                    column.column_size,
                    column.decimal_digits,
                    data_ptr,
                    column.elem_size as Len,
                    column.lengths.as_mut_ptr(),
                )
            };
            if bound.is_err() {
                reset(dm);
                return false;
            }
        }

        let exec = dm.execute(handle);
        match exec {
            SqlResult::Success(()) | SqlResult::SuccessWithInfo(()) => {
                let total = match dm.row_count(handle) {
                    SqlResult::Success(count) | SqlResult::SuccessWithInfo(count) => count as i64,
                    _ => 0,
                };
                result.total_rows_affected = total;

                let mut success_count = 0i64;
                for (i, &row_status) in status.iter().enumerate() {
                    match row_status {
                        SQL_PARAM_SUCCESS | SQL_PARAM_SUCCESS_WITH_INFO => {
                            result.row_counts[i] = 1;
                            success_count += 1;
                        }
                        SQL_PARAM_ERROR => result.errors[i] = Some(Error::BatchRow { row: i }),
                        SQL_PARAM_UNUSED => result.row_counts[i] = 0,
                        _ => {
                            result.row_counts[i] = 1;
                            success_count += 1;
                        }
                    }
                }
                // The driver only reports a grand total; spread it evenly
                // over the successful sets.
                if success_count > 0 && total > 0 {
                    let per_row = total / success_count;
                    for i in 0..rows {
                        if result.errors[i].is_none() && result.row_counts[i] > 0 {
                            result.row_counts[i] = per_row;
                        }
                    }
                }
            }
            SqlResult::NoData => {
                result.total_rows_affected = 0;
            }
            _ => {
                let error = Error::from_diagnostics("SQLExecute", HandleType::Stmt, handle);
                for slot in result.errors.iter_mut() {
                    *slot = Some(error.clone());
                }
            }
        }

        // Unregister the stack-owned status buffers before they go away,
        // then restore single-set execution.
        unsafe {
            let _ = dm.set_stmt_attr_ptr(handle, SQL_ATTR_PARAM_STATUS_PTR, null_mut());
            let _ = dm.set_stmt_attr_ptr(handle, SQL_ATTR_PARAMS_PROCESSED_PTR, null_mut());
        }
        let _ = dm.set_stmt_attr(handle, SQL_ATTR_PARAMSET_SIZE, 1);
        let _ = dm.free_stmt(handle, FreeStmtOption::ResetParams);
        true
    }

    fn run_row_by_row(
        &self,
        inner: &mut StmtInner,
        dm: &'static DriverManager,
        sets: &[Vec<Value>],
        result: &mut BatchResult,
    ) {
        let handle = inner.handle;
        for (i, set) in sets.iter().enumerate() {
            let args = positional(set);
            if let Err(err) = self.bind_args(inner, &args) {
                result.errors[i] = Some(err);
                continue;
            }
            let exec = dm.execute(handle);
            if exec.is_err() {
                result.errors[i] = Some(Error::from_diagnostics(
                    "SQLExecute",
                    HandleType::Stmt,
                    handle,
                ));
                continue;
            }
            let count = match dm.row_count(handle) {
                SqlResult::Success(count) | SqlResult::SuccessWithInfo(count) => count as i64,
                _ => 0,
            };
            result.row_counts[i] = count;
            result.total_rows_affected += count;
            let _ = dm.free_stmt(handle, FreeStmtOption::ResetParams);
        }
    }

    fn apply_query_timeout(&self, dm: &DriverManager, handle: Handle) {
        if let Some(timeout) = self.conn.options().query_timeout {
            let seconds = timeout.as_secs_f64().ceil().max(1.0) as ULen;
            // Degrades silently: not every driver supports a timeout.
            let _ = dm.set_stmt_attr(handle, SQL_ATTR_QUERY_TIMEOUT, seconds);
        }
    }

    /// Resolves the supplied values to 1-based positions and binds each one.
    fn bind_args(&self, inner: &mut StmtInner, args: &[NamedValue]) -> Result<(), Error> {
        inner.param_buffers.clear();
        inner.indicators.clear();
        inner.outputs.clear();

        if let Some(named) = &self.named {
            return self.bind_named_args(inner, named, args);
        }

        for arg in args {
            if let Some(name) = &arg.name {
                return Err(Error::parameter(
                    name.clone(),
                    "statement has no named parameters",
                ));
            }
            self.bind_one(inner, arg.ordinal, &arg.value)?;
        }
        Ok(())
    }

    fn bind_named_args(
        &self,
        inner: &mut StmtInner,
        named: &NamedParams,
        args: &[NamedValue],
    ) -> Result<(), Error> {
        let mut by_name: HashMap<&str, &Value> = HashMap::new();
        let mut by_ordinal: HashMap<usize, &Value> = HashMap::new();
        for arg in args {
            match &arg.name {
                Some(name) => {
                    by_name.insert(name.as_str(), &arg.value);
                }
                None if arg.ordinal > 0 => {
                    by_ordinal.insert(arg.ordinal, &arg.value);
                }
                None => {
                    return Err(Error::parameter(
                        "<unnamed>",
                        "ordinal must be 1 or greater",
                    ))
                }
            }
        }

        // Ordinal arguments address names by their order of first
        // appearance.
        for (name_idx, name) in named.names.iter().enumerate() {
            let value = by_name
                .get(name.as_str())
                .or_else(|| by_ordinal.get(&(name_idx + 1)))
                .ok_or_else(|| {
                    Error::parameter(name.clone(), "missing value for named parameter")
                })?;
            if let Some(positions) = named.positions.get(name) {
                for &position in positions {
                    self.bind_one(inner, position, value)?;
                }
            }
        }
        Ok(())
    }

    /// Marshals `value` and hands its buffer to the driver for `position`.
    fn bind_one(&self, inner: &mut StmtInner, position: usize, value: &Value) -> Result<(), Error> {
        if position < 1 {
            return Err(Error::parameter(
                format!("#{position}"),
                "ordinal must be 1 or greater",
            ));
        }
        if position > MAX_PARAMETERS {
            return Err(Error::parameter(
                format!("#{position}"),
                format!("ordinal exceeds the maximum of {MAX_PARAMETERS}"),
            ));
        }
        let idx = position - 1;
        while inner.param_buffers.len() <= idx {
            inner.param_buffers.push(ParamBuffer::None);
            inner.indicators.push(Box::new(0));
        }

        let (bound, direction) = match value {
            Value::Output(param) => {
                let direction = match param.direction {
                    ParamDirection::Input => ParamType::Input,
                    ParamDirection::Output => ParamType::Output,
                    ParamDirection::InputOutput => ParamType::InputOutput,
                };
                (allocate_output_buffer(param)?, direction)
            }
            other => (to_odbc(other)?, ParamType::Input),
        };

        let BoundParam {
            buffer,
            c_type,
            sql_type,
            column_size,
            decimal_digits,
            indicator,
        } = bound;
        inner.param_buffers[idx] = buffer;
        *inner.indicators[idx] = indicator;

        let handle = inner.handle;
        let (data_ptr, buffer_len) = inner.param_buffers[idx].as_mut_ptr();
        let indicator_ptr: *mut Len = &mut *inner.indicators[idx];
        unsafe {
            self.conn.dm().bind_parameter(
                handle,
                position as u16,
                direction,
                c_type,
                sql_type,
                column_size,
                decimal_digits,
                data_ptr,
                buffer_len,
                indicator_ptr,
            )
        }
        .into_result(HandleType::Stmt, handle)?;

        if direction != ParamType::Input {
            inner.outputs.push(OutputBinding { index: idx, c_type });
        }
        Ok(())
    }

    /// Reconstructs output-parameter values from their driver-filled
    /// buffers.
    fn collect_outputs(&self, inner: &StmtInner) -> Vec<Option<Value>> {
        if inner.outputs.is_empty() {
            return Vec::new();
        }
        let len = inner
            .outputs
            .iter()
            .map(|o| o.index + 1)
            .max()
            .unwrap_or(0);
        let mut values: Vec<Option<Value>> = vec![None; len];
        let precision = self.conn.options().timestamp_precision;
        for output in &inner.outputs {
            let value = convert_output(
                &inner.param_buffers[output.index],
                output.c_type,
                *inner.indicators[output.index],
                precision,
            );
            values[output.index] = Some(value);
        }
        values
    }
}

impl Drop for Statement<'_> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

pub(crate) fn positional(args: &[Value]) -> Vec<NamedValue> {
    args.iter()
        .enumerate()
        .map(|(i, value)| NamedValue {
            name: None,
            ordinal: i + 1,
            value: value.clone(),
        })
        .collect()
}

/// Runs `SQLExecute`, watching the cancellation token while the driver call
/// is in flight. The watcher issues `SQLCancel` at most once and exits as
/// soon as execution completes.
fn run_with_watcher(
    dm: &'static DriverManager,
    handle: Handle,
    token: Option<&CancelToken>,
) -> SqlResult<()> {
    let Some(token) = token else {
        return dm.execute(handle);
    };
    let done = Arc::new(AtomicBool::new(false));
    let watcher = {
        let token = token.clone();
        let done = Arc::clone(&done);
        let address = handle as usize;
        thread::spawn(move || {
            if token.wait_fired_or(&done) {
                let _ = dm.cancel(address as Handle);
            }
        })
    };
    let result = dm.execute(handle);
    done.store(true, Ordering::Release);
    token.wake();
    let _ = watcher.join();
    result
}

/// True if the statement text begins with the keyword INSERT.
pub(crate) fn is_insert_statement(query: &str) -> bool {
    let trimmed = query.trim_start();
    let Some(head) = trimmed.get(..6) else {
        return false;
    };
    if !head.eq_ignore_ascii_case("INSERT") {
        return false;
    }
    trimmed[6..]
        .chars()
        .next()
        .map_or(true, |c| c.is_whitespace())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn insert_detection_skips_leading_whitespace() {
        assert!(is_insert_statement("INSERT INTO t VALUES (1)"));
        assert!(is_insert_statement("  \t\n insert into t values (1)"));
        assert!(is_insert_statement("InSeRt\tINTO t VALUES (1)"));
        assert!(is_insert_statement("INSERT"));
    }

    #[test]
    fn insert_detection_requires_a_word_boundary() {
        assert!(!is_insert_statement("INSERTED_ROWS"));
        assert!(!is_insert_statement("SELECT * FROM inserts"));
        assert!(!is_insert_statement("UPDATE t SET a = 1"));
        assert!(!is_insert_statement(""));
        assert!(!is_insert_statement("INS"));
    }

    #[test]
    fn positional_args_take_one_based_ordinals() {
        let args = positional(&[Value::Int(1), Value::Int(2)]);
        assert_eq!(1, args[0].ordinal);
        assert_eq!(2, args[1].ordinal);
        assert!(args.iter().all(|a| a.name.is_none()));
    }
}
