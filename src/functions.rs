//! Thin typed wrappers over the resolved entry points.
//!
//! Each wrapper converts Rust-side argument shapes (string slices, typed
//! out-parameters) into the raw pointer-and-length shapes of the C ABI and
//! returns a [`SqlResult`]. No wrapper allocates long-lived state, swallows
//! an error or retries.

use crate::defs::{
    CDataType, CompletionType, FreeStmtOption, Handle, HandleType, Integer, Len, ParamType,
    Pointer, SmallInt, SqlDataType, ULen, USmallInt, SQL_DRIVER_NOPROMPT, SQL_NTS,
};
use crate::loader::DriverManager;
use crate::sql_result::{ExtSqlReturn, SqlResult};
use std::ptr::{null, null_mut};

/// Appends the terminating zero expected by the narrow text entry points.
fn nul_terminated(text: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(text.len() + 1);
    buf.extend_from_slice(text.as_bytes());
    buf.push(0);
    buf
}

fn catalog_arg(text: Option<&str>) -> (*const u8, SmallInt) {
    match text {
        Some(t) => (t.as_ptr(), t.len() as SmallInt),
        None => (null(), 0),
    }
}

impl DriverManager {
    pub(crate) fn alloc_handle(
        &self,
        handle_type: HandleType,
        parent: Handle,
    ) -> SqlResult<Handle> {
        let mut handle: Handle = null_mut();
        unsafe { (self.alloc_handle)(handle_type as SmallInt, parent, &mut handle) }
            .into_sql_result("SQLAllocHandle")
            .on_success(|| handle)
    }

    pub(crate) fn free_handle(&self, handle_type: HandleType, handle: Handle) -> SqlResult<()> {
        unsafe { (self.free_handle)(handle_type as SmallInt, handle) }
            .into_sql_result("SQLFreeHandle")
    }

    pub(crate) fn set_env_attr(
        &self,
        env: Handle,
        attribute: Integer,
        value: ULen,
    ) -> SqlResult<()> {
        unsafe { (self.set_env_attr)(env, attribute, value as Pointer, 0) }
            .into_sql_result("SQLSetEnvAttr")
    }

    /// Connects using a full connection string, without prompting.
    pub(crate) fn driver_connect(&self, dbc: Handle, connection_string: &str) -> SqlResult<()> {
        let in_str = nul_terminated(connection_string);
        // The completed connection string is of no interest here.
        let mut out_len: SmallInt = 0;
        unsafe {
            (self.driver_connect)(
                dbc,
                null_mut(),
                in_str.as_ptr(),
                SQL_NTS as SmallInt,
                null_mut(),
                0,
                &mut out_len,
                SQL_DRIVER_NOPROMPT,
            )
        }
        .into_sql_result("SQLDriverConnect")
    }

    pub(crate) fn disconnect(&self, dbc: Handle) -> SqlResult<()> {
        unsafe { (self.disconnect)(dbc) }.into_sql_result("SQLDisconnect")
    }

    pub(crate) fn set_connect_attr(
        &self,
        dbc: Handle,
        attribute: Integer,
        value: ULen,
    ) -> SqlResult<()> {
        unsafe { (self.set_connect_attr)(dbc, attribute, value as Pointer, 0) }
            .into_sql_result("SQLSetConnectAttr")
    }

    pub(crate) fn get_connect_attr_ulen(
        &self,
        dbc: Handle,
        attribute: Integer,
    ) -> SqlResult<ULen> {
        let mut value: ULen = 0;
        let mut out_len: Integer = 0;
        unsafe {
            (self.get_connect_attr)(
                dbc,
                attribute,
                &mut value as *mut ULen as Pointer,
                0,
                &mut out_len,
            )
        }
        .into_sql_result("SQLGetConnectAttr")
        .on_success(|| value)
    }

    /// Fetches a textual information item, e.g. the DBMS name.
    pub(crate) fn get_info_string(&self, dbc: Handle, info_type: USmallInt) -> SqlResult<String> {
        let mut buf = [0u8; 256];
        let mut str_len: SmallInt = 0;
        unsafe {
            (self.get_info)(
                dbc,
                info_type,
                buf.as_mut_ptr() as Pointer,
                buf.len() as SmallInt,
                &mut str_len,
            )
        }
        .into_sql_result("SQLGetInfo")
        .on_success(|| {
            let mut end = (str_len.max(0) as usize).min(buf.len());
            if let Some(nul) = buf[..end].iter().position(|&b| b == 0) {
                end = nul;
            }
            String::from_utf8_lossy(&buf[..end]).into_owned()
        })
    }

    pub(crate) fn exec_direct(&self, stmt: Handle, sql: &str) -> SqlResult<()> {
        let text = nul_terminated(sql);
        unsafe { (self.exec_direct)(stmt, text.as_ptr(), SQL_NTS) }
            .into_sql_result("SQLExecDirect")
    }

    pub(crate) fn prepare(&self, stmt: Handle, sql: &str) -> SqlResult<()> {
        let text = nul_terminated(sql);
        unsafe { (self.prepare)(stmt, text.as_ptr(), SQL_NTS) }.into_sql_result("SQLPrepare")
    }

    pub(crate) fn execute(&self, stmt: Handle) -> SqlResult<()> {
        unsafe { (self.execute)(stmt) }.into_sql_result("SQLExecute")
    }

    pub(crate) fn num_result_cols(&self, stmt: Handle) -> SqlResult<SmallInt> {
        let mut count: SmallInt = 0;
        unsafe { (self.num_result_cols)(stmt, &mut count) }
            .into_sql_result("SQLNumResultCols")
            .on_success(|| count)
    }

    /// Raw column description: name, SQL type tag, column size, decimal
    /// digits and nullability, straight from the driver.
    pub(crate) fn describe_col(
        &self,
        stmt: Handle,
        column: USmallInt,
    ) -> SqlResult<(String, SmallInt, ULen, SmallInt, SmallInt)> {
        let mut name = [0u8; 256];
        let mut name_len: SmallInt = 0;
        let mut data_type: SmallInt = 0;
        let mut column_size: ULen = 0;
        let mut decimal_digits: SmallInt = 0;
        let mut nullable: SmallInt = 0;
        unsafe {
            (self.describe_col)(
                stmt,
                column,
                name.as_mut_ptr(),
                name.len() as SmallInt,
                &mut name_len,
                &mut data_type,
                &mut column_size,
                &mut decimal_digits,
                &mut nullable,
            )
        }
        .into_sql_result("SQLDescribeCol")
        .on_success(|| {
            let end = (name_len.max(0) as usize).min(name.len());
            (
                String::from_utf8_lossy(&name[..end]).into_owned(),
                data_type,
                column_size,
                decimal_digits,
                nullable,
            )
        })
    }

    /// # Safety
    ///
    /// `value` and `indicator` must stay valid (and must not move) until the
    /// binding is released via `SQLFreeStmt` or the handle is freed.
    #[allow(clippy::too_many_arguments)]
    pub(crate) unsafe fn bind_parameter(
        &self,
        stmt: Handle,
        number: USmallInt,
        direction: ParamType,
        c_type: CDataType,
        sql_type: SqlDataType,
        column_size: ULen,
        decimal_digits: SmallInt,
        value: Pointer,
        buffer_len: Len,
        indicator: *mut Len,
    ) -> SqlResult<()> {
        (self.bind_parameter)(
            stmt,
            number,
            direction as SmallInt,
            c_type as SmallInt,
            sql_type as SmallInt,
            column_size,
            decimal_digits,
            value,
            buffer_len,
            indicator,
        )
        .into_sql_result("SQLBindParameter")
    }

    pub(crate) fn fetch(&self, stmt: Handle) -> SqlResult<()> {
        unsafe { (self.fetch)(stmt) }.into_sql_result("SQLFetch")
    }

    pub(crate) fn fetch_scroll(
        &self,
        stmt: Handle,
        orientation: SmallInt,
        offset: Len,
    ) -> SqlResult<()> {
        unsafe { (self.fetch_scroll)(stmt, orientation, offset) }
            .into_sql_result("SQLFetchScroll")
    }

    /// # Safety
    ///
    /// `buffer` must point to at least `buffer_len` writable bytes.
    pub(crate) unsafe fn get_data(
        &self,
        stmt: Handle,
        column: USmallInt,
        c_type: CDataType,
        buffer: Pointer,
        buffer_len: Len,
        indicator: &mut Len,
    ) -> SqlResult<()> {
        (self.get_data)(
            stmt,
            column,
            c_type as SmallInt,
            buffer,
            buffer_len,
            indicator,
        )
        .into_sql_result("SQLGetData")
    }

    pub(crate) fn row_count(&self, stmt: Handle) -> SqlResult<Len> {
        let mut count: Len = 0;
        unsafe { (self.row_count)(stmt, &mut count) }
            .into_sql_result("SQLRowCount")
            .on_success(|| count)
    }

    pub(crate) fn num_params(&self, stmt: Handle) -> SqlResult<SmallInt> {
        let mut count: SmallInt = 0;
        unsafe { (self.num_params)(stmt, &mut count) }
            .into_sql_result("SQLNumParams")
            .on_success(|| count)
    }

    pub(crate) fn describe_param(
        &self,
        stmt: Handle,
        number: USmallInt,
    ) -> SqlResult<(SmallInt, ULen, SmallInt, SmallInt)> {
        let mut data_type: SmallInt = 0;
        let mut size: ULen = 0;
        let mut decimal_digits: SmallInt = 0;
        let mut nullable: SmallInt = 0;
        unsafe {
            (self.describe_param)(
                stmt,
                number,
                &mut data_type,
                &mut size,
                &mut decimal_digits,
                &mut nullable,
            )
        }
        .into_sql_result("SQLDescribeParam")
        .on_success(|| (data_type, size, decimal_digits, nullable))
    }

    pub(crate) fn end_tran(
        &self,
        handle_type: HandleType,
        handle: Handle,
        completion: CompletionType,
    ) -> SqlResult<()> {
        unsafe { (self.end_tran)(handle_type as SmallInt, handle, completion as SmallInt) }
            .into_sql_result("SQLEndTran")
    }

    pub(crate) fn close_cursor(&self, stmt: Handle) -> SqlResult<()> {
        unsafe { (self.close_cursor)(stmt) }.into_sql_result("SQLCloseCursor")
    }

    pub(crate) fn cancel(&self, stmt: Handle) -> SqlResult<()> {
        unsafe { (self.cancel)(stmt) }.into_sql_result("SQLCancel")
    }

    pub(crate) fn free_stmt(&self, stmt: Handle, option: FreeStmtOption) -> SqlResult<()> {
        unsafe { (self.free_stmt)(stmt, option as USmallInt) }.into_sql_result("SQLFreeStmt")
    }

    pub(crate) fn more_results(&self, stmt: Handle) -> SqlResult<()> {
        unsafe { (self.more_results)(stmt) }.into_sql_result("SQLMoreResults")
    }

    pub(crate) fn set_stmt_attr(
        &self,
        stmt: Handle,
        attribute: Integer,
        value: ULen,
    ) -> SqlResult<()> {
        unsafe { (self.set_stmt_attr)(stmt, attribute, value as Pointer, 0) }
            .into_sql_result("SQLSetStmtAttr")
    }

    /// Registers a caller-owned buffer address as a statement attribute
    /// (status arrays, processed-row counters).
    ///
    /// # Safety
    ///
    /// The pointed-to memory must stay valid until the attribute is reset.
    pub(crate) unsafe fn set_stmt_attr_ptr(
        &self,
        stmt: Handle,
        attribute: Integer,
        value: Pointer,
    ) -> SqlResult<()> {
        (self.set_stmt_attr)(stmt, attribute, value, 0).into_sql_result("SQLSetStmtAttr")
    }

    pub(crate) fn tables(
        &self,
        stmt: Handle,
        catalog: Option<&str>,
        schema: Option<&str>,
        table: Option<&str>,
        table_type: Option<&str>,
    ) -> SqlResult<()> {
        let (cat, cat_len) = catalog_arg(catalog);
        let (sch, sch_len) = catalog_arg(schema);
        let (tab, tab_len) = catalog_arg(table);
        let (typ, typ_len) = catalog_arg(table_type);
        unsafe {
            (self.tables)(
                stmt, cat, cat_len, sch, sch_len, tab, tab_len, typ, typ_len,
            )
        }
        .into_sql_result("SQLTables")
    }

    pub(crate) fn columns(
        &self,
        stmt: Handle,
        catalog: Option<&str>,
        schema: Option<&str>,
        table: Option<&str>,
        column: Option<&str>,
    ) -> SqlResult<()> {
        let (cat, cat_len) = catalog_arg(catalog);
        let (sch, sch_len) = catalog_arg(schema);
        let (tab, tab_len) = catalog_arg(table);
        let (col, col_len) = catalog_arg(column);
        unsafe {
            (self.columns)(
                stmt, cat, cat_len, sch, sch_len, tab, tab_len, col, col_len,
            )
        }
        .into_sql_result("SQLColumns")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nul_terminated_appends_single_zero() {
        assert_eq!(b"SELECT 1\0".to_vec(), nul_terminated("SELECT 1"));
        assert_eq!(vec![0u8], nul_terminated(""));
    }

    #[test]
    fn absent_catalog_argument_is_null() {
        let (ptr, len) = catalog_arg(None);
        assert!(ptr.is_null());
        assert_eq!(0, len);
        let (ptr, len) = catalog_arg(Some("dbo"));
        assert!(!ptr.is_null());
        assert_eq!(3, len);
    }
}
