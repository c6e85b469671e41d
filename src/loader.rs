//! Runtime resolution of the ODBC driver manager.
//!
//! The driver manager is never linked at build time. Instead the shared
//! library is located, loaded once per process and all required entry points
//! are resolved up front. A single missing symbol fails the whole
//! initialisation; partial binding is not allowed.

use crate::defs::{Char, Handle, Integer, Len, Pointer, SmallInt, SqlReturn, ULen, USmallInt};
use crate::error::Error;
use lazy_static::lazy_static;
use libloading::Library;
use log::debug;
use std::env;
#[cfg(target_os = "macos")]
use std::path::Path;

/// Environment variable naming a full path to the driver manager library.
/// Takes precedence over the platform defaults.
pub const LIBRARY_PATH_ENV: &str = "ODBCDIRECT_LIBRARY_PATH";

#[cfg(target_os = "macos")]
const DEFAULT_CANDIDATES: &[&str] = &[
    "/opt/homebrew/lib/libodbc.2.dylib",
    "/usr/local/lib/libodbc.2.dylib",
    "/opt/homebrew/lib/libodbc.dylib",
    "/usr/local/lib/libodbc.dylib",
];

// Text-carrying entry points resolve to their ANSI variant on Windows. On
// other platforms the unsuffixed name already is the narrow one.
#[cfg(windows)]
const ANSI_SUFFIX: &str = "A";
#[cfg(not(windows))]
const ANSI_SUFFIX: &str = "";

type AllocHandleFn = unsafe extern "system" fn(SmallInt, Handle, *mut Handle) -> SqlReturn;
type FreeHandleFn = unsafe extern "system" fn(SmallInt, Handle) -> SqlReturn;
type SetAttrFn = unsafe extern "system" fn(Handle, Integer, Pointer, Integer) -> SqlReturn;
type GetAttrFn =
    unsafe extern "system" fn(Handle, Integer, Pointer, Integer, *mut Integer) -> SqlReturn;
type DriverConnectFn = unsafe extern "system" fn(
    Handle,
    Pointer,
    *const Char,
    SmallInt,
    *mut Char,
    SmallInt,
    *mut SmallInt,
    USmallInt,
) -> SqlReturn;
type HandleOnlyFn = unsafe extern "system" fn(Handle) -> SqlReturn;
type GetInfoFn =
    unsafe extern "system" fn(Handle, USmallInt, Pointer, SmallInt, *mut SmallInt) -> SqlReturn;
type SqlTextFn = unsafe extern "system" fn(Handle, *const Char, Integer) -> SqlReturn;
type OutSmallIntFn = unsafe extern "system" fn(Handle, *mut SmallInt) -> SqlReturn;
type DescribeColFn = unsafe extern "system" fn(
    Handle,
    USmallInt,
    *mut Char,
    SmallInt,
    *mut SmallInt,
    *mut SmallInt,
    *mut ULen,
    *mut SmallInt,
    *mut SmallInt,
) -> SqlReturn;
type ColAttributeFn = unsafe extern "system" fn(
    Handle,
    USmallInt,
    USmallInt,
    Pointer,
    SmallInt,
    *mut SmallInt,
    *mut Len,
) -> SqlReturn;
type BindColFn =
    unsafe extern "system" fn(Handle, USmallInt, SmallInt, Pointer, Len, *mut Len) -> SqlReturn;
type BindParameterFn = unsafe extern "system" fn(
    Handle,
    USmallInt,
    SmallInt,
    SmallInt,
    SmallInt,
    ULen,
    SmallInt,
    Pointer,
    Len,
    *mut Len,
) -> SqlReturn;
type FetchScrollFn = unsafe extern "system" fn(Handle, SmallInt, Len) -> SqlReturn;
type GetDataFn =
    unsafe extern "system" fn(Handle, USmallInt, SmallInt, Pointer, Len, *mut Len) -> SqlReturn;
type OutLenFn = unsafe extern "system" fn(Handle, *mut Len) -> SqlReturn;
type DescribeParamFn = unsafe extern "system" fn(
    Handle,
    USmallInt,
    *mut SmallInt,
    *mut ULen,
    *mut SmallInt,
    *mut SmallInt,
) -> SqlReturn;
type GetDiagRecFn = unsafe extern "system" fn(
    SmallInt,
    Handle,
    SmallInt,
    *mut Char,
    *mut Integer,
    *mut Char,
    SmallInt,
    *mut SmallInt,
) -> SqlReturn;
type GetDiagFieldFn = unsafe extern "system" fn(
    SmallInt,
    Handle,
    SmallInt,
    SmallInt,
    Pointer,
    SmallInt,
    *mut SmallInt,
) -> SqlReturn;
type EndTranFn = unsafe extern "system" fn(SmallInt, Handle, SmallInt) -> SqlReturn;
type FreeStmtFn = unsafe extern "system" fn(Handle, USmallInt) -> SqlReturn;
type CatalogFn = unsafe extern "system" fn(
    Handle,
    *const Char,
    SmallInt,
    *const Char,
    SmallInt,
    *const Char,
    SmallInt,
    *const Char,
    SmallInt,
) -> SqlReturn;

/// The resolved driver manager: the loaded library plus one function pointer
/// per required entry point. Immutable for the lifetime of the process.
#[allow(dead_code)]
pub(crate) struct DriverManager {
    // Keeps the shared library mapped for as long as the function pointers
    // below are reachable.
    _library: Library,
    pub(crate) alloc_handle: AllocHandleFn,
    pub(crate) free_handle: FreeHandleFn,
    pub(crate) set_env_attr: SetAttrFn,
    pub(crate) get_env_attr: GetAttrFn,
    pub(crate) driver_connect: DriverConnectFn,
    pub(crate) disconnect: HandleOnlyFn,
    pub(crate) set_connect_attr: SetAttrFn,
    pub(crate) get_connect_attr: GetAttrFn,
    pub(crate) get_info: GetInfoFn,
    pub(crate) exec_direct: SqlTextFn,
    pub(crate) prepare: SqlTextFn,
    pub(crate) execute: HandleOnlyFn,
    pub(crate) num_result_cols: OutSmallIntFn,
    pub(crate) describe_col: DescribeColFn,
    pub(crate) col_attribute: ColAttributeFn,
    pub(crate) bind_col: BindColFn,
    pub(crate) bind_parameter: BindParameterFn,
    pub(crate) fetch: HandleOnlyFn,
    pub(crate) fetch_scroll: FetchScrollFn,
    pub(crate) get_data: GetDataFn,
    pub(crate) row_count: OutLenFn,
    pub(crate) num_params: OutSmallIntFn,
    pub(crate) describe_param: DescribeParamFn,
    pub(crate) get_diag_rec: GetDiagRecFn,
    pub(crate) get_diag_field: GetDiagFieldFn,
    pub(crate) end_tran: EndTranFn,
    pub(crate) close_cursor: HandleOnlyFn,
    pub(crate) cancel: HandleOnlyFn,
    pub(crate) free_stmt: FreeStmtFn,
    pub(crate) more_results: HandleOnlyFn,
    pub(crate) set_stmt_attr: SetAttrFn,
    pub(crate) get_stmt_attr: GetAttrFn,
    pub(crate) tables: CatalogFn,
    pub(crate) columns: CatalogFn,
}

lazy_static! {
    static ref DRIVER_MANAGER: Result<DriverManager, Error> = DriverManager::load();
}

/// Returns the process-wide driver manager, loading it on first use. A failed
/// load is terminal: the same error is reported on every subsequent call.
pub(crate) fn driver_manager() -> Result<&'static DriverManager, Error> {
    DRIVER_MANAGER.as_ref().map_err(Clone::clone)
}

/// Resolves the library path: explicit override first, then the platform
/// default list.
pub(crate) fn resolve_library_path(explicit: Option<String>) -> String {
    if let Some(path) = explicit {
        if !path.is_empty() {
            return path;
        }
    }
    default_library_path()
}

#[cfg(windows)]
fn default_library_path() -> String {
    "odbc32.dll".to_string()
}

#[cfg(target_os = "macos")]
fn default_library_path() -> String {
    for candidate in DEFAULT_CANDIDATES {
        if Path::new(candidate).exists() {
            return candidate.to_string();
        }
    }
    // Let the dynamic linker search its standard paths.
    "libodbc.2.dylib".to_string()
}

#[cfg(not(any(windows, target_os = "macos")))]
fn default_library_path() -> String {
    "libodbc.so.2".to_string()
}

unsafe fn symbol<T: Copy>(library: &Library, path: &str, name: &str) -> Result<T, Error> {
    let mut raw = Vec::with_capacity(name.len() + 1);
    raw.extend_from_slice(name.as_bytes());
    raw.push(0);
    match library.get::<T>(&raw) {
        Ok(sym) => Ok(*sym),
        Err(source) => Err(Error::FailedToLoad {
            path: path.to_string(),
            reason: format!("missing symbol {name}: {source}"),
        }),
    }
}

/// Resolves a text-carrying entry point, using the ANSI name on Windows.
unsafe fn text_symbol<T: Copy>(library: &Library, path: &str, base: &str) -> Result<T, Error> {
    let name = format!("{base}{ANSI_SUFFIX}");
    symbol(library, path, &name)
}

impl DriverManager {
    fn load() -> Result<Self, Error> {
        let path = resolve_library_path(env::var(LIBRARY_PATH_ENV).ok());
        debug!("loading ODBC driver manager from {path}");
        let library = unsafe { Library::new(&path) }.map_err(|source| Error::FailedToLoad {
            path: path.clone(),
            reason: source.to_string(),
        })?;
        unsafe {
            Ok(DriverManager {
                alloc_handle: symbol(&library, &path, "SQLAllocHandle")?,
                free_handle: symbol(&library, &path, "SQLFreeHandle")?,
                set_env_attr: symbol(&library, &path, "SQLSetEnvAttr")?,
                get_env_attr: symbol(&library, &path, "SQLGetEnvAttr")?,
                driver_connect: text_symbol(&library, &path, "SQLDriverConnect")?,
                disconnect: symbol(&library, &path, "SQLDisconnect")?,
                set_connect_attr: symbol(&library, &path, "SQLSetConnectAttr")?,
                get_connect_attr: symbol(&library, &path, "SQLGetConnectAttr")?,
                get_info: text_symbol(&library, &path, "SQLGetInfo")?,
                exec_direct: text_symbol(&library, &path, "SQLExecDirect")?,
                prepare: text_symbol(&library, &path, "SQLPrepare")?,
                execute: symbol(&library, &path, "SQLExecute")?,
                num_result_cols: symbol(&library, &path, "SQLNumResultCols")?,
                describe_col: text_symbol(&library, &path, "SQLDescribeCol")?,
                col_attribute: text_symbol(&library, &path, "SQLColAttribute")?,
                bind_col: symbol(&library, &path, "SQLBindCol")?,
                bind_parameter: symbol(&library, &path, "SQLBindParameter")?,
                fetch: symbol(&library, &path, "SQLFetch")?,
                fetch_scroll: symbol(&library, &path, "SQLFetchScroll")?,
                get_data: symbol(&library, &path, "SQLGetData")?,
                row_count: symbol(&library, &path, "SQLRowCount")?,
                num_params: symbol(&library, &path, "SQLNumParams")?,
                describe_param: symbol(&library, &path, "SQLDescribeParam")?,
                get_diag_rec: text_symbol(&library, &path, "SQLGetDiagRec")?,
                get_diag_field: symbol(&library, &path, "SQLGetDiagField")?,
                end_tran: symbol(&library, &path, "SQLEndTran")?,
                close_cursor: symbol(&library, &path, "SQLCloseCursor")?,
                cancel: symbol(&library, &path, "SQLCancel")?,
                free_stmt: symbol(&library, &path, "SQLFreeStmt")?,
                more_results: symbol(&library, &path, "SQLMoreResults")?,
                set_stmt_attr: symbol(&library, &path, "SQLSetStmtAttr")?,
                get_stmt_attr: symbol(&library, &path, "SQLGetStmtAttr")?,
                tables: text_symbol(&library, &path, "SQLTables")?,
                columns: text_symbol(&library, &path, "SQLColumns")?,
                _library: library,
            })
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn explicit_path_wins_over_defaults() {
        assert_eq!(
            "/opt/custom/libodbc.so",
            resolve_library_path(Some("/opt/custom/libodbc.so".to_string()))
        );
    }

    #[test]
    fn empty_override_falls_back_to_default() {
        let path = resolve_library_path(Some(String::new()));
        assert_eq!(path, resolve_library_path(None));
        assert!(!path.is_empty());
    }

    #[test]
    fn default_path_names_the_driver_manager() {
        let path = resolve_library_path(None);
        assert!(path.contains("odbc"));
    }
}
