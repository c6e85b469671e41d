//! Declarations matching the ODBC C ABI.
//!
//! The crate resolves the driver manager at runtime, so it cannot rely on a
//! `#[link]`-based sys crate. The subset of the ODBC headers the client
//! actually touches is declared here instead. Symbols deprecated since
//! ODBC 3 are left out.

use num_derive::FromPrimitive;
use std::os::raw::c_void;

/// Opaque ODBC handle. Environment, connection and statement handles are all
/// passed around as this type; the kind is communicated separately via
/// [`HandleType`].
pub type Handle = *mut c_void;

pub type SmallInt = i16;
pub type USmallInt = u16;
pub type Integer = i32;
pub type UInteger = u32;
pub type Len = isize;
pub type ULen = usize;
pub type Char = u8;
pub type WChar = u16;
pub type Pointer = *mut c_void;

/// Raw return code of every ODBC entry point.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlReturn(pub SmallInt);

impl SqlReturn {
    pub const SUCCESS: SqlReturn = SqlReturn(0);
    pub const SUCCESS_WITH_INFO: SqlReturn = SqlReturn(1);
    pub const STILL_EXECUTING: SqlReturn = SqlReturn(2);
    pub const NEED_DATA: SqlReturn = SqlReturn(99);
    pub const NO_DATA: SqlReturn = SqlReturn(100);
    pub const ERROR: SqlReturn = SqlReturn(-1);
    pub const INVALID_HANDLE: SqlReturn = SqlReturn(-2);
}

#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleType {
    Env = 1,
    Dbc = 2,
    Stmt = 3,
}

/// SQL data type tags as reported by `SQLDescribeCol` and passed to
/// `SQLBindParameter`.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum SqlDataType {
    UnknownType = 0,
    Char = 1,
    Numeric = 2,
    Decimal = 3,
    Integer = 4,
    SmallInt = 5,
    Float = 6,
    Real = 7,
    Double = 8,
    DateTime = 9,
    Varchar = 12,
    TypeDate = 91,
    TypeTime = 92,
    TypeTimestamp = 93,
    LongVarchar = -1,
    Binary = -2,
    VarBinary = -3,
    LongVarBinary = -4,
    BigInt = -5,
    TinyInt = -6,
    Bit = -7,
    WChar = -8,
    WVarchar = -9,
    WLongVarchar = -10,
    Guid = -11,
    IntervalYear = 101,
    IntervalMonth = 102,
    IntervalDay = 103,
    IntervalHour = 104,
    IntervalMinute = 105,
    IntervalSecond = 106,
    IntervalYearToMonth = 107,
    IntervalDayToHour = 108,
    IntervalDayToMinute = 109,
    IntervalDayToSecond = 110,
    IntervalHourToMinute = 111,
    IntervalHourToSecond = 112,
    IntervalMinuteToSecond = 113,
}

/// C data type tags governing the memory layout of bound buffers.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CDataType {
    Char = 1,
    Float = 7,
    Double = 8,
    TypeDate = 91,
    TypeTime = 92,
    TypeTimestamp = 93,
    IntervalYearToMonth = 107,
    IntervalDayToSecond = 110,
    Binary = -2,
    Bit = -7,
    WChar = -8,
    Guid = -11,
    SShort = -15,
    SLong = -16,
    UShort = -17,
    ULong = -18,
    SBigInt = -25,
    STinyInt = -26,
    UBigInt = -27,
    UTinyInt = -28,
}

/// Direction of a bound parameter as understood by `SQLBindParameter`.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Input = 1,
    InputOutput = 2,
    Output = 4,
}

/// `SQLFreeStmt` options.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeStmtOption {
    Close = 0,
    Unbind = 2,
    ResetParams = 3,
}

/// `SQLEndTran` completion types.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionType {
    Commit = 0,
    Rollback = 1,
}

// Environment attributes.
pub const SQL_ATTR_ODBC_VERSION: Integer = 200;
pub const SQL_OV_ODBC3: ULen = 3;

// Connection attributes.
pub const SQL_ATTR_ACCESS_MODE: Integer = 101;
pub const SQL_ATTR_AUTOCOMMIT: Integer = 102;
pub const SQL_ATTR_LOGIN_TIMEOUT: Integer = 103;
pub const SQL_ATTR_TXN_ISOLATION: Integer = 108;

pub const SQL_AUTOCOMMIT_OFF: ULen = 0;
pub const SQL_AUTOCOMMIT_ON: ULen = 1;
pub const SQL_MODE_READ_WRITE: ULen = 0;
pub const SQL_MODE_READ_ONLY: ULen = 1;

// Transaction isolation bit masks.
pub const SQL_TXN_READ_UNCOMMITTED: ULen = 1;
pub const SQL_TXN_READ_COMMITTED: ULen = 2;
pub const SQL_TXN_REPEATABLE_READ: ULen = 4;
pub const SQL_TXN_SERIALIZABLE: ULen = 8;

// Statement attributes.
pub const SQL_ATTR_QUERY_TIMEOUT: Integer = 0;
pub const SQL_ATTR_CURSOR_TYPE: Integer = 6;
pub const SQL_ATTR_CURSOR_SCROLLABLE: Integer = -1;
pub const SQL_ATTR_PARAM_BIND_TYPE: Integer = 18;
pub const SQL_ATTR_PARAM_STATUS_PTR: Integer = 20;
pub const SQL_ATTR_PARAMS_PROCESSED_PTR: Integer = 21;
pub const SQL_ATTR_PARAMSET_SIZE: Integer = 22;

pub const SQL_CURSOR_FORWARD_ONLY: ULen = 0;
pub const SQL_CURSOR_KEYSET_DRIVEN: ULen = 1;
pub const SQL_CURSOR_DYNAMIC: ULen = 2;
pub const SQL_CURSOR_STATIC: ULen = 3;
pub const SQL_SCROLLABLE: ULen = 1;

pub const SQL_PARAM_BIND_BY_COLUMN: ULen = 0;

// Per-row status values reported through the parameter status array.
pub const SQL_PARAM_SUCCESS: USmallInt = 0;
pub const SQL_PARAM_SUCCESS_WITH_INFO: USmallInt = 1;
pub const SQL_PARAM_ERROR: USmallInt = 5;
pub const SQL_PARAM_UNUSED: USmallInt = 7;

// Fetch orientations for SQLFetchScroll.
pub const SQL_FETCH_NEXT: SmallInt = 1;
pub const SQL_FETCH_FIRST: SmallInt = 2;
pub const SQL_FETCH_LAST: SmallInt = 3;
pub const SQL_FETCH_PRIOR: SmallInt = 4;
pub const SQL_FETCH_ABSOLUTE: SmallInt = 5;
pub const SQL_FETCH_RELATIVE: SmallInt = 6;

// String length / indicator sentinels.
pub const SQL_NTS: Integer = -3;
pub const SQL_NULL_DATA: Len = -1;

// SQLDriverConnect completion.
pub const SQL_DRIVER_NOPROMPT: USmallInt = 0;

// SQLGetInfo information types.
pub const SQL_DBMS_NAME: USmallInt = 17;

// SQLDescribeCol nullability.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum SqlNullability {
    NoNulls = 0,
    Nullable = 1,
    Unknown = 2,
}

// Interval type tags used in the `interval_type` field of the interval
// structures (SQLINTERVAL in the C headers).
pub const SQL_IS_YEAR_TO_MONTH: Integer = 7;
pub const SQL_IS_DAY_TO_SECOND: Integer = 10;

/// `SQL_DATE_STRUCT`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SqlDate {
    pub year: SmallInt,
    pub month: USmallInt,
    pub day: USmallInt,
}

/// `SQL_TIME_STRUCT`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SqlTime {
    pub hour: USmallInt,
    pub minute: USmallInt,
    pub second: USmallInt,
}

/// `SQL_TIMESTAMP_STRUCT`. `fraction` counts billionths of a second.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SqlTimestamp {
    pub year: SmallInt,
    pub month: USmallInt,
    pub day: USmallInt,
    pub hour: USmallInt,
    pub minute: USmallInt,
    pub second: USmallInt,
    pub fraction: UInteger,
}

/// `SQLGUID`. `data1` through `data3` are stored little-endian, `data4` is a
/// plain byte sequence.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SqlGuid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

/// Year-to-month view of `SQL_INTERVAL_STRUCT`. Field offsets match the C
/// union layout: the payload starts at byte 8.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SqlIntervalYearMonth {
    pub interval_type: Integer,
    pub interval_sign: SmallInt,
    pub year: UInteger,
    pub month: UInteger,
}

/// Day-to-second view of `SQL_INTERVAL_STRUCT`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SqlIntervalDaySecond {
    pub interval_type: Integer,
    pub interval_sign: SmallInt,
    pub day: UInteger,
    pub hour: UInteger,
    pub minute: UInteger,
    pub second: UInteger,
    pub fraction: UInteger,
}

#[cfg(test)]
mod test {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn timestamp_struct_matches_c_layout() {
        assert_eq!(16, size_of::<SqlTimestamp>());
        assert_eq!(12, offset_of!(SqlTimestamp, fraction));
    }

    #[test]
    fn interval_payload_starts_at_union_offset() {
        assert_eq!(8, offset_of!(SqlIntervalYearMonth, year));
        assert_eq!(8, offset_of!(SqlIntervalDaySecond, day));
    }

    #[test]
    fn guid_struct_is_sixteen_bytes() {
        assert_eq!(16, size_of::<SqlGuid>());
    }
}
