//! Iteration over result sets and per-column value retrieval.

use crate::connection::Connection;
use crate::convert::{decode_utf16, naive_from_sql_timestamp};
use crate::defs::{
    CDataType, Handle, HandleType, Len, Pointer, SqlDataType, SqlDate, SqlGuid, SqlNullability,
    SqlTime, SqlTimestamp, SQL_FETCH_ABSOLUTE, SQL_FETCH_FIRST, SQL_FETCH_LAST, SQL_FETCH_NEXT,
    SQL_FETCH_PRIOR, SQL_FETCH_RELATIVE, SQL_NULL_DATA,
};
use crate::error::Error;
use crate::loader::DriverManager;
use crate::sql_result::SqlResult;
use crate::statement::Statement;
use crate::value::{Guid, Timestamp, Value};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use num_traits::FromPrimitive;
use std::mem::size_of;

// Caps on the initial buffer for variable-length retrieval. Larger values
// arrive through the chunked truncation loop.
const MAX_NARROW_BUFFER: usize = 65536;
const MAX_WIDE_BUFFER: usize = 32768;
const MIN_BUFFER: usize = 256;

/// Column nullability as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nullability {
    NoNulls,
    Nullable,
    Unknown,
}

/// The native type a column's values decode to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanType {
    Bool,
    Int64,
    Float32,
    Float64,
    /// Includes NUMERIC/DECIMAL columns, which stay textual to preserve
    /// their precision.
    Text,
    Bytes,
    Timestamp,
    Opaque,
}

/// Fetch orientation for scrollable cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOrientation {
    Next,
    First,
    Last,
    Prior,
    Absolute,
    Relative,
}

impl FetchOrientation {
    fn to_odbc(self) -> i16 {
        match self {
            FetchOrientation::Next => SQL_FETCH_NEXT,
            FetchOrientation::First => SQL_FETCH_FIRST,
            FetchOrientation::Last => SQL_FETCH_LAST,
            FetchOrientation::Prior => SQL_FETCH_PRIOR,
            FetchOrientation::Absolute => SQL_FETCH_ABSOLUTE,
            FetchOrientation::Relative => SQL_FETCH_RELATIVE,
        }
    }
}

/// Description of one result column.
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    data_type: SqlDataType,
    raw_data_type: i16,
    column_size: u64,
    decimal_digits: i16,
    nullability: Nullability,
}

impl Column {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw SQL type tag the driver reported.
    pub fn sql_type_code(&self) -> i16 {
        self.raw_data_type
    }

    /// The native type this column decodes to.
    pub fn scan_type(&self) -> ScanType {
        match self.data_type {
            SqlDataType::Bit => ScanType::Bool,
            SqlDataType::TinyInt
            | SqlDataType::SmallInt
            | SqlDataType::Integer
            | SqlDataType::BigInt => ScanType::Int64,
            SqlDataType::Real => ScanType::Float32,
            SqlDataType::Float | SqlDataType::Double => ScanType::Float64,
            SqlDataType::Numeric
            | SqlDataType::Decimal
            | SqlDataType::Char
            | SqlDataType::Varchar
            | SqlDataType::LongVarchar
            | SqlDataType::WChar
            | SqlDataType::WVarchar
            | SqlDataType::WLongVarchar => ScanType::Text,
            SqlDataType::Binary | SqlDataType::VarBinary | SqlDataType::LongVarBinary => {
                ScanType::Bytes
            }
            SqlDataType::TypeDate
            | SqlDataType::TypeTime
            | SqlDataType::TypeTimestamp
            | SqlDataType::DateTime => ScanType::Timestamp,
            _ => ScanType::Opaque,
        }
    }

    /// Conventional name of the database type.
    pub fn type_name(&self) -> &'static str {
        match self.data_type {
            SqlDataType::Char => "CHAR",
            SqlDataType::Varchar => "VARCHAR",
            SqlDataType::LongVarchar => "TEXT",
            SqlDataType::WChar => "NCHAR",
            SqlDataType::WVarchar => "NVARCHAR",
            SqlDataType::WLongVarchar => "NTEXT",
            SqlDataType::Decimal => "DECIMAL",
            SqlDataType::Numeric => "NUMERIC",
            SqlDataType::SmallInt => "SMALLINT",
            SqlDataType::Integer => "INTEGER",
            SqlDataType::Real => "REAL",
            SqlDataType::Float => "FLOAT",
            SqlDataType::Double => "DOUBLE",
            SqlDataType::Bit => "BIT",
            SqlDataType::TinyInt => "TINYINT",
            SqlDataType::BigInt => "BIGINT",
            SqlDataType::Binary => "BINARY",
            SqlDataType::VarBinary => "VARBINARY",
            SqlDataType::LongVarBinary => "BLOB",
            SqlDataType::TypeDate => "DATE",
            SqlDataType::TypeTime => "TIME",
            SqlDataType::TypeTimestamp | SqlDataType::DateTime => "TIMESTAMP",
            SqlDataType::Guid => "GUID",
            SqlDataType::IntervalYear => "INTERVAL YEAR",
            SqlDataType::IntervalMonth => "INTERVAL MONTH",
            SqlDataType::IntervalDay => "INTERVAL DAY",
            SqlDataType::IntervalHour => "INTERVAL HOUR",
            SqlDataType::IntervalMinute => "INTERVAL MINUTE",
            SqlDataType::IntervalSecond => "INTERVAL SECOND",
            SqlDataType::IntervalYearToMonth => "INTERVAL YEAR TO MONTH",
            SqlDataType::IntervalDayToHour => "INTERVAL DAY TO HOUR",
            SqlDataType::IntervalDayToMinute => "INTERVAL DAY TO MINUTE",
            SqlDataType::IntervalDayToSecond => "INTERVAL DAY TO SECOND",
            SqlDataType::IntervalHourToMinute => "INTERVAL HOUR TO MINUTE",
            SqlDataType::IntervalHourToSecond => "INTERVAL HOUR TO SECOND",
            SqlDataType::IntervalMinuteToSecond => "INTERVAL MINUTE TO SECOND",
            _ => "UNKNOWN",
        }
    }

    /// Column length, reported for variable-length types only.
    pub fn length(&self) -> Option<u64> {
        match self.data_type {
            SqlDataType::Char
            | SqlDataType::Varchar
            | SqlDataType::LongVarchar
            | SqlDataType::WChar
            | SqlDataType::WVarchar
            | SqlDataType::WLongVarchar
            | SqlDataType::Binary
            | SqlDataType::VarBinary
            | SqlDataType::LongVarBinary => Some(self.column_size),
            _ => None,
        }
    }

    /// Whether the column admits NULL; `None` when the driver does not know.
    pub fn nullable(&self) -> Option<bool> {
        match self.nullability {
            Nullability::NoNulls => Some(false),
            Nullability::Nullable => Some(true),
            Nullability::Unknown => None,
        }
    }

    pub fn nullability(&self) -> Nullability {
        self.nullability
    }

    /// Precision and scale, reported for NUMERIC/DECIMAL only.
    pub fn precision_scale(&self) -> Option<(u64, i16)> {
        match self.data_type {
            SqlDataType::Numeric | SqlDataType::Decimal => {
                Some((self.column_size, self.decimal_digits))
            }
            _ => None,
        }
    }
}

pub(crate) enum StmtRef<'s> {
    Borrowed(&'s Statement<'s>),
    Owned(Statement<'s>),
}

/// Iterator over the rows of an executed statement.
///
/// Created from [`Statement::query`] (borrowing the statement) or from
/// [`Connection::query`] (owning a throwaway statement which is freed on
/// close).
pub struct Rows<'s> {
    stmt: StmtRef<'s>,
    columns: Vec<Column>,
    closed: bool,
}

impl<'s> Rows<'s> {
    pub(crate) fn new(stmt: StmtRef<'s>) -> Result<Self, Error> {
        let columns = {
            let statement = match &stmt {
                StmtRef::Borrowed(s) => *s,
                StmtRef::Owned(s) => s,
            };
            describe_result_columns(statement)?
        };
        Ok(Rows {
            stmt,
            columns,
            closed: false,
        })
    }

    fn statement(&self) -> &Statement<'s> {
        match &self.stmt {
            StmtRef::Borrowed(s) => s,
            StmtRef::Owned(s) => s,
        }
    }

    /// Metadata of the current result set's columns. Empty for statements
    /// which produced no result set.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Fetches the next row. `Ok(None)` signals the end of the result set.
    pub fn next_row(&mut self) -> Result<Option<Vec<Value>>, Error> {
        self.fetch_row(|dm, handle| dm.fetch(handle))
    }

    /// Fetches a row from a scrollable cursor. The statement must have been
    /// prepared with a non-forward-only cursor type.
    pub fn scroll(
        &mut self,
        orientation: FetchOrientation,
        offset: i64,
    ) -> Result<Option<Vec<Value>>, Error> {
        self.fetch_row(|dm, handle| dm.fetch_scroll(handle, orientation.to_odbc(), offset as Len))
    }

    fn fetch_row(
        &mut self,
        fetch: impl Fn(&'static DriverManager, Handle) -> SqlResult<()>,
    ) -> Result<Option<Vec<Value>>, Error> {
        if self.closed || self.columns.is_empty() {
            return Ok(None);
        }
        let statement = self.statement();
        let conn = statement.connection();
        let dm = conn.dm();
        let inner = statement.lock_inner();
        if inner.closed {
            return Err(Error::BadConnection);
        }
        let handle = inner.handle;

        match fetch(dm, handle) {
            SqlResult::NoData => return Ok(None),
            other => other.into_result(HandleType::Stmt, handle)?,
        }

        let mut row = Vec::with_capacity(self.columns.len());
        for (idx, column) in self.columns.iter().enumerate() {
            let value = get_column_value(dm, conn, handle, (idx + 1) as u16, column)?;
            row.push(value);
        }
        Ok(Some(row))
    }

    /// Advances to the next result set of a multi-result statement,
    /// replacing the column metadata in place. `Ok(false)` means no further
    /// result set exists.
    pub fn next_result_set(&mut self) -> Result<bool, Error> {
        if self.closed {
            return Ok(false);
        }
        let statement = self.statement();
        let handle = {
            let inner = statement.lock_inner();
            if inner.closed {
                return Err(Error::BadConnection);
            }
            inner.handle
        };
        match statement.connection().dm().more_results(handle) {
            SqlResult::NoData => Ok(false),
            other => {
                other.into_result(HandleType::Stmt, handle)?;
                self.columns = describe_result_columns(statement)?;
                Ok(true)
            }
        }
    }

    /// Closes the cursor. For iterators created from a direct query this
    /// also frees the underlying statement. Idempotent.
    pub fn close(&mut self) -> Result<(), Error> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        {
            let statement = self.statement();
            let inner = statement.lock_inner();
            if !inner.closed {
                // A cursor may legitimately already be consumed; the driver
                // reporting so is not an error worth surfacing on close.
                let _ = statement.connection().dm().close_cursor(inner.handle);
            }
        }
        if let StmtRef::Owned(statement) = &self.stmt {
            statement.close()?;
        }
        Ok(())
    }
}

impl Drop for Rows<'_> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl Iterator for Rows<'_> {
    type Item = Result<Vec<Value>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

/// Collects name, type, size, decimal digits and nullability for every
/// column of the statement's current result set.
pub(crate) fn describe_result_columns(statement: &Statement<'_>) -> Result<Vec<Column>, Error> {
    let dm = statement.connection().dm();
    let inner = statement.lock_inner();
    if inner.closed {
        return Err(Error::BadConnection);
    }
    let handle = inner.handle;

    let count = dm
        .num_result_cols(handle)
        .into_result(HandleType::Stmt, handle)?;
    if count <= 0 {
        return Ok(Vec::new());
    }

    let mut columns = Vec::with_capacity(count as usize);
    for number in 1..=count as u16 {
        let (name, raw_type, column_size, decimal_digits, nullable) = dm
            .describe_col(handle, number)
            .into_result(HandleType::Stmt, handle)?;
        columns.push(Column {
            name,
            data_type: SqlDataType::from_i16(raw_type).unwrap_or(SqlDataType::UnknownType),
            raw_data_type: raw_type,
            column_size: column_size as u64,
            decimal_digits,
            nullability: match SqlNullability::from_i16(nullable) {
                Some(SqlNullability::NoNulls) => Nullability::NoNulls,
                Some(SqlNullability::Nullable) => Nullability::Nullable,
                _ => Nullability::Unknown,
            },
        });
    }
    Ok(columns)
}

/// Retrieves one column of the current row, dispatching on the column's SQL
/// type.
fn get_column_value(
    dm: &'static DriverManager,
    conn: &Connection,
    handle: Handle,
    number: u16,
    column: &Column,
) -> Result<Value, Error> {
    let value = match column.data_type {
        SqlDataType::Bit => unsafe { get_scalar::<u8>(dm, handle, number, CDataType::Bit)? }
            .map(|v| Value::Bool(v != 0)),
        SqlDataType::TinyInt => unsafe {
            get_scalar::<i8>(dm, handle, number, CDataType::STinyInt)?
        }
        .map(|v| Value::BigInt(v as i64)),
        SqlDataType::SmallInt => unsafe {
            get_scalar::<i16>(dm, handle, number, CDataType::SShort)?
        }
        .map(|v| Value::BigInt(v as i64)),
        SqlDataType::Integer => unsafe {
            get_scalar::<i32>(dm, handle, number, CDataType::SLong)?
        }
        .map(|v| Value::BigInt(v as i64)),
        SqlDataType::BigInt => unsafe {
            get_scalar::<i64>(dm, handle, number, CDataType::SBigInt)?
        }
        .map(Value::BigInt),
        SqlDataType::Real => unsafe { get_scalar::<f32>(dm, handle, number, CDataType::Float)? }
            .map(Value::Real),
        SqlDataType::Float | SqlDataType::Double => unsafe {
            get_scalar::<f64>(dm, handle, number, CDataType::Double)?
        }
        .map(Value::Double),
        SqlDataType::Numeric | SqlDataType::Decimal => {
            get_text(dm, handle, number, column.column_size)?.map(Value::Text)
        }
        SqlDataType::WChar | SqlDataType::WVarchar | SqlDataType::WLongVarchar => {
            get_wide_text(dm, handle, number, column.column_size)?.map(Value::Text)
        }
        SqlDataType::Binary | SqlDataType::VarBinary | SqlDataType::LongVarBinary => {
            get_bytes(dm, handle, number, column.column_size)?.map(Value::Bytes)
        }
        SqlDataType::TypeDate => unsafe {
            get_scalar::<SqlDate>(dm, handle, number, CDataType::TypeDate)?
        }
        .map(|d| {
            let date = NaiveDate::from_ymd_opt(d.year as i32, d.month as u32, d.day as u32)
                .unwrap_or_default();
            timestamp_value(conn, date.and_time(NaiveTime::default()))
        }),
        SqlDataType::TypeTime => unsafe {
            get_scalar::<SqlTime>(dm, handle, number, CDataType::TypeTime)?
        }
        .map(|t| {
            // Time-only columns use a placeholder date.
            let date = NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or_default();
            let time =
                NaiveTime::from_hms_opt(t.hour as u32, t.minute as u32, t.second as u32)
                    .unwrap_or_default();
            timestamp_value(conn, date.and_time(time))
        }),
        SqlDataType::TypeTimestamp | SqlDataType::DateTime => unsafe {
            get_scalar::<SqlTimestamp>(dm, handle, number, CDataType::TypeTimestamp)?
        }
        .map(|ts| timestamp_value(conn, naive_from_sql_timestamp(&ts))),
        SqlDataType::Guid => unsafe {
            get_scalar::<SqlGuid>(dm, handle, number, CDataType::Guid)?
        }
        .map(|g| {
            let mut bytes = [0u8; 16];
            bytes[..4].copy_from_slice(&g.data1.to_le_bytes());
            bytes[4..6].copy_from_slice(&g.data2.to_le_bytes());
            bytes[6..8].copy_from_slice(&g.data3.to_le_bytes());
            bytes[8..].copy_from_slice(&g.data4);
            Value::Text(Guid(bytes).to_string())
        }),
        _ => get_text(dm, handle, number, column.column_size)?.map(Value::Text),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Adjusts a driver wall-clock timestamp (UTC by contract) into the
/// connection's configured timezone.
fn timestamp_value(conn: &Connection, naive: NaiveDateTime) -> Value {
    let offset = conn.options().timezone.local_minus_utc() as i64;
    let adjusted = naive
        .checked_add_signed(Duration::seconds(offset))
        .unwrap_or(naive);
    Value::Timestamp(Timestamp::new(adjusted, conn.options().timestamp_precision))
}

/// Reads a fixed-size value through the driver-visible buffer exactly once.
///
/// # Safety
///
/// `T` must match the memory layout the driver writes for `c_type`.
unsafe fn get_scalar<T: Default>(
    dm: &DriverManager,
    handle: Handle,
    number: u16,
    c_type: CDataType,
) -> Result<Option<T>, Error> {
    let mut value = T::default();
    let mut indicator: Len = 0;
    let result = dm.get_data(
        handle,
        number,
        c_type,
        &mut value as *mut T as Pointer,
        size_of::<T>() as Len,
        &mut indicator,
    );
    match result {
        SqlResult::NoData => return Ok(None),
        other => other.into_result(HandleType::Stmt, handle)?,
    }
    if indicator == SQL_NULL_DATA {
        Ok(None)
    } else {
        Ok(Some(value))
    }
}

/// Chunked retrieval of a narrow character column. The driver advances its
/// own cursor across repeated `SQLGetData` calls on the same column; the
/// loop only accumulates.
fn get_text(
    dm: &DriverManager,
    handle: Handle,
    number: u16,
    column_size: u64,
) -> Result<Option<String>, Error> {
    let buf_size = initial_buffer_size(column_size as usize + 1, MAX_NARROW_BUFFER);
    let mut buf = vec![0u8; buf_size];
    let mut indicator: Len = 0;

    let first = unsafe {
        dm.get_data(
            handle,
            number,
            CDataType::Char,
            buf.as_mut_ptr() as Pointer,
            buf.len() as Len,
            &mut indicator,
        )
    };
    match first {
        SqlResult::NoData => return Ok(None),
        other if other.is_err() => {
            other.into_result(HandleType::Stmt, handle)?;
        }
        _ => {}
    }
    if indicator == SQL_NULL_DATA {
        return Ok(None);
    }

    // A truncated read: the indicator reports the full remaining length.
    if matches!(first, SqlResult::SuccessWithInfo(())) && indicator > (buf.len() - 1) as Len {
        let total = indicator as usize;
        let mut result = Vec::with_capacity(total);
        result.extend_from_slice(&buf[..buf.len() - 1]);
        let mut remaining = total - (buf.len() - 1);
        while remaining > 0 {
            let chunk = (remaining + 1).min(buf.len());
            let ret = unsafe {
                dm.get_data(
                    handle,
                    number,
                    CDataType::Char,
                    buf.as_mut_ptr() as Pointer,
                    chunk as Len,
                    &mut indicator,
                )
            };
            if ret.is_err() || ret == SqlResult::NoData || indicator == SQL_NULL_DATA {
                break;
            }
            let mut copy_len = indicator.max(0) as usize;
            if copy_len > chunk - 1 {
                copy_len = chunk - 1;
            }
            result.extend_from_slice(&buf[..copy_len]);
            remaining = remaining.saturating_sub(copy_len);
        }
        return Ok(Some(String::from_utf8_lossy(&result).into_owned()));
    }

    if indicator >= 0 && (indicator as usize) < buf.len() {
        return Ok(Some(
            String::from_utf8_lossy(&buf[..indicator as usize]).into_owned(),
        ));
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Ok(Some(String::from_utf8_lossy(&buf[..end]).into_owned()))
}

/// Chunked retrieval of a wide character column, decoded to UTF-8.
fn get_wide_text(
    dm: &DriverManager,
    handle: Handle,
    number: u16,
    column_size: u64,
) -> Result<Option<String>, Error> {
    let buf_units = initial_buffer_size(column_size as usize + 1, MAX_WIDE_BUFFER);
    let mut buf = vec![0u16; buf_units];
    let mut indicator: Len = 0;

    let first = unsafe {
        dm.get_data(
            handle,
            number,
            CDataType::WChar,
            buf.as_mut_ptr() as Pointer,
            (buf.len() * 2) as Len,
            &mut indicator,
        )
    };
    match first {
        SqlResult::NoData => return Ok(None),
        other if other.is_err() => {
            other.into_result(HandleType::Stmt, handle)?;
        }
        _ => {}
    }
    if indicator == SQL_NULL_DATA {
        return Ok(None);
    }

    if matches!(first, SqlResult::SuccessWithInfo(())) && indicator > ((buf.len() - 1) * 2) as Len
    {
        let total_units = indicator as usize / 2;
        let mut result: Vec<u16> = Vec::with_capacity(total_units);
        let fetched = buf.len() - 1;
        result.extend_from_slice(&buf[..fetched]);
        let mut remaining = total_units - fetched;
        while remaining > 0 {
            let chunk_units = (remaining + 1).min(buf.len());
            let ret = unsafe {
                dm.get_data(
                    handle,
                    number,
                    CDataType::WChar,
                    buf.as_mut_ptr() as Pointer,
                    (chunk_units * 2) as Len,
                    &mut indicator,
                )
            };
            if ret.is_err() || ret == SqlResult::NoData || indicator == SQL_NULL_DATA {
                break;
            }
            let mut copy_units = indicator.max(0) as usize / 2;
            if copy_units > chunk_units - 1 {
                copy_units = chunk_units - 1;
            }
            result.extend_from_slice(&buf[..copy_units]);
            remaining = remaining.saturating_sub(copy_units);
        }
        return Ok(Some(decode_utf16(&result)));
    }

    if indicator >= 0 {
        let units = (indicator as usize / 2).min(buf.len() - 1);
        return Ok(Some(decode_utf16(&buf[..units])));
    }
    let end = buf.iter().position(|&u| u == 0).unwrap_or(buf.len());
    Ok(Some(decode_utf16(&buf[..end])))
}

/// Chunked retrieval of a binary column. Binary reads carry no terminator,
/// so the whole buffer participates in every chunk.
fn get_bytes(
    dm: &DriverManager,
    handle: Handle,
    number: u16,
    column_size: u64,
) -> Result<Option<Vec<u8>>, Error> {
    let buf_size = initial_buffer_size(column_size as usize, MAX_NARROW_BUFFER);
    let mut buf = vec![0u8; buf_size];
    let mut indicator: Len = 0;

    let first = unsafe {
        dm.get_data(
            handle,
            number,
            CDataType::Binary,
            buf.as_mut_ptr() as Pointer,
            buf.len() as Len,
            &mut indicator,
        )
    };
    match first {
        SqlResult::NoData => return Ok(None),
        other if other.is_err() => {
            other.into_result(HandleType::Stmt, handle)?;
        }
        _ => {}
    }
    if indicator == SQL_NULL_DATA {
        return Ok(None);
    }

    if matches!(first, SqlResult::SuccessWithInfo(())) && indicator > buf.len() as Len {
        let total = indicator as usize;
        let mut result = Vec::with_capacity(total);
        result.extend_from_slice(&buf);
        let mut remaining = total - buf.len();
        while remaining > 0 {
            let chunk = remaining.min(buf.len());
            let ret = unsafe {
                dm.get_data(
                    handle,
                    number,
                    CDataType::Binary,
                    buf.as_mut_ptr() as Pointer,
                    chunk as Len,
                    &mut indicator,
                )
            };
            if ret.is_err() || ret == SqlResult::NoData || indicator == SQL_NULL_DATA {
                break;
            }
            let mut copy_len = indicator.max(0) as usize;
            if copy_len > chunk {
                copy_len = chunk;
            }
            result.extend_from_slice(&buf[..copy_len]);
            remaining = remaining.saturating_sub(copy_len);
        }
        return Ok(Some(result));
    }

    if indicator >= 0 && (indicator as usize) <= buf.len() {
        buf.truncate(indicator as usize);
        return Ok(Some(buf));
    }
    Ok(Some(buf))
}

fn initial_buffer_size(wanted: usize, cap: usize) -> usize {
    wanted.clamp(MIN_BUFFER, cap)
}

#[cfg(test)]
mod test {
    use super::*;

    fn column(data_type: SqlDataType, size: u64, dec: i16) -> Column {
        Column {
            name: "c".to_string(),
            data_type,
            raw_data_type: data_type as i16,
            column_size: size,
            decimal_digits: dec,
            nullability: Nullability::Nullable,
        }
    }

    #[test]
    fn scan_types_follow_the_sql_type() {
        assert_eq!(ScanType::Bool, column(SqlDataType::Bit, 1, 0).scan_type());
        for t in [
            SqlDataType::TinyInt,
            SqlDataType::SmallInt,
            SqlDataType::Integer,
            SqlDataType::BigInt,
        ] {
            assert_eq!(ScanType::Int64, column(t, 0, 0).scan_type(), "{t:?}");
        }
        assert_eq!(
            ScanType::Float32,
            column(SqlDataType::Real, 0, 0).scan_type()
        );
        assert_eq!(
            ScanType::Float64,
            column(SqlDataType::Double, 0, 0).scan_type()
        );
        assert_eq!(
            ScanType::Text,
            column(SqlDataType::Decimal, 18, 4).scan_type()
        );
        assert_eq!(
            ScanType::Bytes,
            column(SqlDataType::VarBinary, 16, 0).scan_type()
        );
        assert_eq!(
            ScanType::Timestamp,
            column(SqlDataType::TypeTimestamp, 23, 3).scan_type()
        );
        assert_eq!(ScanType::Opaque, column(SqlDataType::Guid, 36, 0).scan_type());
    }

    #[test]
    fn type_names_match_the_conventional_spelling() {
        assert_eq!("VARCHAR", column(SqlDataType::Varchar, 10, 0).type_name());
        assert_eq!("NVARCHAR", column(SqlDataType::WVarchar, 10, 0).type_name());
        assert_eq!("TEXT", column(SqlDataType::LongVarchar, 0, 0).type_name());
        assert_eq!("BLOB", column(SqlDataType::LongVarBinary, 0, 0).type_name());
        assert_eq!("TIMESTAMP", column(SqlDataType::DateTime, 0, 0).type_name());
        assert_eq!(
            "INTERVAL DAY TO SECOND",
            column(SqlDataType::IntervalDayToSecond, 0, 0).type_name()
        );
        assert_eq!("UNKNOWN", column(SqlDataType::UnknownType, 0, 0).type_name());
    }

    #[test]
    fn length_is_reported_for_variable_types_only() {
        assert_eq!(Some(42), column(SqlDataType::Varchar, 42, 0).length());
        assert_eq!(Some(16), column(SqlDataType::VarBinary, 16, 0).length());
        assert_eq!(None, column(SqlDataType::Integer, 10, 0).length());
        assert_eq!(None, column(SqlDataType::TypeTimestamp, 23, 3).length());
    }

    #[test]
    fn precision_scale_is_reported_for_decimals_only() {
        assert_eq!(
            Some((18, 4)),
            column(SqlDataType::Decimal, 18, 4).precision_scale()
        );
        assert_eq!(
            Some((10, 0)),
            column(SqlDataType::Numeric, 10, 0).precision_scale()
        );
        assert_eq!(None, column(SqlDataType::Varchar, 18, 0).precision_scale());
    }

    #[test]
    fn nullable_maps_the_three_driver_states() {
        let mut c = column(SqlDataType::Integer, 10, 0);
        c.nullability = Nullability::NoNulls;
        assert_eq!(Some(false), c.nullable());
        c.nullability = Nullability::Nullable;
        assert_eq!(Some(true), c.nullable());
        c.nullability = Nullability::Unknown;
        assert_eq!(None, c.nullable());
    }

    #[test]
    fn initial_buffers_are_clamped() {
        assert_eq!(MIN_BUFFER, initial_buffer_size(10, MAX_NARROW_BUFFER));
        assert_eq!(1000, initial_buffer_size(1000, MAX_NARROW_BUFFER));
        assert_eq!(
            MAX_NARROW_BUFFER,
            initial_buffer_size(1 << 20, MAX_NARROW_BUFFER)
        );
    }
}
