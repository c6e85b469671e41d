//! Bidirectional conversion between [`Value`] and the driver's tagged C
//! representations.
//!
//! The input direction produces an owned buffer plus the descriptor tuple
//! handed to `SQLBindParameter`. Buffers are heap-allocated individually so
//! their addresses survive growth of the owning collections; the driver
//! stores the addresses between bind and execute.

use crate::defs::{
    CDataType, Len, Pointer, SmallInt, SqlDataType, SqlDate, SqlIntervalDaySecond,
    SqlIntervalYearMonth, SqlTime, SqlTimestamp, ULen, SQL_IS_DAY_TO_SECOND,
    SQL_IS_YEAR_TO_MONTH, SQL_NULL_DATA,
};
use crate::error::Error;
use crate::value::{OutputParam, ParamDirection, Timestamp, TimestampPrecision, Value};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::mem::size_of;
use std::ptr::null_mut;

/// Default buffer sizes for variable-length output parameters.
pub(crate) const DEFAULT_TEXT_OUTPUT_SIZE: usize = 4000;
pub(crate) const DEFAULT_BINARY_OUTPUT_SIZE: usize = 8000;

/// Owned storage for one bound parameter. The address handed to the driver
/// must not move until the binding is reset, hence the boxes.
#[derive(Debug)]
pub(crate) enum ParamBuffer {
    /// No buffer at all (SQL NULL, empty byte strings).
    None,
    /// Null-terminated narrow text, raw bytes, decimal strings or GUID
    /// layouts.
    Bytes(Vec<u8>),
    /// Null-terminated UTF-16 code units.
    Wide(Vec<u16>),
    I8(Box<i8>),
    I16(Box<i16>),
    I32(Box<i32>),
    I64(Box<i64>),
    U8(Box<u8>),
    U16(Box<u16>),
    U32(Box<u32>),
    F32(Box<f32>),
    F64(Box<f64>),
    Date(Box<SqlDate>),
    Time(Box<SqlTime>),
    Timestamp(Box<SqlTimestamp>),
    IntervalYearMonth(Box<SqlIntervalYearMonth>),
    IntervalDaySecond(Box<SqlIntervalDaySecond>),
}

impl ParamBuffer {
    /// Pointer and byte length of the owned storage, in the shape
    /// `SQLBindParameter` expects.
    pub(crate) fn as_mut_ptr(&mut self) -> (Pointer, Len) {
        match self {
            ParamBuffer::None => (null_mut(), 0),
            ParamBuffer::Bytes(v) => {
                if v.is_empty() {
                    (null_mut(), 0)
                } else {
                    (v.as_mut_ptr() as Pointer, v.len() as Len)
                }
            }
            ParamBuffer::Wide(v) => (v.as_mut_ptr() as Pointer, (v.len() * 2) as Len),
            ParamBuffer::I8(v) => (&mut **v as *mut i8 as Pointer, 1),
            ParamBuffer::I16(v) => (&mut **v as *mut i16 as Pointer, 2),
            ParamBuffer::I32(v) => (&mut **v as *mut i32 as Pointer, 4),
            ParamBuffer::I64(v) => (&mut **v as *mut i64 as Pointer, 8),
            ParamBuffer::U8(v) => (&mut **v as *mut u8 as Pointer, 1),
            ParamBuffer::U16(v) => (&mut **v as *mut u16 as Pointer, 2),
            ParamBuffer::U32(v) => (&mut **v as *mut u32 as Pointer, 4),
            ParamBuffer::F32(v) => (&mut **v as *mut f32 as Pointer, 4),
            ParamBuffer::F64(v) => (&mut **v as *mut f64 as Pointer, 8),
            ParamBuffer::Date(v) => (
                &mut **v as *mut SqlDate as Pointer,
                size_of::<SqlDate>() as Len,
            ),
            ParamBuffer::Time(v) => (
                &mut **v as *mut SqlTime as Pointer,
                size_of::<SqlTime>() as Len,
            ),
            ParamBuffer::Timestamp(v) => (
                &mut **v as *mut SqlTimestamp as Pointer,
                size_of::<SqlTimestamp>() as Len,
            ),
            ParamBuffer::IntervalYearMonth(v) => (
                &mut **v as *mut SqlIntervalYearMonth as Pointer,
                size_of::<SqlIntervalYearMonth>() as Len,
            ),
            ParamBuffer::IntervalDaySecond(v) => (
                &mut **v as *mut SqlIntervalDaySecond as Pointer,
                size_of::<SqlIntervalDaySecond>() as Len,
            ),
        }
    }
}

/// One marshalled parameter: the owned buffer plus the descriptor tuple for
/// `SQLBindParameter`.
#[derive(Debug)]
pub(crate) struct BoundParam {
    pub buffer: ParamBuffer,
    pub c_type: CDataType,
    pub sql_type: SqlDataType,
    pub column_size: ULen,
    pub decimal_digits: SmallInt,
    pub indicator: Len,
}

/// Truncates nanoseconds to the given precision. Never rounds: the driver
/// must not observe a later instant than the application supplied.
pub(crate) fn truncate_fraction(nanos: u32, precision: TimestampPrecision) -> u32 {
    match precision {
        TimestampPrecision::Seconds => 0,
        TimestampPrecision::Milliseconds => (nanos / 1_000_000) * 1_000_000,
        TimestampPrecision::Microseconds => (nanos / 1_000) * 1_000,
        TimestampPrecision::Nanoseconds => nanos,
    }
}

/// Column size of a timestamp literal `YYYY-MM-DD HH:MM:SS[.fff]` for the
/// given fractional precision.
pub(crate) fn timestamp_column_size(precision: TimestampPrecision) -> ULen {
    match precision.digits() {
        0 => 19,
        digits => 20 + digits as ULen,
    }
}

/// Encodes UTF-8 text as null-terminated UTF-16. Scalars above U+FFFF become
/// surrogate pairs.
pub(crate) fn encode_utf16_z(text: &str) -> Vec<u16> {
    let mut units = Vec::with_capacity(text.len() + 1);
    for c in text.chars() {
        let cp = c as u32;
        if cp > 0xFFFF {
            let v = cp - 0x10000;
            units.push(((v >> 10) + 0xD800) as u16);
            units.push(((v & 0x3FF) + 0xDC00) as u16);
        } else {
            units.push(cp as u16);
        }
    }
    units.push(0);
    units
}

/// Number of UTF-16 code units `text` occupies, surrogate pairs included,
/// terminator excluded.
pub(crate) fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

/// Decodes driver-supplied UTF-16. Surrogate pairs combine into a single
/// scalar; an unpaired surrogate cannot be represented in a Rust string and
/// decodes to U+FFFD.
pub(crate) fn decode_utf16(units: &[u16]) -> String {
    widestring::decode_utf16_lossy(units.iter().copied()).collect()
}

pub(crate) fn sql_timestamp_from(
    datetime: NaiveDateTime,
    precision: TimestampPrecision,
) -> SqlTimestamp {
    SqlTimestamp {
        year: datetime.year() as SmallInt,
        month: datetime.month() as u16,
        day: datetime.day() as u16,
        hour: datetime.hour() as u16,
        minute: datetime.minute() as u16,
        second: datetime.second() as u16,
        fraction: truncate_fraction(datetime.nanosecond(), precision),
    }
}

pub(crate) fn naive_from_sql_timestamp(ts: &SqlTimestamp) -> NaiveDateTime {
    let date = NaiveDate::from_ymd_opt(ts.year as i32, ts.month as u32, ts.day as u32)
        .unwrap_or_default();
    let time = NaiveTime::from_hms_nano_opt(
        ts.hour as u32,
        ts.minute as u32,
        ts.second as u32,
        ts.fraction,
    )
    .unwrap_or_default();
    date.and_time(time)
}

/// Marshals a native value into an owned ODBC parameter buffer and its
/// descriptor tuple. Dispatches once on the value tag.
pub(crate) fn to_odbc(value: &Value) -> Result<BoundParam, Error> {
    let bound = match value {
        Value::Null => BoundParam {
            buffer: ParamBuffer::None,
            c_type: CDataType::Char,
            sql_type: SqlDataType::Varchar,
            column_size: 0,
            decimal_digits: 0,
            indicator: SQL_NULL_DATA,
        },
        Value::Bool(v) => BoundParam {
            buffer: ParamBuffer::U8(Box::new(u8::from(*v))),
            c_type: CDataType::Bit,
            sql_type: SqlDataType::Bit,
            column_size: 1,
            decimal_digits: 0,
            indicator: 1,
        },
        Value::TinyInt(v) => BoundParam {
            buffer: ParamBuffer::I8(Box::new(*v)),
            c_type: CDataType::STinyInt,
            sql_type: SqlDataType::TinyInt,
            column_size: 4,
            decimal_digits: 0,
            indicator: 1,
        },
        Value::SmallInt(v) => BoundParam {
            buffer: ParamBuffer::I16(Box::new(*v)),
            c_type: CDataType::SShort,
            sql_type: SqlDataType::SmallInt,
            column_size: 6,
            decimal_digits: 0,
            indicator: 2,
        },
        Value::Int(v) => BoundParam {
            buffer: ParamBuffer::I32(Box::new(*v)),
            c_type: CDataType::SLong,
            sql_type: SqlDataType::Integer,
            column_size: 11,
            decimal_digits: 0,
            indicator: 4,
        },
        Value::BigInt(v) => BoundParam {
            buffer: ParamBuffer::I64(Box::new(*v)),
            c_type: CDataType::SBigInt,
            sql_type: SqlDataType::BigInt,
            column_size: 20,
            decimal_digits: 0,
            indicator: 8,
        },
        Value::UTinyInt(v) => BoundParam {
            buffer: ParamBuffer::U8(Box::new(*v)),
            c_type: CDataType::UTinyInt,
            sql_type: SqlDataType::TinyInt,
            column_size: 3,
            decimal_digits: 0,
            indicator: 1,
        },
        Value::USmallInt(v) => BoundParam {
            buffer: ParamBuffer::U16(Box::new(*v)),
            c_type: CDataType::UShort,
            sql_type: SqlDataType::SmallInt,
            column_size: 5,
            decimal_digits: 0,
            indicator: 2,
        },
        Value::UInt(v) => BoundParam {
            buffer: ParamBuffer::U32(Box::new(*v)),
            c_type: CDataType::ULong,
            sql_type: SqlDataType::Integer,
            column_size: 10,
            decimal_digits: 0,
            indicator: 4,
        },
        Value::UBigInt(v) => {
            // A signed 64-bit binding overflows for the upper half of the
            // range, so the value travels as a decimal string.
            let text = v.to_string();
            narrow_text(&text, SqlDataType::Varchar, text.len() as ULen, 0)
        }
        Value::Real(v) => BoundParam {
            buffer: ParamBuffer::F32(Box::new(*v)),
            c_type: CDataType::Float,
            sql_type: SqlDataType::Real,
            column_size: 7,
            decimal_digits: 0,
            indicator: 4,
        },
        Value::Double(v) => BoundParam {
            buffer: ParamBuffer::F64(Box::new(*v)),
            c_type: CDataType::Double,
            sql_type: SqlDataType::Double,
            column_size: 15,
            decimal_digits: 0,
            indicator: 8,
        },
        Value::Text(v) => narrow_text(v, SqlDataType::Varchar, v.len() as ULen, 0),
        Value::WideText(v) => {
            let units = encode_utf16_z(v);
            // Terminator excluded from both reported lengths.
            let count = units.len() - 1;
            BoundParam {
                buffer: ParamBuffer::Wide(units),
                c_type: CDataType::WChar,
                sql_type: SqlDataType::WVarchar,
                column_size: count as ULen,
                decimal_digits: 0,
                indicator: (count * 2) as Len,
            }
        }
        Value::Bytes(v) => BoundParam {
            buffer: if v.is_empty() {
                ParamBuffer::None
            } else {
                ParamBuffer::Bytes(v.clone())
            },
            c_type: CDataType::Binary,
            sql_type: SqlDataType::VarBinary,
            column_size: v.len() as ULen,
            decimal_digits: 0,
            indicator: v.len() as Len,
        },
        Value::Guid(v) => BoundParam {
            buffer: ParamBuffer::Bytes(v.0.to_vec()),
            c_type: CDataType::Guid,
            sql_type: SqlDataType::Guid,
            column_size: 16,
            decimal_digits: 0,
            indicator: 16,
        },
        Value::Date(v) => BoundParam {
            buffer: ParamBuffer::Date(Box::new(SqlDate {
                year: v.year() as SmallInt,
                month: v.month() as u16,
                day: v.day() as u16,
            })),
            c_type: CDataType::TypeDate,
            sql_type: SqlDataType::TypeDate,
            column_size: 10,
            decimal_digits: 0,
            indicator: size_of::<SqlDate>() as Len,
        },
        Value::Time(v) => BoundParam {
            buffer: ParamBuffer::Time(Box::new(SqlTime {
                hour: v.hour() as u16,
                minute: v.minute() as u16,
                second: v.second() as u16,
            })),
            c_type: CDataType::TypeTime,
            sql_type: SqlDataType::TypeTime,
            column_size: 8,
            decimal_digits: 0,
            indicator: size_of::<SqlTime>() as Len,
        },
        Value::Timestamp(v) => timestamp_param(v.datetime, v.precision),
        Value::TimestampTz(v) => timestamp_param(v.datetime.naive_utc(), v.precision),
        Value::Decimal(v) => narrow_text(
            v.value(),
            SqlDataType::Decimal,
            v.precision() as ULen,
            v.scale() as SmallInt,
        ),
        Value::IntervalYearMonth(v) => BoundParam {
            buffer: ParamBuffer::IntervalYearMonth(Box::new(SqlIntervalYearMonth {
                interval_type: SQL_IS_YEAR_TO_MONTH,
                interval_sign: i16::from(v.negative),
                year: v.years,
                month: v.months,
            })),
            c_type: CDataType::IntervalYearToMonth,
            sql_type: SqlDataType::IntervalYearToMonth,
            column_size: 0,
            decimal_digits: 0,
            indicator: size_of::<SqlIntervalYearMonth>() as Len,
        },
        Value::IntervalDaySecond(v) => BoundParam {
            buffer: ParamBuffer::IntervalDaySecond(Box::new(SqlIntervalDaySecond {
                interval_type: SQL_IS_DAY_TO_SECOND,
                interval_sign: i16::from(v.negative),
                day: v.days,
                hour: v.hours,
                minute: v.minutes,
                second: v.seconds,
                fraction: v.nanoseconds,
            })),
            c_type: CDataType::IntervalDayToSecond,
            sql_type: SqlDataType::IntervalDayToSecond,
            column_size: 0,
            decimal_digits: 0,
            indicator: size_of::<SqlIntervalDaySecond>() as Len,
        },
        Value::Output(_) => {
            return Err(Error::parameter(
                "<output>",
                "output wrapper is handled during binding and cannot nest",
            ))
        }
    };
    Ok(bound)
}

fn narrow_text(
    text: &str,
    sql_type: SqlDataType,
    column_size: ULen,
    decimal_digits: SmallInt,
) -> BoundParam {
    let mut buf = Vec::with_capacity(text.len() + 1);
    buf.extend_from_slice(text.as_bytes());
    buf.push(0);
    BoundParam {
        buffer: ParamBuffer::Bytes(buf),
        c_type: CDataType::Char,
        sql_type,
        column_size,
        decimal_digits,
        indicator: text.len() as Len,
    }
}

fn timestamp_param(datetime: NaiveDateTime, precision: TimestampPrecision) -> BoundParam {
    BoundParam {
        buffer: ParamBuffer::Timestamp(Box::new(sql_timestamp_from(datetime, precision))),
        c_type: CDataType::TypeTimestamp,
        sql_type: SqlDataType::TypeTimestamp,
        column_size: timestamp_column_size(precision),
        decimal_digits: precision.digits() as SmallInt,
        indicator: size_of::<SqlTimestamp>() as Len,
    }
}

/// Allocates a driver-writable buffer for an output or input/output
/// parameter. The variant of the hint value selects the buffer type; for
/// input/output the buffer is pre-populated, for output-only it starts
/// null-indicated.
pub(crate) fn allocate_output_buffer(param: &OutputParam) -> Result<BoundParam, Error> {
    let populate = param.direction == ParamDirection::InputOutput;

    let bound = match &param.value {
        Value::Output(_) => {
            return Err(Error::parameter(
                "<output>",
                "output wrapper is handled during binding and cannot nest",
            ))
        }
        Value::Bool(v) => fixed_output(
            ParamBuffer::U8(Box::new(if populate { u8::from(*v) } else { 0 })),
            CDataType::Bit,
            SqlDataType::Bit,
            1,
            0,
            1,
            populate,
        ),
        Value::TinyInt(v) => fixed_output(
            ParamBuffer::I8(Box::new(if populate { *v } else { 0 })),
            CDataType::STinyInt,
            SqlDataType::TinyInt,
            4,
            0,
            1,
            populate,
        ),
        Value::SmallInt(v) => fixed_output(
            ParamBuffer::I16(Box::new(if populate { *v } else { 0 })),
            CDataType::SShort,
            SqlDataType::SmallInt,
            6,
            0,
            2,
            populate,
        ),
        Value::Int(v) => fixed_output(
            ParamBuffer::I32(Box::new(if populate { *v } else { 0 })),
            CDataType::SLong,
            SqlDataType::Integer,
            11,
            0,
            4,
            populate,
        ),
        Value::BigInt(v) => fixed_output(
            ParamBuffer::I64(Box::new(if populate { *v } else { 0 })),
            CDataType::SBigInt,
            SqlDataType::BigInt,
            20,
            0,
            8,
            populate,
        ),
        Value::Real(v) => fixed_output(
            ParamBuffer::F32(Box::new(if populate { *v } else { 0.0 })),
            CDataType::Float,
            SqlDataType::Real,
            7,
            0,
            4,
            populate,
        ),
        Value::Double(v) => fixed_output(
            ParamBuffer::F64(Box::new(if populate { *v } else { 0.0 })),
            CDataType::Double,
            SqlDataType::Double,
            15,
            0,
            8,
            populate,
        ),
        Value::Text(v) => {
            let size = effective_size(param.size, DEFAULT_TEXT_OUTPUT_SIZE);
            let mut buf = vec![0u8; size + 1];
            let indicator = if populate && !v.is_empty() {
                let len = v.len().min(size);
                buf[..len].copy_from_slice(&v.as_bytes()[..len]);
                len as Len
            } else {
                SQL_NULL_DATA
            };
            BoundParam {
                buffer: ParamBuffer::Bytes(buf),
                c_type: CDataType::Char,
                sql_type: SqlDataType::Varchar,
                column_size: size as ULen,
                decimal_digits: 0,
                indicator,
            }
        }
        Value::WideText(v) => {
            let size = effective_size(param.size, DEFAULT_TEXT_OUTPUT_SIZE);
            let mut buf = vec![0u16; size + 1];
            let indicator = if populate && !v.is_empty() {
                let encoded = encode_utf16_z(v);
                let len = (encoded.len() - 1).min(size);
                buf[..len].copy_from_slice(&encoded[..len]);
                (len * 2) as Len
            } else {
                SQL_NULL_DATA
            };
            BoundParam {
                buffer: ParamBuffer::Wide(buf),
                c_type: CDataType::WChar,
                sql_type: SqlDataType::WVarchar,
                column_size: size as ULen,
                decimal_digits: 0,
                indicator,
            }
        }
        Value::Bytes(v) => {
            let size = effective_size(param.size, DEFAULT_BINARY_OUTPUT_SIZE);
            let mut buf = vec![0u8; size];
            let indicator = if populate && !v.is_empty() {
                let len = v.len().min(size);
                buf[..len].copy_from_slice(&v[..len]);
                len as Len
            } else {
                SQL_NULL_DATA
            };
            BoundParam {
                buffer: ParamBuffer::Bytes(buf),
                c_type: CDataType::Binary,
                sql_type: SqlDataType::VarBinary,
                column_size: size as ULen,
                decimal_digits: 0,
                indicator,
            }
        }
        Value::Guid(v) => {
            let buf = if populate { v.0.to_vec() } else { vec![0u8; 16] };
            BoundParam {
                buffer: ParamBuffer::Bytes(buf),
                c_type: CDataType::Guid,
                sql_type: SqlDataType::Guid,
                column_size: 16,
                decimal_digits: 0,
                indicator: if populate { 16 } else { SQL_NULL_DATA },
            }
        }
        Value::Timestamp(v) => timestamp_output(
            if populate {
                sql_timestamp_from(v.datetime, v.precision)
            } else {
                SqlTimestamp::default()
            },
            v.precision,
            populate,
        ),
        Value::TimestampTz(v) => timestamp_output(
            if populate {
                sql_timestamp_from(v.datetime.naive_utc(), v.precision)
            } else {
                SqlTimestamp::default()
            },
            v.precision,
            populate,
        ),
        Value::Decimal(v) => {
            let size = effective_size(param.size, DEFAULT_TEXT_OUTPUT_SIZE);
            let mut buf = vec![0u8; size + 1];
            let indicator = if populate {
                let len = v.value().len().min(size);
                buf[..len].copy_from_slice(&v.value().as_bytes()[..len]);
                len as Len
            } else {
                SQL_NULL_DATA
            };
            BoundParam {
                buffer: ParamBuffer::Bytes(buf),
                c_type: CDataType::Char,
                sql_type: SqlDataType::Decimal,
                column_size: v.precision() as ULen,
                decimal_digits: v.scale() as SmallInt,
                indicator,
            }
        }
        // Null hints and everything without a dedicated driver-writable
        // layout fall back to a narrow text buffer.
        _ => {
            let size = effective_size(param.size, DEFAULT_TEXT_OUTPUT_SIZE);
            BoundParam {
                buffer: ParamBuffer::Bytes(vec![0u8; size + 1]),
                c_type: CDataType::Char,
                sql_type: SqlDataType::Varchar,
                column_size: size as ULen,
                decimal_digits: 0,
                indicator: SQL_NULL_DATA,
            }
        }
    };
    Ok(bound)
}

fn effective_size(requested: usize, default: usize) -> usize {
    if requested == 0 {
        default
    } else {
        requested
    }
}

#[allow(clippy::too_many_arguments)]
fn fixed_output(
    buffer: ParamBuffer,
    c_type: CDataType,
    sql_type: SqlDataType,
    column_size: ULen,
    decimal_digits: SmallInt,
    width: Len,
    populate: bool,
) -> BoundParam {
    BoundParam {
        buffer,
        c_type,
        sql_type,
        column_size,
        decimal_digits,
        indicator: if populate { width } else { SQL_NULL_DATA },
    }
}

fn timestamp_output(ts: SqlTimestamp, precision: TimestampPrecision, populate: bool) -> BoundParam {
    BoundParam {
        buffer: ParamBuffer::Timestamp(Box::new(ts)),
        c_type: CDataType::TypeTimestamp,
        sql_type: SqlDataType::TypeTimestamp,
        column_size: timestamp_column_size(precision),
        decimal_digits: precision.digits() as SmallInt,
        indicator: if populate {
            size_of::<SqlTimestamp>() as Len
        } else {
            SQL_NULL_DATA
        },
    }
}

/// Reconstructs a native value from a driver-filled output buffer.
pub(crate) fn convert_output(
    buffer: &ParamBuffer,
    c_type: CDataType,
    indicator: Len,
    precision: TimestampPrecision,
) -> Value {
    if indicator == SQL_NULL_DATA {
        return Value::Null;
    }
    match buffer {
        ParamBuffer::None => Value::Null,
        ParamBuffer::U8(v) if c_type == CDataType::Bit => Value::Bool(**v != 0),
        ParamBuffer::U8(v) => Value::UTinyInt(**v),
        ParamBuffer::I8(v) => Value::TinyInt(**v),
        ParamBuffer::I16(v) => Value::SmallInt(**v),
        ParamBuffer::I32(v) => Value::Int(**v),
        ParamBuffer::I64(v) => Value::BigInt(**v),
        ParamBuffer::U16(v) => Value::USmallInt(**v),
        ParamBuffer::U32(v) => Value::UInt(**v),
        ParamBuffer::F32(v) => Value::Real(**v),
        ParamBuffer::F64(v) => Value::Double(**v),
        ParamBuffer::Bytes(buf) if c_type == CDataType::Char => {
            let len = indicator.clamp(0, buf.len() as Len) as usize;
            let end = buf[..len].iter().position(|&b| b == 0).unwrap_or(len);
            Value::Text(String::from_utf8_lossy(&buf[..end]).into_owned())
        }
        ParamBuffer::Bytes(buf) if c_type == CDataType::Guid => {
            let mut g = [0u8; 16];
            let len = buf.len().min(16);
            g[..len].copy_from_slice(&buf[..len]);
            Value::Guid(crate::value::Guid(g))
        }
        ParamBuffer::Bytes(buf) => {
            let len = indicator.clamp(0, buf.len() as Len) as usize;
            Value::Bytes(buf[..len].to_vec())
        }
        ParamBuffer::Wide(buf) => {
            let mut units = (indicator.max(0) as usize / 2).min(buf.len());
            if let Some(nul) = buf[..units].iter().position(|&u| u == 0) {
                units = nul;
            }
            Value::WideText(decode_utf16(&buf[..units]))
        }
        ParamBuffer::Timestamp(ts) => {
            Value::Timestamp(Timestamp::new(naive_from_sql_timestamp(ts), precision))
        }
        ParamBuffer::Date(d) => Value::Date(
            NaiveDate::from_ymd_opt(d.year as i32, d.month as u32, d.day as u32)
                .unwrap_or_default(),
        ),
        ParamBuffer::Time(t) => Value::Time(
            NaiveTime::from_hms_opt(t.hour as u32, t.minute as u32, t.second as u32)
                .unwrap_or_default(),
        ),
        ParamBuffer::IntervalYearMonth(i) => {
            Value::IntervalYearMonth(crate::value::IntervalYearMonth {
                years: i.year,
                months: i.month,
                negative: i.interval_sign != 0,
            })
        }
        ParamBuffer::IntervalDaySecond(i) => {
            Value::IntervalDaySecond(crate::value::IntervalDaySecond {
                days: i.day,
                hours: i.hour,
                minutes: i.minute,
                seconds: i.second,
                nanoseconds: i.fraction,
                negative: i.interval_sign != 0,
            })
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::{Decimal, Guid};
    use test_case::test_case;

    #[test_case(TimestampPrecision::Seconds, 123_456_789, 0; "seconds zeroes the fraction")]
    #[test_case(TimestampPrecision::Milliseconds, 123_456_789, 123_000_000; "milliseconds keep three digits")]
    #[test_case(TimestampPrecision::Microseconds, 123_456_789, 123_456_000; "microseconds keep six digits")]
    #[test_case(TimestampPrecision::Nanoseconds, 123_456_789, 123_456_789; "nanoseconds pass through")]
    fn fraction_truncates_to_precision(
        precision: TimestampPrecision,
        nanos: u32,
        expected: u32,
    ) {
        assert_eq!(expected, truncate_fraction(nanos, precision));
    }

    #[test]
    fn truncation_never_rounds_up() {
        for &p in &[
            TimestampPrecision::Seconds,
            TimestampPrecision::Milliseconds,
            TimestampPrecision::Microseconds,
            TimestampPrecision::Nanoseconds,
        ] {
            for nanos in [0u32, 1, 999_999, 999_999_999, 123_456_789] {
                let written = truncate_fraction(nanos, p);
                assert!(written <= nanos);
                let step = 10u64.pow(9 - p.digits());
                assert!(((nanos - written) as u64) < step);
            }
        }
    }

    #[test_case(TimestampPrecision::Seconds, 19)]
    #[test_case(TimestampPrecision::Milliseconds, 23)]
    #[test_case(TimestampPrecision::Microseconds, 26)]
    #[test_case(TimestampPrecision::Nanoseconds, 29)]
    fn timestamp_column_sizes(precision: TimestampPrecision, expected: ULen) {
        assert_eq!(expected, timestamp_column_size(precision));
    }

    #[test]
    fn utf16_encoding_appends_terminator() {
        let units = encode_utf16_z("ab");
        assert_eq!(vec![0x61, 0x62, 0], units);
    }

    #[test]
    fn supplementary_scalars_become_surrogate_pairs() {
        for cp in [0x10000u32, 0x1F600, 0x10FFFF] {
            let c = char::from_u32(cp).unwrap();
            let units = encode_utf16_z(&c.to_string());
            assert_eq!(3, units.len());
            assert!((0xD800..=0xDBFF).contains(&units[0]), "high surrogate");
            assert!((0xDC00..=0xDFFF).contains(&units[1]), "low surrogate");
            assert_eq!(0, units[2]);
            let decoded = decode_utf16(&units[..2]);
            assert_eq!(c.to_string(), decoded);
        }
    }

    #[test]
    fn wide_string_reports_unit_count_and_byte_length() {
        // Two ASCII chars, one space, one BMP ideograph, one space, one
        // emoji: 6 scalars, 7 UTF-16 code units.
        let text = "Hi 中 😀";
        let bound = to_odbc(&Value::WideText(text.to_string())).unwrap();
        assert_eq!(7, bound.column_size);
        assert_eq!(14, bound.indicator);
        match bound.buffer {
            ParamBuffer::Wide(units) => {
                assert_eq!(8, units.len());
                assert_eq!(0, *units.last().unwrap());
            }
            other => panic!("expected wide buffer, got {other:?}"),
        }
    }

    #[test]
    fn unpaired_surrogate_decodes_to_replacement() {
        assert_eq!("\u{FFFD}", decode_utf16(&[0xD800]));
        assert_eq!("a\u{FFFD}b", decode_utf16(&[0x61, 0xDC00, 0x62]));
    }

    #[test]
    fn null_binds_with_null_indicator() {
        let bound = to_odbc(&Value::Null).unwrap();
        assert_eq!(SQL_NULL_DATA, bound.indicator);
        assert_eq!(CDataType::Char, bound.c_type);
        assert_eq!(SqlDataType::Varchar, bound.sql_type);
        assert_eq!(0, bound.column_size);
    }

    #[test]
    fn narrow_text_is_null_terminated_but_reports_byte_length() {
        let bound = to_odbc(&Value::Text("hello".to_string())).unwrap();
        assert_eq!(5, bound.column_size);
        assert_eq!(5, bound.indicator);
        match bound.buffer {
            ParamBuffer::Bytes(buf) => assert_eq!(b"hello\0".to_vec(), buf),
            other => panic!("expected byte buffer, got {other:?}"),
        }
    }

    #[test]
    fn unsigned_sixty_four_routes_through_decimal_text() {
        let bound = to_odbc(&Value::UBigInt(u64::MAX)).unwrap();
        assert_eq!(CDataType::Char, bound.c_type);
        assert_eq!(SqlDataType::Varchar, bound.sql_type);
        assert_eq!(20, bound.column_size);
        match bound.buffer {
            ParamBuffer::Bytes(buf) => {
                assert_eq!(b"18446744073709551615\0".to_vec(), buf);
            }
            other => panic!("expected byte buffer, got {other:?}"),
        }
    }

    #[test]
    fn empty_byte_slice_binds_without_a_pointer() {
        let mut bound = to_odbc(&Value::Bytes(Vec::new())).unwrap();
        assert_eq!(0, bound.indicator);
        let (ptr, len) = bound.buffer.as_mut_ptr();
        assert!(ptr.is_null());
        assert_eq!(0, len);
    }

    #[test]
    fn integer_table_matches_the_contract() {
        let cases: Vec<(Value, CDataType, SqlDataType, ULen, Len)> = vec![
            (Value::Bool(true), CDataType::Bit, SqlDataType::Bit, 1, 1),
            (Value::TinyInt(1), CDataType::STinyInt, SqlDataType::TinyInt, 4, 1),
            (Value::SmallInt(1), CDataType::SShort, SqlDataType::SmallInt, 6, 2),
            (Value::Int(1), CDataType::SLong, SqlDataType::Integer, 11, 4),
            (Value::BigInt(1), CDataType::SBigInt, SqlDataType::BigInt, 20, 8),
            (Value::UTinyInt(1), CDataType::UTinyInt, SqlDataType::TinyInt, 3, 1),
            (Value::USmallInt(1), CDataType::UShort, SqlDataType::SmallInt, 5, 2),
            (Value::UInt(1), CDataType::ULong, SqlDataType::Integer, 10, 4),
            (Value::Real(1.0), CDataType::Float, SqlDataType::Real, 7, 4),
            (Value::Double(1.0), CDataType::Double, SqlDataType::Double, 15, 8),
        ];
        for (value, c_type, sql_type, size, indicator) in cases {
            let bound = to_odbc(&value).unwrap();
            assert_eq!(c_type, bound.c_type, "{value:?}");
            assert_eq!(sql_type, bound.sql_type, "{value:?}");
            assert_eq!(size, bound.column_size, "{value:?}");
            assert_eq!(indicator, bound.indicator, "{value:?}");
        }
    }

    #[test]
    fn decimal_binds_as_text_with_precision_and_scale() {
        let decimal = Decimal::new("123.45", 5, 2).unwrap();
        let bound = to_odbc(&Value::Decimal(decimal)).unwrap();
        assert_eq!(CDataType::Char, bound.c_type);
        assert_eq!(SqlDataType::Decimal, bound.sql_type);
        assert_eq!(5, bound.column_size);
        assert_eq!(2, bound.decimal_digits);
        assert_eq!(6, bound.indicator);
    }

    #[test]
    fn timestamp_binding_truncates_the_fraction() {
        let datetime = NaiveDate::from_ymd_opt(2024, 5, 17)
            .unwrap()
            .and_hms_nano_opt(10, 30, 0, 123_456_789)
            .unwrap();
        let bound = to_odbc(&Value::Timestamp(Timestamp::new(
            datetime,
            TimestampPrecision::Milliseconds,
        )))
        .unwrap();
        assert_eq!(23, bound.column_size);
        assert_eq!(3, bound.decimal_digits);
        match bound.buffer {
            ParamBuffer::Timestamp(ts) => assert_eq!(123_000_000, ts.fraction),
            other => panic!("expected timestamp buffer, got {other:?}"),
        }
    }

    #[test]
    fn zoned_timestamp_is_converted_to_utc() {
        use chrono::{FixedOffset, TimeZone};
        let zone = FixedOffset::east_opt(2 * 3600).unwrap();
        let datetime = zone.with_ymd_and_hms(2024, 5, 17, 12, 0, 0).unwrap();
        let bound = to_odbc(&Value::TimestampTz(crate::value::TimestampTz::new(
            datetime,
            TimestampPrecision::Seconds,
        )))
        .unwrap();
        match bound.buffer {
            ParamBuffer::Timestamp(ts) => assert_eq!(10, ts.hour),
            other => panic!("expected timestamp buffer, got {other:?}"),
        }
    }

    #[test]
    fn guid_binds_its_sixteen_layout_bytes() {
        let guid = Guid::parse("00112233-4455-6677-8899-AABBCCDDEEFF").unwrap();
        let bound = to_odbc(&Value::Guid(guid)).unwrap();
        assert_eq!(16, bound.column_size);
        assert_eq!(16, bound.indicator);
        match bound.buffer {
            ParamBuffer::Bytes(buf) => assert_eq!(guid.0.to_vec(), buf),
            other => panic!("expected byte buffer, got {other:?}"),
        }
    }

    #[test]
    fn output_buffers_default_their_sizes() {
        let text = allocate_output_buffer(&OutputParam {
            value: Value::Text(String::new()),
            direction: ParamDirection::Output,
            size: 0,
        })
        .unwrap();
        assert_eq!(DEFAULT_TEXT_OUTPUT_SIZE as ULen, text.column_size);
        assert_eq!(SQL_NULL_DATA, text.indicator);

        let bytes = allocate_output_buffer(&OutputParam {
            value: Value::Bytes(Vec::new()),
            direction: ParamDirection::Output,
            size: 0,
        })
        .unwrap();
        assert_eq!(DEFAULT_BINARY_OUTPUT_SIZE as ULen, bytes.column_size);
    }

    #[test]
    fn input_output_buffer_carries_the_initial_value() {
        let bound = allocate_output_buffer(&OutputParam {
            value: Value::Text("seed".to_string()),
            direction: ParamDirection::InputOutput,
            size: 16,
        })
        .unwrap();
        assert_eq!(4, bound.indicator);
        match &bound.buffer {
            ParamBuffer::Bytes(buf) => {
                assert_eq!(17, buf.len());
                assert_eq!(b"seed", &buf[..4]);
            }
            other => panic!("expected byte buffer, got {other:?}"),
        }
    }

    #[test]
    fn output_conversion_round_trips_fixed_types() {
        let v = convert_output(
            &ParamBuffer::I64(Box::new(42)),
            CDataType::SBigInt,
            8,
            TimestampPrecision::Milliseconds,
        );
        assert_eq!(Value::BigInt(42), v);

        let v = convert_output(
            &ParamBuffer::U8(Box::new(1)),
            CDataType::Bit,
            1,
            TimestampPrecision::Milliseconds,
        );
        assert_eq!(Value::Bool(true), v);
    }

    #[test]
    fn output_conversion_honours_the_null_indicator() {
        let v = convert_output(
            &ParamBuffer::I64(Box::new(42)),
            CDataType::SBigInt,
            SQL_NULL_DATA,
            TimestampPrecision::Milliseconds,
        );
        assert_eq!(Value::Null, v);
    }

    #[test]
    fn output_text_stops_at_the_terminator() {
        let mut buf = b"hello\0garbage".to_vec();
        buf.resize(32, 0);
        let v = convert_output(
            &ParamBuffer::Bytes(buf),
            CDataType::Char,
            13,
            TimestampPrecision::Milliseconds,
        );
        assert_eq!(Value::Text("hello".to_string()), v);
    }

    #[test]
    fn buffer_addresses_are_stable_under_collection_growth() {
        let mut buffers = Vec::new();
        buffers.push(to_odbc(&Value::BigInt(7)).unwrap().buffer);
        let (before, _) = buffers[0].as_mut_ptr();
        for i in 0..64 {
            buffers.push(to_odbc(&Value::BigInt(i)).unwrap().buffer);
        }
        let (after, _) = buffers[0].as_mut_ptr();
        assert_eq!(before, after);
    }
}
