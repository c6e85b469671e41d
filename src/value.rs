//! Native value representation at the language boundary.

use crate::error::Error;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;

/// Fractional-second precision applied when a timestamp crosses the FFI
/// boundary. Digits beyond the selected precision are truncated, never
/// rounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampPrecision {
    /// No fractional seconds.
    Seconds,
    /// Three fractional digits. The default: every mainstream DBMS accepts it.
    #[default]
    Milliseconds,
    /// Six fractional digits.
    Microseconds,
    /// Nine fractional digits, the ODBC maximum.
    Nanoseconds,
}

impl TimestampPrecision {
    /// Number of fractional digits.
    pub fn digits(self) -> u32 {
        match self {
            TimestampPrecision::Seconds => 0,
            TimestampPrecision::Milliseconds => 3,
            TimestampPrecision::Microseconds => 6,
            TimestampPrecision::Nanoseconds => 9,
        }
    }
}

/// A timestamp with explicit fractional precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub datetime: NaiveDateTime,
    pub precision: TimestampPrecision,
}

impl Timestamp {
    pub fn new(datetime: NaiveDateTime, precision: TimestampPrecision) -> Self {
        Timestamp {
            datetime,
            precision,
        }
    }
}

/// A timezone-aware timestamp. Converted to UTC before it is handed to the
/// driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampTz {
    pub datetime: DateTime<FixedOffset>,
    pub precision: TimestampPrecision,
}

impl TimestampTz {
    pub fn new(datetime: DateTime<FixedOffset>, precision: TimestampPrecision) -> Self {
        TimestampTz {
            datetime,
            precision,
        }
    }
}

/// A decimal value carried as text so no precision is lost in transit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decimal {
    value: String,
    precision: u8,
    scale: u8,
}

impl Decimal {
    /// Builds a decimal with explicit precision (total digits, 1-38) and
    /// scale (digits after the point, 0-precision).
    pub fn new(value: impl Into<String>, precision: u8, scale: u8) -> Result<Self, Error> {
        let value = value.into();
        if !(1..=38).contains(&precision) {
            return Err(Error::Decimal(format!(
                "precision must be 1-38, got {precision}"
            )));
        }
        if scale > precision {
            return Err(Error::Decimal(format!(
                "scale must be 0-{precision}, got {scale}"
            )));
        }
        if !is_valid_decimal(&value) {
            return Err(Error::Decimal(format!("invalid decimal string: {value:?}")));
        }
        Ok(Decimal {
            value,
            precision,
            scale,
        })
    }

    /// Parses a decimal string, deriving precision and scale from the digits
    /// present.
    pub fn parse(value: impl Into<String>) -> Result<Self, Error> {
        let value = value.into();
        if !is_valid_decimal(&value) {
            return Err(Error::Decimal(format!("invalid decimal string: {value:?}")));
        }
        let digits = value.trim_start_matches(['+', '-']);
        let (precision, scale) = match digits.find('.') {
            None => (digits.len(), 0),
            Some(dot) => {
                let frac = digits.len() - dot - 1;
                (digits.len() - 1, frac)
            }
        };
        let precision = precision.clamp(1, 38) as u8;
        Ok(Decimal {
            value,
            precision,
            scale: scale.min(precision as usize) as u8,
        })
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    pub fn scale(&self) -> u8 {
        self.scale
    }
}

/// Accepts `[+-]?` digits with at most one dot and at least one digit.
pub(crate) fn is_valid_decimal(s: &str) -> bool {
    let rest = s.strip_prefix(['+', '-']).unwrap_or(s);
    if rest.is_empty() {
        return false;
    }
    let mut has_digit = false;
    let mut has_dot = false;
    for c in rest.bytes() {
        match c {
            b'0'..=b'9' => has_digit = true,
            b'.' if !has_dot => has_dot = true,
            _ => return false,
        }
    }
    has_digit
}

/// A GUID held in its ODBC memory layout: the first three groups
/// little-endian, the final eight bytes in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guid(pub [u8; 16]);

impl Guid {
    /// Parses the canonical `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` form.
    /// Hyphens are ignored wherever they appear.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let hex: String = s.chars().filter(|&c| c != '-').collect();
        if hex.len() != 32 {
            return Err(Error::Guid(format!(
                "expected 32 hex digits, got {}",
                hex.len()
            )));
        }
        let mut bytes = [0u8; 16];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let high = hex_digit(chunk[0])?;
            let low = hex_digit(chunk[1])?;
            bytes[i] = (high << 4) | low;
        }
        let mut g = [0u8; 16];
        // The string is big-endian throughout; data1..data3 are stored
        // little-endian in memory.
        g[0] = bytes[3];
        g[1] = bytes[2];
        g[2] = bytes[1];
        g[3] = bytes[0];
        g[4] = bytes[5];
        g[5] = bytes[4];
        g[6] = bytes[7];
        g[7] = bytes[6];
        g[8..].copy_from_slice(&bytes[8..]);
        Ok(Guid(g))
    }
}

fn hex_digit(c: u8) -> Result<u8, Error> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(Error::Guid(format!("invalid hex digit {:?}", c as char))),
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        let data1 = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
        let data2 = u16::from_le_bytes([b[4], b[5]]);
        let data3 = u16::from_le_bytes([b[6], b[7]]);
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            data1, data2, data3, b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]
        )
    }
}

/// A year-month interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntervalYearMonth {
    pub years: u32,
    pub months: u32,
    pub negative: bool,
}

/// A day-second interval with nanosecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntervalDaySecond {
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub nanoseconds: u32,
    pub negative: bool,
}

/// Direction of a bound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamDirection {
    #[default]
    Input,
    Output,
    InputOutput,
}

/// Wraps a value for output or input/output binding, as used by stored
/// procedures returning data through their parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputParam {
    /// Type hint (for output-only) or initial value (for input/output).
    pub value: Value,
    pub direction: ParamDirection,
    /// Buffer size for variable-length types. `0` selects the default
    /// (4000 bytes for text, 8000 for byte strings).
    pub size: usize,
}

/// Cursor behaviour requested for a prepared statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorType {
    #[default]
    ForwardOnly,
    Static,
    Keyset,
    Dynamic,
}

/// Requested transaction isolation. Levels without a direct ODBC equivalent
/// map to the nearest stricter driver level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    WriteCommitted,
    RepeatableRead,
    Snapshot,
    Serializable,
    Linearizable,
}

/// How the last-inserted identity is retrieved after an INSERT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LastInsertIdBehavior {
    /// Detect the DBMS at connect time and run its identity query.
    #[default]
    Auto,
    /// Always report zero.
    Disabled,
    /// The statement carries a RETURNING clause; no identity query is run.
    Returning,
}

/// A value crossing the boundary between the application and the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    UTinyInt(u8),
    USmallInt(u16),
    UInt(u32),
    /// Bound as a decimal string; binding as a signed 64-bit value would
    /// overflow for the upper half of the range.
    UBigInt(u64),
    Real(f32),
    Double(f64),
    /// Narrow text, handed to the driver as null-terminated UTF-8.
    Text(String),
    /// Wide text, handed to the driver as null-terminated UTF-16.
    WideText(String),
    Bytes(Vec<u8>),
    Guid(Guid),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(Timestamp),
    TimestampTz(TimestampTz),
    Decimal(Decimal),
    IntervalYearMonth(IntervalYearMonth),
    IntervalDaySecond(IntervalDaySecond),
    /// Output or input/output parameter wrapper.
    Output(Box<OutputParam>),
}

impl Value {
    /// An output-only parameter. The variant of `hint` determines the buffer
    /// type allocated for the driver to fill.
    pub fn output(hint: Value) -> Value {
        Value::Output(Box::new(OutputParam {
            value: hint,
            direction: ParamDirection::Output,
            size: 0,
        }))
    }

    /// An output-only parameter with an explicit buffer size for
    /// variable-length types.
    pub fn output_sized(hint: Value, size: usize) -> Value {
        Value::Output(Box::new(OutputParam {
            value: hint,
            direction: ParamDirection::Output,
            size,
        }))
    }

    /// A bidirectional parameter pre-populated with `value`.
    pub fn input_output(value: Value) -> Value {
        Value::Output(Box::new(OutputParam {
            value,
            direction: ParamDirection::InputOutput,
            size: 0,
        }))
    }

    /// A bidirectional parameter with an explicit buffer size.
    pub fn input_output_sized(value: Value, size: usize) -> Value {
        Value::Output(Box::new(OutputParam {
            value,
            direction: ParamDirection::InputOutput,
            size,
        }))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::TinyInt(v) => write!(f, "{v}"),
            Value::SmallInt(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::BigInt(v) => write!(f, "{v}"),
            Value::UTinyInt(v) => write!(f, "{v}"),
            Value::USmallInt(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::UBigInt(v) => write!(f, "{v}"),
            Value::Real(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Text(v) | Value::WideText(v) => f.write_str(v),
            Value::Bytes(v) => {
                for byte in v {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Value::Guid(v) => write!(f, "{v}"),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Value::Time(v) => write!(f, "{}", v.format("%H:%M:%S")),
            Value::Timestamp(v) => write!(f, "{}", v.datetime.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::TimestampTz(v) => {
                write!(f, "{}", v.datetime.format("%Y-%m-%d %H:%M:%S%.f %:z"))
            }
            Value::Decimal(v) => f.write_str(v.value()),
            Value::IntervalYearMonth(v) => {
                let sign = if v.negative { "-" } else { "" };
                write!(f, "{sign}{}-{}", v.years, v.months)
            }
            Value::IntervalDaySecond(v) => {
                let sign = if v.negative { "-" } else { "" };
                write!(
                    f,
                    "{sign}{} {:02}:{:02}:{:02}.{:09}",
                    v.days, v.hours, v.minutes, v.seconds, v.nanoseconds
                )
            }
            Value::Output(v) => write!(f, "{}", v.value),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::TinyInt(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::SmallInt(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::UTinyInt(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::USmallInt(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UBigInt(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Real(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Value::Time(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(Timestamp::new(v, TimestampPrecision::default()))
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Value::TimestampTz(TimestampTz::new(v, TimestampPrecision::default()))
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decimal_validator_accepts_signed_dotted_digits() {
        for ok in ["0", "42", "-42", "+42", "3.14", "-0.5", ".5", "5.", "+.5"] {
            assert!(is_valid_decimal(ok), "{ok}");
        }
    }

    #[test]
    fn decimal_validator_rejects_malformed_input() {
        for bad in ["", "-", "+", ".", "+.", "1.2.3", "1e5", "12a", " 1", "--1"] {
            assert!(!is_valid_decimal(bad), "{bad:?}");
        }
    }

    #[test]
    fn decimal_parse_derives_precision_and_scale() {
        let d = Decimal::parse("-123.45").unwrap();
        assert_eq!(5, d.precision());
        assert_eq!(2, d.scale());
        let d = Decimal::parse("1000").unwrap();
        assert_eq!(4, d.precision());
        assert_eq!(0, d.scale());
    }

    #[test]
    fn decimal_new_checks_ranges() {
        assert!(Decimal::new("1.5", 0, 0).is_err());
        assert!(Decimal::new("1.5", 39, 0).is_err());
        assert!(Decimal::new("1.5", 2, 3).is_err());
        assert!(Decimal::new("abc", 5, 2).is_err());
        assert!(Decimal::new("1.5", 2, 1).is_ok());
    }

    #[test]
    fn guid_parse_is_inverse_of_format() {
        let text = "01234567-89AB-CDEF-0123-456789ABCDEF";
        let guid = Guid::parse(text).unwrap();
        assert_eq!(text, guid.to_string());
        // Lowercase input formats back to uppercase.
        let guid = Guid::parse(&text.to_lowercase()).unwrap();
        assert_eq!(text, guid.to_string());
    }

    #[test]
    fn guid_layout_reverses_the_first_three_groups() {
        let guid = Guid::parse("00112233-4455-6677-8899-AABBCCDDEEFF").unwrap();
        assert_eq!(
            [
                0x33, 0x22, 0x11, 0x00, 0x55, 0x44, 0x77, 0x66, 0x88, 0x99, 0xAA, 0xBB, 0xCC,
                0xDD, 0xEE, 0xFF
            ],
            guid.0
        );
    }

    #[test]
    fn guid_parse_rejects_bad_input() {
        assert!(Guid::parse("0011223-4455").is_err());
        assert!(Guid::parse("00112233-4455-6677-8899-AABBCCDDEEGG").is_err());
    }

    #[test]
    fn null_round_trips_through_option() {
        assert_eq!(Value::Null, Value::from(None::<i64>));
        assert_eq!(Value::BigInt(7), Value::from(Some(7i64)));
    }
}
