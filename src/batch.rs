//! Column-major buffer packing for array-bound batch execution.
//!
//! For `N` parameter rows each column becomes one contiguous fixed-stride
//! buffer plus a length/indicator array with one slot per row. The binding
//! type of a column is derived from its first non-null value; slots holding
//! a value of another family are zero-filled.

use crate::convert::{encode_utf16_z, sql_timestamp_from, utf16_len};
use crate::defs::{
    CDataType, Len, Pointer, SmallInt, SqlDataType, SqlTimestamp, ULen, SQL_NULL_DATA,
};
use crate::value::{TimestampPrecision, Value};
use std::mem::size_of;
use std::ptr::null_mut;

/// Stride and reported size of the fallback text column.
const FALLBACK_TEXT_SIZE: usize = 255;

#[derive(Debug)]
enum ColumnData {
    Bytes(Vec<u8>),
    BigInts(Vec<i64>),
    Reals(Vec<f32>),
    Doubles(Vec<f64>),
    Timestamps(Vec<SqlTimestamp>),
}

/// One packed parameter column.
#[derive(Debug)]
pub(crate) struct ColumnBuffer {
    data: ColumnData,
    pub c_type: CDataType,
    pub sql_type: SqlDataType,
    pub column_size: ULen,
    pub decimal_digits: SmallInt,
    pub lengths: Vec<Len>,
    pub elem_size: usize,
}

impl ColumnBuffer {
    pub(crate) fn data_ptr(&mut self) -> Pointer {
        match &mut self.data {
            ColumnData::Bytes(v) => {
                if v.is_empty() {
                    null_mut()
                } else {
                    v.as_mut_ptr() as Pointer
                }
            }
            ColumnData::BigInts(v) => v.as_mut_ptr() as Pointer,
            ColumnData::Reals(v) => v.as_mut_ptr() as Pointer,
            ColumnData::Doubles(v) => v.as_mut_ptr() as Pointer,
            ColumnData::Timestamps(v) => v.as_mut_ptr() as Pointer,
        }
    }
}

fn integer_value(value: &Value) -> Option<i64> {
    match value {
        Value::TinyInt(v) => Some(*v as i64),
        Value::SmallInt(v) => Some(*v as i64),
        Value::Int(v) => Some(*v as i64),
        Value::BigInt(v) => Some(*v),
        Value::UTinyInt(v) => Some(*v as i64),
        Value::USmallInt(v) => Some(*v as i64),
        Value::UInt(v) => Some(*v as i64),
        _ => None,
    }
}

/// Packs one column of `values` (one entry per row) into a single buffer.
pub(crate) fn allocate_column(values: &[&Value]) -> ColumnBuffer {
    let rows = values.len();
    let mut lengths = vec![0 as Len; rows];

    let type_hint = values.iter().find(|v| !v.is_null()).copied();

    let Some(hint) = type_hint else {
        // Every row is null; a narrow text column carries the nulls.
        for slot in &mut lengths {
            *slot = SQL_NULL_DATA;
        }
        return ColumnBuffer {
            data: ColumnData::Bytes(vec![0u8; rows * (FALLBACK_TEXT_SIZE + 1)]),
            c_type: CDataType::Char,
            sql_type: SqlDataType::Varchar,
            column_size: FALLBACK_TEXT_SIZE as ULen,
            decimal_digits: 0,
            lengths,
            elem_size: FALLBACK_TEXT_SIZE + 1,
        };
    };

    match hint {
        Value::Bool(_) => {
            let mut data = vec![0u8; rows];
            for (i, value) in values.iter().enumerate() {
                match value {
                    Value::Null => lengths[i] = SQL_NULL_DATA,
                    Value::Bool(v) => {
                        data[i] = u8::from(*v);
                        lengths[i] = 1;
                    }
                    _ => lengths[i] = 1,
                }
            }
            ColumnBuffer {
                data: ColumnData::Bytes(data),
                c_type: CDataType::Bit,
                sql_type: SqlDataType::Bit,
                column_size: 1,
                decimal_digits: 0,
                lengths,
                elem_size: 1,
            }
        }
        v if integer_value(v).is_some() => {
            // The whole integer family widens to signed 64 bit.
            let mut data = vec![0i64; rows];
            for (i, value) in values.iter().enumerate() {
                if value.is_null() {
                    lengths[i] = SQL_NULL_DATA;
                } else {
                    data[i] = integer_value(value).unwrap_or(0);
                    lengths[i] = 8;
                }
            }
            ColumnBuffer {
                data: ColumnData::BigInts(data),
                c_type: CDataType::SBigInt,
                sql_type: SqlDataType::BigInt,
                column_size: 20,
                decimal_digits: 0,
                lengths,
                elem_size: 8,
            }
        }
        Value::Real(_) => {
            let mut data = vec![0f32; rows];
            for (i, value) in values.iter().enumerate() {
                match value {
                    Value::Null => lengths[i] = SQL_NULL_DATA,
                    Value::Real(v) => {
                        data[i] = *v;
                        lengths[i] = 4;
                    }
                    _ => lengths[i] = 4,
                }
            }
            ColumnBuffer {
                data: ColumnData::Reals(data),
                c_type: CDataType::Float,
                sql_type: SqlDataType::Real,
                column_size: 7,
                decimal_digits: 0,
                lengths,
                elem_size: 4,
            }
        }
        Value::Double(_) => {
            let mut data = vec![0f64; rows];
            for (i, value) in values.iter().enumerate() {
                match value {
                    Value::Null => lengths[i] = SQL_NULL_DATA,
                    Value::Double(v) => {
                        data[i] = *v;
                        lengths[i] = 8;
                    }
                    Value::Real(v) => {
                        data[i] = *v as f64;
                        lengths[i] = 8;
                    }
                    _ => lengths[i] = 8,
                }
            }
            ColumnBuffer {
                data: ColumnData::Doubles(data),
                c_type: CDataType::Double,
                sql_type: SqlDataType::Double,
                column_size: 15,
                decimal_digits: 0,
                lengths,
                elem_size: 8,
            }
        }
        Value::Text(_) | Value::WideText(_) => pack_text_column(values, lengths),
        Value::Bytes(_) => {
            let max_len = values
                .iter()
                .filter_map(|v| match v {
                    Value::Bytes(b) => Some(b.len()),
                    _ => None,
                })
                .max()
                .filter(|&len| len > 0)
                .unwrap_or(FALLBACK_TEXT_SIZE);
            let mut data = vec![0u8; rows * max_len];
            for (i, value) in values.iter().enumerate() {
                match value {
                    Value::Null => lengths[i] = SQL_NULL_DATA,
                    Value::Bytes(b) => {
                        let offset = i * max_len;
                        data[offset..offset + b.len()].copy_from_slice(b);
                        lengths[i] = b.len() as Len;
                    }
                    _ => {}
                }
            }
            ColumnBuffer {
                data: ColumnData::Bytes(data),
                c_type: CDataType::Binary,
                sql_type: SqlDataType::VarBinary,
                column_size: max_len as ULen,
                decimal_digits: 0,
                lengths,
                elem_size: max_len,
            }
        }
        Value::Timestamp(_) | Value::TimestampTz(_) => {
            // Uniform column layout: millisecond precision, the one every
            // mainstream driver accepts.
            let mut data = vec![SqlTimestamp::default(); rows];
            for (i, value) in values.iter().enumerate() {
                match value {
                    Value::Null => lengths[i] = SQL_NULL_DATA,
                    Value::Timestamp(ts) => {
                        data[i] =
                            sql_timestamp_from(ts.datetime, TimestampPrecision::Milliseconds);
                        lengths[i] = size_of::<SqlTimestamp>() as Len;
                    }
                    Value::TimestampTz(ts) => {
                        data[i] = sql_timestamp_from(
                            ts.datetime.naive_utc(),
                            TimestampPrecision::Milliseconds,
                        );
                        lengths[i] = size_of::<SqlTimestamp>() as Len;
                    }
                    _ => {}
                }
            }
            ColumnBuffer {
                data: ColumnData::Timestamps(data),
                c_type: CDataType::TypeTimestamp,
                sql_type: SqlDataType::TypeTimestamp,
                column_size: 23,
                decimal_digits: 3,
                lengths,
                elem_size: size_of::<SqlTimestamp>(),
            }
        }
        _ => {
            // Everything else travels as its text rendering.
            let stride = FALLBACK_TEXT_SIZE + 1;
            let mut data = vec![0u8; rows * stride];
            for (i, value) in values.iter().enumerate() {
                if value.is_null() {
                    lengths[i] = SQL_NULL_DATA;
                    continue;
                }
                let text = value.to_string();
                let len = text.len().min(FALLBACK_TEXT_SIZE);
                let offset = i * stride;
                data[offset..offset + len].copy_from_slice(&text.as_bytes()[..len]);
                lengths[i] = len as Len;
            }
            ColumnBuffer {
                data: ColumnData::Bytes(data),
                c_type: CDataType::Char,
                sql_type: SqlDataType::Varchar,
                column_size: FALLBACK_TEXT_SIZE as ULen,
                decimal_digits: 0,
                lengths,
                elem_size: stride,
            }
        }
    }
}

fn pack_text_column(values: &[&Value], mut lengths: Vec<Len>) -> ColumnBuffer {
    let rows = values.len();
    // Slot width is the widest observed value in UTF-16 code units,
    // surrogate pairs included.
    let max_units = values
        .iter()
        .filter_map(|v| match v {
            Value::Text(s) | Value::WideText(s) => Some(utf16_len(s)),
            _ => None,
        })
        .max()
        .filter(|&len| len > 0)
        .unwrap_or(FALLBACK_TEXT_SIZE);
    let elem_size = (max_units + 1) * 2;

    let mut data = vec![0u8; rows * elem_size];
    for (i, value) in values.iter().enumerate() {
        match value {
            Value::Null => lengths[i] = SQL_NULL_DATA,
            Value::Text(s) | Value::WideText(s) => {
                let units = encode_utf16_z(s);
                let offset = i * elem_size;
                for (j, unit) in units.iter().enumerate() {
                    let at = offset + j * 2;
                    data[at..at + 2].copy_from_slice(&unit.to_le_bytes());
                }
                lengths[i] = ((units.len() - 1) * 2) as Len;
            }
            _ => {}
        }
    }
    ColumnBuffer {
        data: ColumnData::Bytes(data),
        c_type: CDataType::WChar,
        sql_type: SqlDataType::WVarchar,
        column_size: max_units as ULen,
        decimal_digits: 0,
        lengths,
        elem_size,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const NULL: Value = Value::Null;

    fn refs(values: &[Value]) -> Vec<&Value> {
        values.iter().collect()
    }

    #[test]
    fn integer_family_widens_to_bigint() {
        let values = vec![
            Value::Int(1),
            Value::SmallInt(2),
            NULL,
            Value::BigInt(-3),
            Value::UTinyInt(4),
        ];
        let col = allocate_column(&refs(&values));
        assert_eq!(CDataType::SBigInt, col.c_type);
        assert_eq!(SqlDataType::BigInt, col.sql_type);
        assert_eq!(8, col.elem_size);
        match &col.data {
            ColumnData::BigInts(data) => assert_eq!(&[1, 2, 0, -3, 4], data.as_slice()),
            other => panic!("expected bigint column, got {other:?}"),
        }
        assert_eq!(vec![8, 8, SQL_NULL_DATA, 8, 8], col.lengths);
    }

    #[test]
    fn out_of_family_values_are_zero_filled() {
        let values = vec![Value::Int(1), Value::Text("x".to_string())];
        let col = allocate_column(&refs(&values));
        match &col.data {
            ColumnData::BigInts(data) => assert_eq!(&[1, 0], data.as_slice()),
            other => panic!("expected bigint column, got {other:?}"),
        }
        assert_eq!(vec![8, 8], col.lengths);
    }

    #[test]
    fn text_column_uses_the_widest_value_in_code_units() {
        let values = vec![
            Value::Text("ab".to_string()),
            NULL,
            Value::Text("😀".to_string()),
        ];
        let col = allocate_column(&refs(&values));
        assert_eq!(CDataType::WChar, col.c_type);
        assert_eq!(SqlDataType::WVarchar, col.sql_type);
        // "ab" and the emoji both occupy two UTF-16 code units.
        assert_eq!(2, col.column_size);
        assert_eq!((2 + 1) * 2, col.elem_size);
        assert_eq!(vec![4, SQL_NULL_DATA, 4], col.lengths);
    }

    #[test]
    fn text_slots_are_little_endian_utf16() {
        let values = vec![Value::Text("AB".to_string())];
        let col = allocate_column(&refs(&values));
        match &col.data {
            ColumnData::Bytes(data) => {
                assert_eq!(&[0x41, 0x00, 0x42, 0x00, 0x00, 0x00], data.as_slice())
            }
            other => panic!("expected byte column, got {other:?}"),
        }
    }

    #[test]
    fn byte_column_pads_to_the_longest_value() {
        let values = vec![Value::Bytes(vec![1, 2, 3]), Value::Bytes(vec![9]), NULL];
        let col = allocate_column(&refs(&values));
        assert_eq!(3, col.elem_size);
        match &col.data {
            ColumnData::Bytes(data) => {
                assert_eq!(&[1, 2, 3, 9, 0, 0, 0, 0, 0], data.as_slice())
            }
            other => panic!("expected byte column, got {other:?}"),
        }
        assert_eq!(vec![3, 1, SQL_NULL_DATA], col.lengths);
    }

    #[test]
    fn all_null_column_defaults_to_narrow_text() {
        let values = vec![NULL, NULL];
        let col = allocate_column(&refs(&values));
        assert_eq!(CDataType::Char, col.c_type);
        assert_eq!(vec![SQL_NULL_DATA, SQL_NULL_DATA], col.lengths);
        assert_eq!(256, col.elem_size);
    }

    #[test]
    fn timestamp_column_is_fixed_at_millisecond_precision() {
        use crate::value::Timestamp;
        use chrono::NaiveDate;
        let datetime = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_nano_opt(3, 4, 5, 123_456_789)
            .unwrap();
        let values = vec![Value::Timestamp(Timestamp::new(
            datetime,
            TimestampPrecision::Nanoseconds,
        ))];
        let col = allocate_column(&refs(&values));
        assert_eq!(23, col.column_size);
        assert_eq!(3, col.decimal_digits);
        match &col.data {
            ColumnData::Timestamps(data) => assert_eq!(123_000_000, data[0].fraction),
            other => panic!("expected timestamp column, got {other:?}"),
        }
    }

    #[test]
    fn fallback_column_renders_values_as_text() {
        let values = vec![Value::UBigInt(18_446_744_073_709_551_615)];
        let col = allocate_column(&refs(&values));
        assert_eq!(CDataType::Char, col.c_type);
        assert_eq!(20, col.lengths[0]);
        match &col.data {
            ColumnData::Bytes(data) => {
                assert_eq!(b"18446744073709551615", &data[..20]);
            }
            other => panic!("expected byte column, got {other:?}"),
        }
    }

    #[test]
    fn doubles_widen_reals_in_mixed_columns() {
        let values = vec![Value::Double(1.5), Value::Real(0.5)];
        let col = allocate_column(&refs(&values));
        match &col.data {
            ColumnData::Doubles(data) => assert_eq!(&[1.5, 0.5], data.as_slice()),
            other => panic!("expected double column, got {other:?}"),
        }
    }
}
