//! Column values and the binary-protocol value codec.
//!
//! A row is an ordered sequence of [`Value`] variants. Field type and
//! flags select the decoder; parameter encoding dispatches on the host
//! variant. String-family columns are surfaced as raw bytes; callers
//! decode text through the connection charset.

use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::protocol::packet::ColumnType;
use crate::protocol::response::Field;
use crate::protocol::wire;

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bytes(Vec<u8>),
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    Time(MysqlTime),
}

/// Temporal value shared by DATE, DATETIME, TIMESTAMP and TIME columns.
///
/// An all-zero date part makes this a signed duration; `hour` then holds
/// the total hours (`days * 24 + hours` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MysqlTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u32,
    pub minute: u8,
    pub second: u8,
    pub neg: bool,
    pub micros: u32,
}

impl MysqlTime {
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// True when the value renders as a duration rather than a calendar
    /// date.
    pub fn is_duration(&self) -> bool {
        self.year == 0 && self.month == 0 && self.day == 0
    }
}

impl fmt::Display for MysqlTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_duration() {
            if self.neg {
                write!(f, "-")?;
            }
            write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)?;
        } else {
            write!(
                f,
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                self.year, self.month, self.day, self.hour, self.minute, self.second
            )?;
        }
        if self.micros != 0 {
            write!(f, ".{:06}", self.micros)?;
        }
        Ok(())
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Raw bytes for string-family values, None otherwise.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Lossy UTF-8 view of a string-family value.
    pub fn as_str(&self) -> Option<std::borrow::Cow<'_, str>> {
        self.as_bytes().map(String::from_utf8_lossy)
    }

    /// Byte length of the value's raw or rendered form; what
    /// `fetch_lengths` reports.
    pub fn byte_len(&self) -> usize {
        match self {
            Value::Null => 0,
            Value::Bytes(b) => b.len(),
            other => other.to_string().len(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Time(t) => write!(f, "{t}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt(v as u64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Bytes(v.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Bytes(v.into_bytes())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<MysqlTime> for Value {
    fn from(v: MysqlTime) -> Self {
        Value::Time(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// Parse a text-protocol row: one LCS per column, NULL-LCB for NULL.
pub fn read_text_row(payload: &[u8], column_count: usize) -> Result<Vec<Value>> {
    let mut buf = payload;
    let mut row = Vec::with_capacity(column_count);
    for _ in 0..column_count {
        row.push(match wire::read_lcs(&mut buf)? {
            Some(bytes) => Value::Bytes(bytes.to_vec()),
            None => Value::Null,
        });
    }
    if !buf.is_empty() {
        return Err(Error::protocol("trailing bytes after text row"));
    }
    Ok(row)
}

/// Parse a binary-protocol row against its field set.
pub fn read_bin_row(payload: &[u8], fields: &[Field]) -> Result<Vec<Value>> {
    let mut buf = payload;
    if wire::read_u8(&mut buf)? != 0x00 {
        return Err(Error::protocol("bad binary row header"));
    }

    // bits 0-1 of the bitmap are reserved, columns start at bit 2
    let bitmap = wire::take(&mut buf, (fields.len() + 7 + 2) / 8)?;

    let mut row = Vec::with_capacity(fields.len());
    for (i, field) in fields.iter().enumerate() {
        let bit = i + 2;
        if bitmap[bit / 8] & (1 << (bit % 8)) != 0 {
            row.push(Value::Null);
        } else {
            row.push(read_bin_value(&mut buf, field)?);
        }
    }
    if !buf.is_empty() {
        return Err(Error::protocol("trailing bytes after binary row"));
    }
    Ok(row)
}

/// Decode one non-NULL binary value.
pub fn read_bin_value(buf: &mut &[u8], field: &Field) -> Result<Value> {
    let unsigned = field.is_unsigned();
    match field.column_type {
        ColumnType::Null => Ok(Value::Null),
        ColumnType::Tiny => {
            let v = wire::read_u8(buf)?;
            Ok(if unsigned {
                Value::UInt(v as u64)
            } else {
                Value::Int(v as i8 as i64)
            })
        }
        ColumnType::Short | ColumnType::Year => {
            let v = wire::read_u16_le(buf)?;
            Ok(if unsigned {
                Value::UInt(v as u64)
            } else {
                Value::Int(v as i16 as i64)
            })
        }
        ColumnType::Long | ColumnType::Int24 => {
            let v = wire::read_u32_le(buf)?;
            Ok(if unsigned {
                Value::UInt(v as u64)
            } else {
                Value::Int(v as i32 as i64)
            })
        }
        ColumnType::LongLong => {
            let v = wire::read_u64_le(buf)?;
            Ok(if unsigned {
                Value::UInt(v)
            } else {
                Value::Int(v as i64)
            })
        }
        ColumnType::Float => {
            let raw = wire::read_u32_le(buf)?;
            Ok(Value::Float(f32::from_bits(raw)))
        }
        ColumnType::Double => {
            let raw = wire::read_u64_le(buf)?;
            Ok(Value::Double(f64::from_bits(raw)))
        }
        ColumnType::Decimal
        | ColumnType::NewDecimal
        | ColumnType::Varchar
        | ColumnType::VarString
        | ColumnType::String
        | ColumnType::TinyBlob
        | ColumnType::MediumBlob
        | ColumnType::LongBlob
        | ColumnType::Blob
        | ColumnType::Bit
        | ColumnType::Enum
        | ColumnType::Set
        | ColumnType::Geometry => match wire::read_lcs(buf)? {
            Some(bytes) => Ok(Value::Bytes(bytes.to_vec())),
            None => Err(Error::protocol("NULL length in binary row value")),
        },
        ColumnType::Date | ColumnType::DateTime | ColumnType::Timestamp | ColumnType::NewDate => {
            read_bin_date(buf)
        }
        ColumnType::Time => read_bin_time(buf),
    }
}

fn read_bin_date(buf: &mut &[u8]) -> Result<Value> {
    let len = wire::read_u8(buf)?;
    let mut t = MysqlTime::default();
    match len {
        0 => {}
        4 | 7 | 11 => {
            t.year = wire::read_u16_le(buf)?;
            t.month = wire::read_u8(buf)?;
            t.day = wire::read_u8(buf)?;
            if len >= 7 {
                t.hour = wire::read_u8(buf)? as u32;
                t.minute = wire::read_u8(buf)?;
                t.second = wire::read_u8(buf)?;
            }
            if len == 11 {
                t.micros = wire::read_u32_le(buf)?;
            }
        }
        other => {
            return Err(Error::protocol(format!(
                "bad datetime length {other} in binary row"
            )))
        }
    }
    Ok(Value::Time(t))
}

fn read_bin_time(buf: &mut &[u8]) -> Result<Value> {
    let len = wire::read_u8(buf)?;
    let mut t = MysqlTime::default();
    match len {
        0 => {}
        8 | 12 => {
            t.neg = wire::read_u8(buf)? != 0;
            let days = wire::read_u32_le(buf)?;
            let hours = wire::read_u8(buf)? as u32;
            t.hour = days * 24 + hours;
            t.minute = wire::read_u8(buf)?;
            t.second = wire::read_u8(buf)?;
            if len == 12 {
                t.micros = wire::read_u32_le(buf)?;
            }
        }
        other => {
            return Err(Error::protocol(format!(
                "bad time length {other} in binary row"
            )))
        }
    }
    Ok(Value::Time(t))
}

/// Wire type tag + signedness byte for one parameter.
pub fn param_type_pair(value: &Value) -> [u8; 2] {
    match value {
        Value::Null => [ColumnType::Null as u8, 0],
        Value::Bytes(_) => [ColumnType::VarString as u8, 0],
        Value::Int(_) => [ColumnType::LongLong as u8, 0],
        Value::UInt(_) => [ColumnType::LongLong as u8, 0x80],
        Value::Float(_) | Value::Double(_) => [ColumnType::Double as u8, 0],
        Value::Time(_) => [ColumnType::DateTime as u8, 0],
    }
}

/// Encode one non-NULL parameter in its binary form.
pub fn write_bin_value(dst: &mut BytesMut, value: &Value) {
    match value {
        Value::Null => {}
        Value::Bytes(b) => wire::put_lcs(dst, b),
        Value::Int(v) => dst.put_i64_le(*v),
        Value::UInt(v) => dst.put_u64_le(*v),
        Value::Float(v) => dst.put_f64_le(*v as f64),
        Value::Double(v) => dst.put_f64_le(*v),
        Value::Time(t) => write_bin_datetime(dst, t),
    }
}

fn write_bin_datetime(dst: &mut BytesMut, t: &MysqlTime) {
    if t.is_zero() {
        dst.put_u8(0);
    } else if t.micros != 0 {
        dst.put_u8(11);
        put_datetime_head(dst, t);
        dst.put_u8(t.hour as u8);
        dst.put_u8(t.minute);
        dst.put_u8(t.second);
        dst.put_u32_le(t.micros);
    } else if t.hour != 0 || t.minute != 0 || t.second != 0 {
        dst.put_u8(7);
        put_datetime_head(dst, t);
        dst.put_u8(t.hour as u8);
        dst.put_u8(t.minute);
        dst.put_u8(t.second);
    } else {
        dst.put_u8(4);
        put_datetime_head(dst, t);
    }
}

fn put_datetime_head(dst: &mut BytesMut, t: &MysqlTime) {
    dst.put_u16_le(t.year);
    dst.put_u8(t.month);
    dst.put_u8(t.day);
}

/// NULL bitmap for a parameter block, `(n + 7) / 8` bytes, no bit offset.
pub fn param_null_bitmap(params: &[Value]) -> Vec<u8> {
    let mut bitmap = vec![0u8; (params.len() + 7) / 8];
    for (i, value) in params.iter().enumerate() {
        if value.is_null() {
            bitmap[i / 8] |= 1 << (i % 8);
        }
    }
    bitmap
}
