//! Tags as parsed from IFD entries: inline, offset-array and lazy variants.

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use tokio::sync::OnceCell;

use crate::error::{AsyncCogError, AsyncCogResult};
use crate::ifd::IfdConfig;
use crate::tags::{DataType, TagId};
use crate::view::ByteView;

/// A decoded tag value.
///
/// The numeric arrays that back per-chunk addressing decode into the typed
/// variants (`Shorts`, `Longs`, `Doubles`); everything else falls back to
/// scalars or `List`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Byte(u8),
    Short(u16),
    Long(u32),
    Long8(u64),
    SByte(i8),
    SShort(i16),
    SLong(i32),
    SLong8(i64),
    Float(f32),
    Double(f64),
    Rational(u32, u32),
    SRational(i32, i32),
    Ascii(String),
    Undefined(Bytes),
    Shorts(Vec<u16>),
    Longs(Vec<u64>),
    Doubles(Vec<f64>),
    List(Vec<Value>),
}

impl Value {
    /// Unsigned scalar coercion.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::Byte(v) => Some(v as u64),
            Value::Short(v) => Some(v as u64),
            Value::Long(v) => Some(v as u64),
            Value::Long8(v) => Some(v),
            _ => None,
        }
    }

    /// Float scalar coercion; rationals divide out.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Byte(v) => Some(v as f64),
            Value::Short(v) => Some(v as f64),
            Value::Long(v) => Some(v as f64),
            Value::Long8(v) => Some(v as f64),
            Value::SByte(v) => Some(v as f64),
            Value::SShort(v) => Some(v as f64),
            Value::SLong(v) => Some(v as f64),
            Value::SLong8(v) => Some(v as f64),
            Value::Float(v) => Some(v as f64),
            Value::Double(v) => Some(v),
            Value::Rational(n, d) if d != 0 => Some(n as f64 / d as f64),
            Value::SRational(n, d) if d != 0 => Some(n as f64 / d as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Ascii(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_shorts(&self) -> Option<&[u16]> {
        match self {
            Value::Shorts(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_longs(&self) -> Option<&[u64]> {
        match self {
            Value::Longs(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_doubles(&self) -> Option<&[f64]> {
        match self {
            Value::Doubles(v) => Some(v),
            _ => None,
        }
    }

    /// Scalar or array coerced into a `u16` vector (`BitsPerSample` may be
    /// either).
    pub fn to_u16_vec(&self) -> Option<Vec<u16>> {
        match self {
            Value::Shorts(v) => Some(v.clone()),
            Value::List(vs) => vs
                .iter()
                .map(|v| v.as_u64().map(|n| n as u16))
                .collect(),
            other => other.as_u64().map(|v| vec![v as u16]),
        }
    }

    /// Scalar or array coerced into an `f64` vector.
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Value::Doubles(v) => Some(v.clone()),
            Value::Longs(v) => Some(v.iter().map(|&n| n as f64).collect()),
            Value::Shorts(v) => Some(v.iter().map(|&n| n as f64).collect()),
            Value::List(vs) => vs.iter().map(Value::as_f64).collect(),
            other => other.as_f64().map(|v| vec![v]),
        }
    }

    /// Decode `count` elements of `data_type` from a raw little-endian
    /// payload. ASCII values lose their trailing NUL.
    pub(crate) fn decode(buf: &[u8], data_type: DataType, count: u64) -> AsyncCogResult<Value> {
        let count = count as usize;
        let width = data_type.size() as usize;
        let needed = count * width;
        if buf.len() < needed {
            return Err(AsyncCogError::ShortRead {
                expected: needed as u64,
                actual: buf.len() as u64,
            });
        }
        let scalar = count == 1;
        Ok(match data_type {
            DataType::Ascii => {
                let end = buf[..count].iter().position(|&b| b == 0).unwrap_or(count);
                Value::Ascii(String::from_utf8_lossy(&buf[..end]).into_owned())
            }
            DataType::Byte if scalar => Value::Byte(buf[0]),
            DataType::Byte | DataType::Undefined => {
                Value::Undefined(Bytes::copy_from_slice(&buf[..count]))
            }
            DataType::SByte if scalar => Value::SByte(buf[0] as i8),
            DataType::SByte => {
                Value::List(buf[..count].iter().map(|&b| Value::SByte(b as i8)).collect())
            }
            DataType::Short if scalar => Value::Short(LittleEndian::read_u16(buf)),
            DataType::Short => {
                let mut v = vec![0u16; count];
                LittleEndian::read_u16_into(&buf[..needed], &mut v);
                Value::Shorts(v)
            }
            DataType::SShort if scalar => Value::SShort(LittleEndian::read_i16(buf)),
            DataType::SShort => Value::List(
                (0..count)
                    .map(|i| Value::SShort(LittleEndian::read_i16(&buf[i * 2..])))
                    .collect(),
            ),
            DataType::Long | DataType::Ifd if scalar => Value::Long(LittleEndian::read_u32(buf)),
            DataType::Long | DataType::Ifd => Value::Longs(
                (0..count)
                    .map(|i| LittleEndian::read_u32(&buf[i * 4..]) as u64)
                    .collect(),
            ),
            DataType::SLong if scalar => Value::SLong(LittleEndian::read_i32(buf)),
            DataType::SLong => Value::List(
                (0..count)
                    .map(|i| Value::SLong(LittleEndian::read_i32(&buf[i * 4..])))
                    .collect(),
            ),
            DataType::Long8 | DataType::IfdLong8 if scalar => {
                Value::Long8(LittleEndian::read_u64(buf))
            }
            DataType::Long8 | DataType::IfdLong8 => Value::Longs(
                (0..count)
                    .map(|i| LittleEndian::read_u64(&buf[i * 8..]))
                    .collect(),
            ),
            DataType::SLong8 if scalar => Value::SLong8(LittleEndian::read_i64(buf)),
            DataType::SLong8 => Value::List(
                (0..count)
                    .map(|i| Value::SLong8(LittleEndian::read_i64(&buf[i * 8..])))
                    .collect(),
            ),
            DataType::Float if scalar => Value::Float(LittleEndian::read_f32(buf)),
            DataType::Float => Value::List(
                (0..count)
                    .map(|i| Value::Float(LittleEndian::read_f32(&buf[i * 4..])))
                    .collect(),
            ),
            DataType::Double if scalar => Value::Double(LittleEndian::read_f64(buf)),
            DataType::Double => {
                let mut v = vec![0f64; count];
                LittleEndian::read_f64_into(&buf[..needed], &mut v);
                Value::Doubles(v)
            }
            DataType::Rational if scalar => Value::Rational(
                LittleEndian::read_u32(buf),
                LittleEndian::read_u32(&buf[4..]),
            ),
            DataType::Rational => Value::List(
                (0..count)
                    .map(|i| {
                        Value::Rational(
                            LittleEndian::read_u32(&buf[i * 8..]),
                            LittleEndian::read_u32(&buf[i * 8 + 4..]),
                        )
                    })
                    .collect(),
            ),
            DataType::SRational if scalar => Value::SRational(
                LittleEndian::read_i32(buf),
                LittleEndian::read_i32(&buf[4..]),
            ),
            DataType::SRational => Value::List(
                (0..count)
                    .map(|i| {
                        Value::SRational(
                            LittleEndian::read_i32(&buf[i * 8..]),
                            LittleEndian::read_i32(&buf[i * 8 + 4..]),
                        )
                    })
                    .collect(),
            ),
        })
    }
}

/// A tag parsed from an IFD entry.
///
/// The entry either embeds its value (`Inline`), points at a numeric array
/// that gets indexed element-by-element (`Offset`), or points at a single
/// logical blob fetched once on demand (`Lazy`).
#[derive(Debug)]
pub enum Tag {
    Inline(InlineTag),
    Offset(OffsetTag),
    Lazy(LazyTag),
}

/// A value small enough to live in the entry's value slot, already decoded.
#[derive(Debug)]
pub struct InlineTag {
    pub id: TagId,
    pub data_type: DataType,
    pub count: u64,
    pub value: Value,
}

/// A numeric array stored outside the IFD, loaded wholesale on first
/// access and normalized to `u64` elements.
#[derive(Debug)]
pub struct OffsetTag {
    pub id: TagId,
    pub data_type: DataType,
    pub count: u64,
    pub value_offset: u64,
    pub(crate) values: OnceCell<Value>,
}

/// A single logical blob stored outside the IFD, fetched once on demand.
#[derive(Debug)]
pub struct LazyTag {
    pub id: TagId,
    pub data_type: DataType,
    pub count: u64,
    pub value_offset: u64,
    pub(crate) value: OnceCell<Value>,
}

impl Tag {
    pub fn id(&self) -> TagId {
        match self {
            Tag::Inline(t) => t.id,
            Tag::Offset(t) => t.id,
            Tag::Lazy(t) => t.id,
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Tag::Inline(t) => t.data_type,
            Tag::Offset(t) => t.data_type,
            Tag::Lazy(t) => t.data_type,
        }
    }

    /// Number of logical elements the tag holds; known without any fetch.
    pub fn count(&self) -> u64 {
        match self {
            Tag::Inline(t) => t.count,
            Tag::Offset(t) => t.count,
            Tag::Lazy(t) => t.count,
        }
    }

    /// The decoded value iff it is already resident. Never performs I/O.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Tag::Inline(t) => Some(&t.value),
            Tag::Offset(t) => t.values.get(),
            Tag::Lazy(t) => t.value.get(),
        }
    }

    /// True once the payload has been materialized.
    pub fn is_loaded(&self) -> bool {
        self.value().is_some()
    }

    /// Build a tag from the IFD entry at absolute `offset` in `view`.
    pub(crate) fn parse(config: IfdConfig, view: &ByteView, offset: u64) -> AsyncCogResult<Tag> {
        let id = TagId::from(view.read_u16(offset)?);
        let data_type = DataType::parse(view.read_u16(offset + 2)?)?;
        let count = view.read_uint(offset + 4, config.pointer_bytes)?;
        let payload = count.saturating_mul(data_type.size());
        let slot = offset + config.value_slot();

        if payload <= config.pointer_bytes as u64 {
            let buf = view.read_bytes(slot, payload)?;
            let value = Value::decode(&buf, data_type, count)?;
            return Ok(Tag::Inline(InlineTag {
                id,
                data_type,
                count,
                value,
            }));
        }

        let value_offset = view.read_uint(slot, config.pointer_bytes)?;
        if id.is_offset_array() {
            Ok(Tag::Offset(OffsetTag {
                id,
                data_type,
                count,
                value_offset,
                values: OnceCell::new(),
            }))
        } else {
            Ok(Tag::Lazy(LazyTag {
                id,
                data_type,
                count,
                value_offset,
                value: OnceCell::new(),
            }))
        }
    }
}
