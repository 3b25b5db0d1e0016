//! `Any` — a statically typed stand-in for the dynamically-typed values the
//! wire format can carry, per the design and the "Dynamic typing of `any`"
//! design note: classification of numbers must reproduce the original rules
//! exactly, since two implementations that disagree about int-vs-float here
//! would no longer be wire compatible.

use crate::decoding::Read;
use crate::encoding::Write;
use crate::error::Error;
use std::collections::HashMap;
use std::sync::Arc;

const TAG_UNDEFINED: u8 = 127;
const TAG_NULL: u8 = 126;
const TAG_INTEGER: u8 = 125;
const TAG_FLOAT32: u8 = 124;
const TAG_FLOAT64: u8 = 123;
const TAG_BIGINT: u8 = 122;
const TAG_FALSE: u8 = 121;
const TAG_TRUE: u8 = 120;
const TAG_STRING: u8 = 119;
const TAG_OBJECT: u8 = 118;
const TAG_ARRAY: u8 = 117;
const TAG_BYTES: u8 = 116;

/// A JSON-superset value: anything that can appear as `any`-tagged content
/// in an update (map values, array elements, embeds).
#[derive(Debug, Clone, PartialEq)]
pub enum Any {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(i64),
    String(Arc<str>),
    Buffer(Arc<[u8]>),
    Array(Arc<[Any]>),
    Map(Arc<HashMap<String, Any>>),
}

impl Default for Any {
    fn default() -> Self {
        Any::Undefined
    }
}

impl Any {
    /// Classifies and writes a JSON-like value using the fixed tag table from
    /// the wire's `any` encoding. Numbers are classified dynamically: an exact 32-bit signed
    /// integer is written as `Integer`; otherwise a value that round-trips
    /// losslessly through `f32` is written as `Float32`; everything else as
    /// `Float64`. `BigInt` is always written as `BigInt`, never reclassified.
    pub fn encode<W: Write>(&self, encoder: &mut W) {
        match self {
            Any::Undefined => encoder.write_u8(TAG_UNDEFINED),
            Any::Null => encoder.write_u8(TAG_NULL),
            Any::Bool(false) => encoder.write_u8(TAG_FALSE),
            Any::Bool(true) => encoder.write_u8(TAG_TRUE),
            Any::Number(n) => Self::encode_number(*n, encoder),
            Any::BigInt(i) => {
                encoder.write_u8(TAG_BIGINT);
                encoder.write_ivar(*i);
            }
            Any::String(s) => {
                encoder.write_u8(TAG_STRING);
                encoder.write_string(s);
            }
            Any::Buffer(b) => {
                encoder.write_u8(TAG_BYTES);
                encoder.write_buf(b);
            }
            Any::Array(items) => {
                encoder.write_u8(TAG_ARRAY);
                encoder.write_var(items.len() as u64);
                for item in items.iter() {
                    item.encode(encoder);
                }
            }
            Any::Map(map) => {
                encoder.write_u8(TAG_OBJECT);
                encoder.write_var(map.len() as u64);
                for (k, v) in map.iter() {
                    encoder.write_string(k);
                    v.encode(encoder);
                }
            }
        }
    }

    fn encode_number<W: Write>(n: f64, encoder: &mut W) {
        if n.fract() == 0.0 && n >= i32::MIN as f64 && n <= i32::MAX as f64 {
            encoder.write_u8(TAG_INTEGER);
            encoder.write_ivar(n as i64);
        } else if (n as f32) as f64 == n {
            encoder.write_u8(TAG_FLOAT32);
            encoder.write_f32(n as f32);
        } else {
            encoder.write_u8(TAG_FLOAT64);
            encoder.write_f64(n);
        }
    }

    pub fn decode<R: Read>(decoder: &mut R) -> Result<Any, Error> {
        let tag = decoder.read_u8()?;
        match tag {
            TAG_UNDEFINED => Ok(Any::Undefined),
            TAG_NULL => Ok(Any::Null),
            TAG_FALSE => Ok(Any::Bool(false)),
            TAG_TRUE => Ok(Any::Bool(true)),
            TAG_INTEGER => Ok(Any::Number(decoder.read_ivar()? as f64)),
            TAG_FLOAT32 => Ok(Any::Number(decoder.read_f32()? as f64)),
            TAG_FLOAT64 => Ok(Any::Number(decoder.read_f64()?)),
            TAG_BIGINT => Ok(Any::BigInt(decoder.read_ivar()?)),
            TAG_STRING => Ok(Any::String(decoder.read_string()?.into())),
            TAG_BYTES => Ok(Any::Buffer(decoder.read_buf()?.into())),
            TAG_ARRAY => {
                let len: usize = decoder.read_var()?;
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(Any::decode(decoder)?);
                }
                Ok(Any::Array(items.into()))
            }
            TAG_OBJECT => {
                let len: usize = decoder.read_var()?;
                let mut map = HashMap::with_capacity(len);
                for _ in 0..len {
                    let key = decoder.read_string()?.to_owned();
                    let value = Any::decode(decoder)?;
                    map.insert(key, value);
                }
                Ok(Any::Map(Arc::new(map)))
            }
            _ => Err(Error::UnexpectedValue),
        }
    }
}

impl From<bool> for Any {
    fn from(v: bool) -> Self {
        Any::Bool(v)
    }
}

impl From<String> for Any {
    fn from(v: String) -> Self {
        Any::String(v.into())
    }
}

impl<'a> From<&'a str> for Any {
    fn from(v: &'a str) -> Self {
        Any::String(v.into())
    }
}

macro_rules! impl_from_number {
    ($t:ty) => {
        impl From<$t> for Any {
            fn from(v: $t) -> Self {
                Any::Number(v as f64)
            }
        }
    };
}

impl_from_number!(i16);
impl_from_number!(i32);
impl_from_number!(u16);
impl_from_number!(u32);
impl_from_number!(f32);
impl_from_number!(f64);

impl From<i64> for Any {
    fn from(v: i64) -> Self {
        // values within i32 range stay representable as Integer on the wire;
        // larger values need BigInt to avoid silent precision loss.
        if v >= i32::MIN as i64 && v <= i32::MAX as i64 {
            Any::Number(v as f64)
        } else {
            Any::BigInt(v)
        }
    }
}

impl From<u64> for Any {
    fn from(v: u64) -> Self {
        if v <= i32::MAX as u64 {
            Any::Number(v as f64)
        } else {
            Any::BigInt(v as i64)
        }
    }
}

impl From<Vec<u8>> for Any {
    fn from(v: Vec<u8>) -> Self {
        Any::Buffer(v.into())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::decoding::Cursor;

    fn roundtrip(v: Any) {
        let mut buf = Vec::new();
        v.encode(&mut buf);
        let mut cursor = Cursor::new(&buf);
        let decoded = Any::decode(&mut cursor).unwrap();
        assert_eq!(decoded, v);
    }

    #[test]
    fn classifies_small_integers_as_integer_tag() {
        let mut buf = Vec::new();
        Any::Number(42.0).encode(&mut buf);
        assert_eq!(buf[0], TAG_INTEGER);
    }

    #[test]
    fn classifies_out_of_i32_range_as_float() {
        let mut buf = Vec::new();
        Any::Number(1e20).encode(&mut buf);
        assert_eq!(buf[0], TAG_FLOAT64);
    }

    #[test]
    fn bigint_is_never_reclassified() {
        let mut buf = Vec::new();
        Any::BigInt(42).encode(&mut buf);
        assert_eq!(buf[0], TAG_BIGINT);
    }

    #[test]
    fn primitives_roundtrip() {
        roundtrip(Any::Undefined);
        roundtrip(Any::Null);
        roundtrip(Any::Bool(true));
        roundtrip(Any::Bool(false));
        roundtrip(Any::Number(42.0));
        roundtrip(Any::Number(0.5));
        roundtrip(Any::BigInt(i64::MAX));
        roundtrip(Any::String("hello".into()));
        roundtrip(Any::Buffer(vec![1, 2, 3].into()));
    }

    #[test]
    fn nested_array_and_map_roundtrip() {
        let mut map = HashMap::new();
        map.insert("a".to_string(), Any::Number(1.0));
        map.insert(
            "b".to_string(),
            Any::Array(vec![Any::Null, Any::Bool(true)].into()),
        );
        roundtrip(Any::Map(Arc::new(map)));
    }
}
