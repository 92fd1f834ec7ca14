//! Typed value read/write.
//!
//! A concrete, self-describing shape for the serialized graphs the protocol
//! moves around, so bean invoke arguments/results, attachments, and naming
//! values can be built, transmitted, and asserted on in tests without a
//! second language's serializer on the other end.

use bytes::{Buf, BufMut, Bytes};

use crate::filter::ClassFilter;
use crate::token_table::{token_at, token_index};
use crate::varint::{read_packed_u32, write_packed_u32};
use crate::CodecError;

/// A value in the wire's self-describing value graph.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F64(f64),
    Str(String),
    Bytes(Bytes),
    List(Vec<WireValue>),
    Map(Vec<(WireValue, WireValue)>),
    /// A class-named object embedded in the graph; the only node the class
    /// filter inspects.
    Object(Box<TypedValue>),
}

/// A class-named object: the shape bean invoke arguments and results,
/// naming values, and exception bodies all share. The class name is the
/// one place the class filter attaches.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    pub class_name: String,
    pub fields: Vec<(String, WireValue)>,
}

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_I32: u8 = 2;
const TAG_I64: u8 = 3;
const TAG_F64: u8 = 4;
const TAG_STR: u8 = 5;
const TAG_BYTES: u8 = 6;
const TAG_LIST: u8 = 7;
const TAG_MAP: u8 = 8;
const TAG_OBJECT: u8 = 9;

const STRING_LITERAL: u8 = 0;
const STRING_TOKEN: u8 = 1;

fn read_u8(buf: &mut impl Buf) -> Result<u8, CodecError> {
    if !buf.has_remaining() {
        return Err(CodecError::Truncated { what: "byte" });
    }
    Ok(buf.get_u8())
}

fn write_string(buf: &mut impl BufMut, value: &str) {
    match token_index(value) {
        Some(idx) => {
            buf.put_u8(STRING_TOKEN);
            buf.put_u8(idx);
        }
        None => {
            buf.put_u8(STRING_LITERAL);
            write_packed_u32(buf, value.len() as u32);
            buf.put_slice(value.as_bytes());
        }
    }
}

fn read_string(buf: &mut impl Buf) -> Result<String, CodecError> {
    match read_u8(buf)? {
        STRING_LITERAL => {
            let len = read_packed_u32(buf)? as usize;
            if buf.remaining() < len {
                return Err(CodecError::Truncated { what: "string" });
            }
            let bytes = buf.copy_to_bytes(len);
            String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
        }
        STRING_TOKEN => {
            let idx = read_u8(buf)?;
            token_at(idx).map(str::to_owned).ok_or(CodecError::UnknownToken(idx))
        }
        other => Err(CodecError::UnknownTag(other)),
    }
}

pub fn encode_value(buf: &mut impl BufMut, value: &WireValue) {
    match value {
        WireValue::Null => buf.put_u8(TAG_NULL),
        WireValue::Bool(b) => {
            buf.put_u8(TAG_BOOL);
            buf.put_u8(u8::from(*b));
        }
        WireValue::I32(v) => {
            buf.put_u8(TAG_I32);
            buf.put_i32(*v);
        }
        WireValue::I64(v) => {
            buf.put_u8(TAG_I64);
            buf.put_i64(*v);
        }
        WireValue::F64(v) => {
            buf.put_u8(TAG_F64);
            buf.put_f64(*v);
        }
        WireValue::Str(s) => {
            buf.put_u8(TAG_STR);
            write_string(buf, s);
        }
        WireValue::Bytes(b) => {
            buf.put_u8(TAG_BYTES);
            write_packed_u32(buf, b.len() as u32);
            buf.put_slice(b);
        }
        WireValue::List(items) => {
            buf.put_u8(TAG_LIST);
            write_packed_u32(buf, items.len() as u32);
            for item in items {
                encode_value(buf, item);
            }
        }
        WireValue::Map(entries) => {
            buf.put_u8(TAG_MAP);
            write_packed_u32(buf, entries.len() as u32);
            for (key, value) in entries {
                encode_value(buf, key);
                encode_value(buf, value);
            }
        }
        WireValue::Object(object) => {
            buf.put_u8(TAG_OBJECT);
            encode_typed_value(buf, object);
        }
    }
}

/// Reads a value without class filtering, for graphs known to carry no
/// class-named objects (module-id components, internal fixtures).
pub fn decode_value(buf: &mut impl Buf) -> Result<WireValue, CodecError> {
    decode_value_filtered(buf, &ClassFilter::allow_all())
}

/// Reads a value, invoking `filter` on the class name of every embedded
/// object before its fields are resolved.
pub fn decode_value_filtered(buf: &mut impl Buf, filter: &ClassFilter) -> Result<WireValue, CodecError> {
    match read_u8(buf)? {
        TAG_NULL => Ok(WireValue::Null),
        TAG_BOOL => Ok(WireValue::Bool(read_u8(buf)? != 0)),
        TAG_I32 => {
            if buf.remaining() < 4 {
                return Err(CodecError::Truncated { what: "i32" });
            }
            Ok(WireValue::I32(buf.get_i32()))
        }
        TAG_I64 => {
            if buf.remaining() < 8 {
                return Err(CodecError::Truncated { what: "i64" });
            }
            Ok(WireValue::I64(buf.get_i64()))
        }
        TAG_F64 => {
            if buf.remaining() < 8 {
                return Err(CodecError::Truncated { what: "f64" });
            }
            Ok(WireValue::F64(buf.get_f64()))
        }
        TAG_STR => Ok(WireValue::Str(read_string(buf)?)),
        TAG_BYTES => {
            let len = read_packed_u32(buf)? as usize;
            if buf.remaining() < len {
                return Err(CodecError::Truncated { what: "byte array" });
            }
            Ok(WireValue::Bytes(buf.copy_to_bytes(len)))
        }
        TAG_LIST => {
            let len = read_packed_u32(buf)?;
            let mut items = Vec::with_capacity(len as usize);
            for _ in 0..len {
                items.push(decode_value_filtered(buf, filter)?);
            }
            Ok(WireValue::List(items))
        }
        TAG_MAP => {
            let len = read_packed_u32(buf)?;
            let mut entries = Vec::with_capacity(len as usize);
            for _ in 0..len {
                let key = decode_value_filtered(buf, filter)?;
                let value = decode_value_filtered(buf, filter)?;
                entries.push((key, value));
            }
            Ok(WireValue::Map(entries))
        }
        TAG_OBJECT => Ok(WireValue::Object(Box::new(decode_typed_value(buf, filter)?))),
        other => Err(CodecError::UnknownTag(other)),
    }
}

/// Writes `class_name`, then a packed field count, then each `(name, value)`
/// pair in order.
pub fn encode_typed_value(buf: &mut impl BufMut, value: &TypedValue) {
    write_string(buf, &value.class_name);
    write_packed_u32(buf, value.fields.len() as u32);
    for (name, field_value) in &value.fields {
        write_string(buf, name);
        encode_value(buf, field_value);
    }
}

/// Reads a [`TypedValue`], invoking `filter` on the class name before
/// resolving the rest of the object: a rejected class name fails the read
/// before a single field is touched. Field values recurse with the same
/// filter, so an object nested anywhere in the graph cannot smuggle a
/// rejected class through.
pub fn decode_typed_value(buf: &mut impl Buf, filter: &ClassFilter) -> Result<TypedValue, CodecError> {
    let class_name = read_string(buf)?;
    if !filter.check(&class_name) {
        return Err(CodecError::ClassFiltered(class_name));
    }
    let field_count = read_packed_u32(buf)?;
    let mut fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        let name = read_string(buf)?;
        let value = decode_value_filtered(buf, filter)?;
        fields.push((name, value));
    }
    Ok(TypedValue { class_name, fields })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn round_trip_value(value: &WireValue) -> WireValue {
        let mut buf = BytesMut::new();
        encode_value(&mut buf, value);
        let mut cursor = buf.freeze();
        decode_value(&mut cursor).unwrap()
    }

    #[test]
    fn primitive_values_round_trip() {
        for value in [
            WireValue::Null,
            WireValue::Bool(true),
            WireValue::I32(-7),
            WireValue::I64(i64::MIN),
            WireValue::F64(1.5),
            WireValue::Str("hello".to_owned()),
            WireValue::Bytes(Bytes::from_static(b"raw")),
        ] {
            assert_eq!(round_trip_value(&value), value);
        }
    }

    #[test]
    fn nested_collections_round_trip() {
        let value = WireValue::List(vec![
            WireValue::Str("a".to_owned()),
            WireValue::Map(vec![(WireValue::Str("k".to_owned()), WireValue::I32(1))]),
        ]);
        assert_eq!(round_trip_value(&value), value);
    }

    #[test]
    fn frequently_sent_strings_use_the_token_table() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "jboss.source.address");
        assert_eq!(buf.len(), 2, "token reference should be a 2-byte marker + index");
    }

    #[test]
    fn object_values_round_trip_and_nested_classes_are_filtered() {
        let value = WireValue::Object(Box::new(TypedValue {
            class_name: "com.example.Order".to_owned(),
            fields: vec![(
                "line".to_owned(),
                WireValue::Object(Box::new(TypedValue {
                    class_name: "com.example.OrderLine".to_owned(),
                    fields: vec![("qty".to_owned(), WireValue::I32(2))],
                })),
            )],
        }));
        let mut buf = BytesMut::new();
        encode_value(&mut buf, &value);

        let mut cursor = buf.clone().freeze();
        assert_eq!(decode_value(&mut cursor).unwrap(), value);

        // The outer class passes but the nested one is rejected.
        let outer_only = ClassFilter::allow_list(["com.example.Order".to_owned()]);
        let mut cursor = buf.freeze();
        assert!(matches!(
            decode_value_filtered(&mut cursor, &outer_only),
            Err(CodecError::ClassFiltered(name)) if name == "com.example.OrderLine"
        ));
    }

    #[test]
    fn typed_value_round_trips_and_rejects_filtered_classes() {
        let value = TypedValue {
            class_name: "java.lang.String".to_owned(),
            fields: vec![("value".to_owned(), WireValue::Str("hello".to_owned()))],
        };
        let mut buf = BytesMut::new();
        encode_typed_value(&mut buf, &value);
        let mut cursor = buf.freeze();
        let decoded = decode_typed_value(&mut cursor, &ClassFilter::allow_all()).unwrap();
        assert_eq!(decoded, value);

        let mut cursor = {
            let mut buf = BytesMut::new();
            encode_typed_value(&mut buf, &value);
            buf.freeze()
        };
        let denied = ClassFilter::allow_list(["something.else".to_owned()]);
        assert!(matches!(decode_typed_value(&mut cursor, &denied), Err(CodecError::ClassFiltered(_))));
    }
}
