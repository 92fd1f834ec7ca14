//! Attachment map framing: `packedInteger(size), then size × (key, value)`
//! when non-empty, else a single zero byte. Bean invoke responses always
//! include this framing, even when the map is empty.

use bytes::{Buf, BufMut};

use crate::filter::ClassFilter;
use crate::value::{decode_value_filtered, encode_value, WireValue};
use crate::varint::{read_packed_u32, write_packed_u32};
use crate::CodecError;

pub fn encode_attachments(buf: &mut impl BufMut, attachments: &[(String, WireValue)]) {
    write_packed_u32(buf, attachments.len() as u32);
    for (key, value) in attachments {
        encode_value(buf, &WireValue::Str(key.clone()));
        encode_value(buf, value);
    }
}

pub fn decode_attachments(buf: &mut impl Buf) -> Result<Vec<(String, WireValue)>, CodecError> {
    decode_attachments_filtered(buf, &ClassFilter::allow_all())
}

/// Reads an attachment map, applying `filter` to every class-named object
/// embedded in the attachment values.
pub fn decode_attachments_filtered(buf: &mut impl Buf, filter: &ClassFilter) -> Result<Vec<(String, WireValue)>, CodecError> {
    let count = read_packed_u32(buf)?;
    let mut attachments = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let key = match decode_value_filtered(buf, filter)? {
            WireValue::Str(key) => key,
            _ => return Err(CodecError::ExpectedString),
        };
        let value = decode_value_filtered(buf, filter)?;
        attachments.push((key, value));
    }
    Ok(attachments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TypedValue;
    use bytes::BytesMut;

    #[test]
    fn empty_attachments_are_a_single_zero_byte() {
        let mut buf = BytesMut::new();
        encode_attachments(&mut buf, &[]);
        assert_eq!(&buf[..], &[0]);
    }

    #[test]
    fn attachments_round_trip() {
        let attachments = vec![
            ("jboss.source.address".to_owned(), WireValue::Str("10.0.0.1".to_owned())),
            ("custom".to_owned(), WireValue::I32(42)),
        ];
        let mut buf = BytesMut::new();
        encode_attachments(&mut buf, &attachments);
        let mut cursor = buf.freeze();
        assert_eq!(decode_attachments(&mut cursor).unwrap(), attachments);
    }

    #[test]
    fn attachment_values_respect_the_class_filter() {
        let attachments = vec![(
            "handle".to_owned(),
            WireValue::Object(Box::new(TypedValue {
                class_name: "com.example.Handle".to_owned(),
                fields: vec![],
            })),
        )];
        let mut buf = BytesMut::new();
        encode_attachments(&mut buf, &attachments);
        let mut cursor = buf.freeze();
        let deny = ClassFilter::allow_list(["something.else".to_owned()]);
        assert!(matches!(
            decode_attachments_filtered(&mut cursor, &deny),
            Err(CodecError::ClassFiltered(_))
        ));
    }
}
