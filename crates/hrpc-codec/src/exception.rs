//! Exception body framing: a single serialized exception under
//! `application/x-wf-jbmar-exception`. The class name carries the error
//! kind's stable wire name so a peer can reconstruct the kind without
//! inferring it from the HTTP status alone, since several kinds share a
//! status code.

use bytes::{Buf, BufMut};
use hrpc_core::{ErrorKind, HrpcError};

use crate::filter::ClassFilter;
use crate::value::{decode_typed_value, encode_typed_value, TypedValue, WireValue};
use crate::CodecError;

pub fn encode_exception(buf: &mut impl BufMut, kind: ErrorKind, message: &str) {
    let typed = TypedValue {
        class_name: kind.wire_name().to_owned(),
        fields: vec![("message".to_owned(), WireValue::Str(message.to_owned()))],
    };
    encode_typed_value(buf, &typed);
}

pub fn decode_exception(buf: &mut impl Buf) -> Result<HrpcError, CodecError> {
    let typed = decode_typed_value(buf, &ClassFilter::allow_all())?;
    let kind = ErrorKind::from_wire_name(&typed.class_name).unwrap_or(ErrorKind::GenericApplicationException);
    let message = typed
        .fields
        .into_iter()
        .find_map(|(name, value)| match (name.as_str(), value) {
            ("message", WireValue::Str(message)) => Some(message),
            _ => None,
        })
        .unwrap_or_default();
    Ok(HrpcError::new_from_kind(kind, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn exception_round_trips_kind_and_message() {
        let mut buf = BytesMut::new();
        encode_exception(&mut buf, ErrorKind::NoSuchEjb, "no such bean: a/m/-/B");
        let mut cursor = buf.freeze();
        let err = decode_exception(&mut cursor).unwrap();
        assert_eq!(err.kind(), ErrorKind::NoSuchEjb);
        assert_eq!(err.msg, "no such bean: a/m/-/B");
    }
}
