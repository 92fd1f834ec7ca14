//! Packed-integer encoding: little-endian base-128 varint.
//!
//! Used for attachment counts on bean invoke bodies, and reused here for
//! every other length/count field so one routine covers all of them.

use bytes::{Buf, BufMut};

use crate::CodecError;

/// Bean invoke bodies only ever pack non-negative integers up to 2^31-1;
/// anything larger than this is a framing bug, not a legitimate wire value.
pub const MAX_PACKED_VALUE: u64 = (1u64 << 31) - 1;

pub fn write_packed(buf: &mut impl BufMut, value: u64) {
    let mut remaining = value;
    loop {
        if remaining >= 0x80 {
            buf.put_u8((remaining as u8 & 0x7f) | 0x80);
            remaining >>= 7;
        } else {
            buf.put_u8(remaining as u8);
            break;
        }
    }
}

pub fn read_packed(buf: &mut impl Buf) -> Result<u64, CodecError> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        if !buf.has_remaining() {
            return Err(CodecError::Truncated { what: "packed integer" });
        }
        let byte = buf.get_u8();
        if shift >= 64 {
            return Err(CodecError::PackedIntegerOverflow);
        }
        result |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

/// Writes a packed integer known to fit the protocol's 31-bit range,
/// validating the precondition in debug builds rather than silently
/// truncating on release.
pub fn write_packed_u32(buf: &mut impl BufMut, value: u32) {
    debug_assert!(u64::from(value) <= MAX_PACKED_VALUE);
    write_packed(buf, u64::from(value));
}

pub fn read_packed_u32(buf: &mut impl Buf) -> Result<u32, CodecError> {
    let value = read_packed(buf)?;
    u32::try_from(value).map_err(|_| CodecError::PackedIntegerOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn round_trip(value: u64) -> u64 {
        let mut buf = BytesMut::new();
        write_packed(&mut buf, value);
        let mut cursor = buf.freeze();
        read_packed(&mut cursor).unwrap()
    }

    #[test]
    fn zero_is_a_single_byte() {
        let mut buf = BytesMut::new();
        write_packed(&mut buf, 0);
        assert_eq!(&buf[..], &[0]);
    }

    #[test]
    fn bijection_holds_across_the_protocol_range() {
        for value in [0u64, 1, 127, 128, 129, 16_383, 16_384, MAX_PACKED_VALUE] {
            assert_eq!(round_trip(value), value);
        }
    }

    #[test]
    fn continuation_bit_set_exactly_for_values_above_127() {
        let mut buf = BytesMut::new();
        write_packed(&mut buf, 127);
        assert_eq!(buf.len(), 1);

        let mut buf = BytesMut::new();
        write_packed(&mut buf, 128);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf[0] & 0x80, 0x80);
    }

    #[test]
    fn truncated_input_is_rejected() {
        let mut cursor = bytes::Bytes::from_static(&[0x80]);
        assert!(matches!(read_packed(&mut cursor), Err(CodecError::Truncated { .. })));
    }
}
