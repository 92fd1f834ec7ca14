//! Transaction field encoding: `byte type` then, for types 1 and 2,
//! `int32 formatId, int32 gidLen, gidLen bytes, int32 bqLen, bqLen bytes`;
//! type 2 carries an additional `int32 remainingTimeSeconds`.

use bytes::{Buf, BufMut};
use hrpc_core::{TransactionInfo, Xid};

use crate::CodecError;

pub fn encode_tx(buf: &mut impl BufMut, tx: &TransactionInfo) {
    buf.put_u8(tx.tag());
    match tx {
        TransactionInfo::None => {}
        TransactionInfo::Remote(xid) => encode_xid(buf, xid),
        TransactionInfo::Local { xid, remaining_time_seconds } => {
            encode_xid(buf, xid);
            buf.put_i32(*remaining_time_seconds);
        }
    }
}

fn encode_xid(buf: &mut impl BufMut, xid: &Xid) {
    buf.put_i32(xid.format_id);
    buf.put_i32(xid.global_id.len() as i32);
    buf.put_slice(&xid.global_id);
    buf.put_i32(xid.branch_qualifier.len() as i32);
    buf.put_slice(&xid.branch_qualifier);
}

pub fn decode_tx(buf: &mut impl Buf) -> Result<TransactionInfo, CodecError> {
    let tag = read_u8(buf)?;
    match tag {
        0 => Ok(TransactionInfo::None),
        1 => Ok(TransactionInfo::Remote(decode_xid(buf)?)),
        2 => {
            let xid = decode_xid(buf)?;
            let remaining_time_seconds = read_i32(buf)?;
            Ok(TransactionInfo::Local { xid, remaining_time_seconds })
        }
        other => Err(CodecError::UnknownTag(other)),
    }
}

fn decode_xid(buf: &mut impl Buf) -> Result<Xid, CodecError> {
    let format_id = read_i32(buf)?;
    let global_id = read_len_prefixed_bytes(buf)?;
    let branch_qualifier = read_len_prefixed_bytes(buf)?;
    Ok(Xid { format_id, global_id, branch_qualifier })
}

fn read_u8(buf: &mut impl Buf) -> Result<u8, CodecError> {
    if !buf.has_remaining() {
        return Err(CodecError::Truncated { what: "transaction tag" });
    }
    Ok(buf.get_u8())
}

fn read_i32(buf: &mut impl Buf) -> Result<i32, CodecError> {
    if buf.remaining() < 4 {
        return Err(CodecError::Truncated { what: "i32" });
    }
    Ok(buf.get_i32())
}

fn read_len_prefixed_bytes(buf: &mut impl Buf) -> Result<Vec<u8>, CodecError> {
    let len = read_i32(buf)?;
    let len = usize::try_from(len).map_err(|_| CodecError::PackedIntegerOverflow)?;
    if buf.remaining() < len {
        return Err(CodecError::Truncated { what: "xid component" });
    }
    Ok(buf.copy_to_bytes(len).to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn round_trip(tx: &TransactionInfo) -> TransactionInfo {
        let mut buf = BytesMut::new();
        encode_tx(&mut buf, tx);
        let mut cursor = buf.freeze();
        decode_tx(&mut cursor).unwrap()
    }

    #[test]
    fn none_round_trips_as_a_single_tag_byte() {
        let mut buf = BytesMut::new();
        encode_tx(&mut buf, &TransactionInfo::None);
        assert_eq!(&buf[..], &[0]);
        assert_eq!(round_trip(&TransactionInfo::None), TransactionInfo::None);
    }

    #[test]
    fn remote_and_local_round_trip() {
        let xid = Xid {
            format_id: 7,
            global_id: vec![1, 2, 3],
            branch_qualifier: vec![4, 5],
        };
        let remote = TransactionInfo::Remote(xid.clone());
        assert_eq!(round_trip(&remote), remote);

        let local = TransactionInfo::Local { xid, remaining_time_seconds: 30 };
        assert_eq!(round_trip(&local), local);
    }
}
