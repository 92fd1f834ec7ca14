//! Typed value read/write, the packed-integer codec, the pre-shared token
//! table, and the class-name filter hook.
//!
//! What this crate fixes is the *order and number* of elements in a body
//! and the framing rules both peers must agree on byte-for-byte:
//! packed-integer encoding, the token table, and filtering.

mod attachments;
mod exception;
mod filter;
mod resolver;
mod token_table;
mod tx;
mod value;
mod varint;

pub use attachments::{decode_attachments, decode_attachments_filtered, encode_attachments};
pub use exception::{decode_exception, encode_exception};
pub use filter::ClassFilter;
pub use resolver::ObjectResolver;
pub use token_table::{token_at, token_index, TOKEN_TABLE_V1};
pub use tx::{decode_tx, encode_tx};
pub use value::{decode_typed_value, decode_value, decode_value_filtered, encode_typed_value, encode_value, TypedValue, WireValue};
pub use varint::{read_packed, read_packed_u32, write_packed, write_packed_u32, MAX_PACKED_VALUE};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("truncated {what} in body")]
    Truncated { what: &'static str },
    #[error("packed integer exceeds the protocol's 31-bit range")]
    PackedIntegerOverflow,
    #[error("unknown wire value tag {0}")]
    UnknownTag(u8),
    #[error("invalid utf-8 in wire string")]
    InvalidUtf8,
    #[error("token index {0} has no entry in the pre-shared token table")]
    UnknownToken(u8),
    #[error("class `{0}` rejected by the configured class filter")]
    ClassFiltered(String),
    #[error("expected a string-typed wire value")]
    ExpectedString,
}

impl From<CodecError> for hrpc_core::HrpcError {
    fn from(err: CodecError) -> Self {
        match &err {
            CodecError::ClassFiltered(class_name) => {
                hrpc_core::HrpcError::class_filtered().msg(format!("class `{class_name}` rejected by configured filter"))
            }
            other => hrpc_core::HrpcError::protocol_violation().msg(other.to_string()),
        }
    }
}
