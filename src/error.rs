use std::io::Error as IoError;
use thiserror::Error;

/// An ORP `Result`, conveniently wrapping the [OrpError].
pub type Result<T> = std::result::Result<T, OrpError>;

#[derive(Error, Debug)]
/// Error types which can occur while framing, decoding, or transporting ORP messages.
pub enum OrpError {
    #[error("I/O error on the ORP transport")]
    Io(#[from] IoError),

    #[error("HDLC framing error: escape byte followed by FLAG or ESC")]
    Framing,

    #[error("HDLC CRC mismatch: expected {expected:#06X}, computed {computed:#06X}")]
    CrcMismatch { expected: u16, computed: u16 },

    #[error("decoded packet of {got} bytes exceeds receive buffer of {max} bytes")]
    BufferOverflow { got: usize, max: usize },

    #[error("unknown ORP packet-type byte {0:#04X}")]
    UnknownPacketType(u8),

    #[error("unknown ORP data-type byte {0:#04X}")]
    UnknownDataType(u8),

    #[error("unknown ORP variable-field identifier {0:#04X}")]
    UnknownField(u8),

    #[error("malformed ORP timestamp field")]
    MalformedTimestamp,

    #[error("required field missing for this packet type: {0}")]
    MissingField(&'static str),

    #[error("field {field} of {len} bytes exceeds the {max} byte limit")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("packet too short to contain a valid ORP header")]
    ShortPacket,

    #[error("malformed decimal integer in field {0}")]
    MalformedInteger(&'static str),

    #[error("status {0} out of the -22..=0 range the wire encoding supports")]
    StatusOutOfRange(i32),
}
