//! Wire-format error types.

use thiserror::Error;

/// Errors raised while packing or unpacking CCSDS/SDLS wire structures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtoError {
    /// Buffer too short for the structure being parsed.
    #[error("frame too short: need at least {needed} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum required length.
        needed: usize,
        /// Actual buffer length.
        actual: usize,
    },

    /// Declared frame length (`fl`/packet length field) disagrees with the
    /// buffer actually supplied.
    #[error("malformed length: header claims {claimed}, buffer has {actual}")]
    MalformedLength {
        /// Length claimed by the header field.
        claimed: usize,
        /// Length of the buffer actually available.
        actual: usize,
    },

    /// FECF (CRC-16-CCITT trailer) did not match the computed value.
    #[error("FECF mismatch: computed {computed:#06x}, received {received:#06x}")]
    FecfMismatch {
        /// Value computed over the frame bytes.
        computed: u16,
        /// Value carried in the frame's trailer.
        received: u16,
    },

    /// A TLV PDU field (length, tag) is outside the bounds of its buffer.
    #[error("malformed PDU: {0}")]
    MalformedPdu(String),
}
