//! Bit-exact wire formats for CCSDS TC/TM transfer frames and the SDLS
//! Extended Procedures PDU carried inside them.
//!
//! This crate owns byte layout only: packing, unpacking, and the CRC/FECF
//! tables. It has no notion of Security Associations, keys, or policy -
//! those live in `sdls-core`, which calls into this crate to turn frame
//! bytes into typed header/trailer values and back.

#![forbid(unsafe_code)]

pub mod crc;
pub mod error;
pub mod ocf;
pub mod sdls_pdu;
pub mod tc;
pub mod tm;

pub use error::ProtoError;

/// GCM nonce / frame IV width in octets.
pub const IV_SIZE: usize = 12;
/// GCM authentication tag width in octets.
pub const MAC_SIZE: usize = 16;
/// Width of the Operational Control Field.
pub const OCF_SIZE: usize = 4;
/// Width of the Frame Error Control Field.
pub const FECF_SIZE: usize = 2;
/// TC primary header width in octets.
pub const TC_PRIMARY_HEADER_SIZE: usize = 5;
/// TM primary header width in octets.
pub const TM_PRIMARY_HEADER_SIZE: usize = 6;
/// Security header segment-header + SPI prefix width (before IV/SN/pad).
pub const TC_SEC_HEADER_PREFIX_SIZE: usize = 1 + 2;

/// A `{tfvn, scid, vcid, mapid}` Global Virtual Channel Identifier binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Gvcid {
    /// Transfer Frame Version Number.
    pub tfvn: u8,
    /// Spacecraft ID.
    pub scid: u16,
    /// Virtual Channel ID.
    pub vcid: u8,
    /// MAP ID (channel-specific sub-address); `MAPID_TC`/`MAPID_TM` for whole-VC bindings.
    pub mapid: u8,
}

/// `mapid` value meaning "this binding covers the whole TC virtual channel".
pub const MAPID_TC: u8 = 0xFF;
/// `mapid` value meaning "this binding covers the whole TM virtual channel".
pub const MAPID_TM: u8 = 0xFF;
