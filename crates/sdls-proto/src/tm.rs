//! TM (Telemetry, CCSDS 132.0) transfer frame primary header and bit-exact
//! pack/unpack. TM frames are fixed-size (`TM_FILL_SIZE`); any octet beyond
//! populated data is zero-filled.

use crate::crc::CrcEngine;
use crate::error::ProtoError;
use crate::{FECF_SIZE, MAC_SIZE, OCF_SIZE, TM_PRIMARY_HEADER_SIZE};

/// Fixed total size of an emitted TM frame.
pub const TM_FILL_SIZE: usize = 1024;
/// SPP prefix marking an idle frame.
pub const TM_IDLE_PREFIX: [u8; 2] = [0x08, 0x90];
/// `fhp` value written into idle frames.
pub const TM_IDLE_FHP: u16 = 0xFE;

/// TM primary header (6 octets) per CCSDS 132.0-B-3 §4.1.2:
/// `tfvn(2) | scid(10) | vcid(3) | ocff(1) | mcfc(8) | vcfc(8) | tfsh(1) | sf(1) | pof(1) | slid(2) | fhp(11)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TmPrimaryHeader {
    /// Transfer Frame Version Number.
    pub tfvn: u8,
    /// Spacecraft ID.
    pub scid: u16,
    /// Virtual Channel ID.
    pub vcid: u8,
    /// OCF presence flag.
    pub ocff: bool,
    /// Master Channel Frame Count.
    pub mcfc: u8,
    /// Virtual Channel Frame Count.
    pub vcfc: u8,
    /// Transfer Frame Secondary Header flag.
    pub tfsh: bool,
    /// Synchronization flag.
    pub sf: bool,
    /// Packet Order flag.
    pub pof: bool,
    /// Segment Length ID.
    pub slid: u8,
    /// First Header Pointer (`0xFE` marks an idle frame).
    pub fhp: u16,
}

impl TmPrimaryHeader {
    /// Pack into the 6-octet wire representation (48-bit MSB-first field
    /// sequence, per the layout documented on this type).
    #[must_use]
    pub fn encode(&self) -> [u8; TM_PRIMARY_HEADER_SIZE] {
        let mut acc: u64 = 0;
        acc = (acc << 2) | u64::from(self.tfvn & 0x03);
        acc = (acc << 10) | u64::from(self.scid & 0x3FF);
        acc = (acc << 3) | u64::from(self.vcid & 0x07);
        acc = (acc << 1) | u64::from(self.ocff);
        acc = (acc << 8) | u64::from(self.mcfc);
        acc = (acc << 8) | u64::from(self.vcfc);
        acc = (acc << 1) | u64::from(self.tfsh);
        acc = (acc << 1) | u64::from(self.sf);
        acc = (acc << 1) | u64::from(self.pof);
        acc = (acc << 2) | u64::from(self.slid & 0x03);
        acc = (acc << 11) | u64::from(self.fhp & 0x7FF);
        let bytes = acc.to_be_bytes();
        [bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]]
    }

    /// Unpack from a 6-octet prefix, returning the header and remainder.
    pub fn decode(bytes: &[u8]) -> Result<(Self, &[u8]), ProtoError> {
        if bytes.len() < TM_PRIMARY_HEADER_SIZE {
            return Err(ProtoError::FrameTooShort {
                needed: TM_PRIMARY_HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        let (head, rest) = bytes.split_at(TM_PRIMARY_HEADER_SIZE);
        let mut padded = [0u8; 8];
        padded[2..8].copy_from_slice(head);
        let mut acc = u64::from_be_bytes(padded);

        let fhp = (acc & 0x7FF) as u16;
        acc >>= 11;
        let slid = (acc & 0x03) as u8;
        acc >>= 2;
        let pof = acc & 1 != 0;
        acc >>= 1;
        let sf = acc & 1 != 0;
        acc >>= 1;
        let tfsh = acc & 1 != 0;
        acc >>= 1;
        let vcfc = (acc & 0xFF) as u8;
        acc >>= 8;
        let mcfc = (acc & 0xFF) as u8;
        acc >>= 8;
        let ocff = acc & 1 != 0;
        acc >>= 1;
        let vcid = (acc & 0x07) as u8;
        acc >>= 3;
        let scid = (acc & 0x3FF) as u16;
        acc >>= 10;
        let tfvn = (acc & 0x03) as u8;

        Ok((Self { tfvn, scid, vcid, ocff, mcfc, vcfc, tfsh, sf, pof, slid, fhp }, rest))
    }
}

/// Assemble a complete, fixed-size TM frame.
///
/// `security_header` is `spi(2) | iv[..]` for AEAD SAs, or a fixed 2-octet
/// pad for Clear-mode SAs. `mac` is
/// zero-length for Clear mode. The buffer is zero-padded to
/// [`TM_FILL_SIZE`] and the FECF is computed over everything preceding it.
#[must_use]
pub fn encode_tm(
    header: &TmPrimaryHeader,
    security_header: &[u8],
    pdu: &[u8],
    mac: &[u8],
    ocf: &[u8; OCF_SIZE],
    crc: &CrcEngine,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(TM_FILL_SIZE);
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(security_header);
    out.extend_from_slice(pdu);
    out.extend_from_slice(mac);
    out.extend_from_slice(ocf);

    let used_before_fecf = out.len() + FECF_SIZE;
    if used_before_fecf < TM_FILL_SIZE {
        out.resize(TM_FILL_SIZE - FECF_SIZE, 0);
    }
    let fecf = crc.crc16(&out);
    out.extend_from_slice(&fecf.to_be_bytes());
    out
}

/// Decoded TM frame trailer (fixed widths: MAC is SA-policy-sized, OCF and
/// FECF are fixed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TmTrailer {
    /// Operational Control Field (CLCW or FSR, selected by the alternating toggle).
    pub ocf: [u8; OCF_SIZE],
    /// Frame Error Control Field as received.
    pub fecf: u16,
}

/// Split the trailing `mac[stmacf_len] | ocf[4] | fecf(2)` off the tail of a
/// populated (non-fill) TM frame body.
///
/// # Errors
///
/// [`ProtoError::FrameTooShort`] if `body` is narrower than the trailer.
pub fn split_tm_trailer(body: &[u8], stmacf_len: usize) -> Result<(&[u8], &[u8], TmTrailer), ProtoError> {
    let trailer_len = stmacf_len + OCF_SIZE + FECF_SIZE;
    if body.len() < trailer_len {
        return Err(ProtoError::FrameTooShort { needed: trailer_len, actual: body.len() });
    }
    let pdu_end = body.len() - trailer_len;
    let (pdu, rest) = body.split_at(pdu_end);
    let (mac, rest) = rest.split_at(stmacf_len);
    let (ocf_bytes, fecf_bytes) = rest.split_at(OCF_SIZE);
    let mut ocf = [0u8; OCF_SIZE];
    ocf.copy_from_slice(ocf_bytes);
    let fecf = u16::from_be_bytes([fecf_bytes[0], fecf_bytes[1]]);
    Ok((pdu, mac, TmTrailer { ocf, fecf }))
}

/// Whether `packet` carries the SPP idle-frame prefix `08 90`.
#[must_use]
pub fn is_idle_packet(packet: &[u8]) -> bool {
    packet.len() >= 2 && packet[0..2] == TM_IDLE_PREFIX
}
