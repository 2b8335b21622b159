//! TC (Telecommand, CCSDS 232.0) transfer frame primary header, security
//! header/trailer, and bit-exact pack/unpack.

use crate::crc::CrcEngine;
use crate::error::ProtoError;
use crate::{FECF_SIZE, TC_PRIMARY_HEADER_SIZE};

/// TC primary header (5 octets):
/// `tfvn(2) | bypass(1) | cc(1) | spare(2) | scid(10) | vcid(6) | fl(10) | fsn(8)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcPrimaryHeader {
    /// Transfer Frame Version Number (2 bits).
    pub tfvn: u8,
    /// Bypass flag: 1 = frame goes to the Frame Acceptance Check bypass path.
    pub bypass: bool,
    /// Control Command flag: 1 = this is a control (CLCW-triggering) frame.
    pub cc: bool,
    /// Spacecraft ID (10 bits).
    pub scid: u16,
    /// Virtual Channel ID (6 bits).
    pub vcid: u8,
    /// Frame length minus one (10 bits): `fl + 1` is the total octet count.
    pub fl: u16,
    /// Frame sequence number.
    pub fsn: u8,
}

impl TcPrimaryHeader {
    /// Pack into the 5-octet wire representation.
    #[must_use]
    pub fn encode(&self) -> [u8; TC_PRIMARY_HEADER_SIZE] {
        let scid_hi = ((self.scid >> 8) & 0x03) as u8;
        let fl_hi = ((self.fl >> 8) & 0x03) as u8;
        let byte0 = (self.tfvn & 0x03) << 6
            | u8::from(self.bypass) << 5
            | u8::from(self.cc) << 4
            | scid_hi;
        let byte1 = (self.scid & 0xFF) as u8;
        let byte2 = (self.vcid & 0x3F) << 2 | fl_hi;
        let byte3 = (self.fl & 0xFF) as u8;
        [byte0, byte1, byte2, byte3, self.fsn]
    }

    /// Unpack from a 5-octet prefix, returning the header and the remainder
    /// of the buffer.
    pub fn decode(bytes: &[u8]) -> Result<(Self, &[u8]), ProtoError> {
        if bytes.len() < TC_PRIMARY_HEADER_SIZE {
            return Err(ProtoError::FrameTooShort {
                needed: TC_PRIMARY_HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        let (head, rest) = bytes.split_at(TC_PRIMARY_HEADER_SIZE);
        let tfvn = (head[0] >> 6) & 0x03;
        let bypass = (head[0] >> 5) & 0x01 != 0;
        let cc = (head[0] >> 4) & 0x01 != 0;
        let scid = (u16::from(head[0] & 0x03) << 8) | u16::from(head[1]);
        let vcid = (head[2] >> 2) & 0x3F;
        let fl = (u16::from(head[2] & 0x03) << 8) | u16::from(head[3]);
        let fsn = head[4];
        Ok((Self { tfvn, bypass, cc, scid, vcid, fl, fsn }, rest))
    }

    /// Total on-wire frame length in octets (`fl` is length-minus-one).
    #[must_use]
    pub fn total_len(&self) -> usize {
        usize::from(self.fl) + 1
    }
}

/// TC security header prefix: `sh(1) | spi(2)`. The IV/SN/pad fields that
/// follow are SA-policy-sized and decoded separately once the SA is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcSecurityPrefix {
    /// Security header flags octet.
    pub sh: u8,
    /// Security Parameter Index selecting the SA.
    pub spi: u16,
}

/// Width of the `sh | spi` prefix.
pub const TC_SEC_PREFIX_SIZE: usize = 3;

impl TcSecurityPrefix {
    /// Pack into 3 octets.
    #[must_use]
    pub fn encode(&self) -> [u8; TC_SEC_PREFIX_SIZE] {
        let spi = self.spi.to_be_bytes();
        [self.sh, spi[0], spi[1]]
    }

    /// Unpack from a 3-octet prefix, returning the value and the remainder.
    pub fn decode(bytes: &[u8]) -> Result<(Self, &[u8]), ProtoError> {
        if bytes.len() < TC_SEC_PREFIX_SIZE {
            return Err(ProtoError::FrameTooShort {
                needed: TC_SEC_PREFIX_SIZE,
                actual: bytes.len(),
            });
        }
        let (head, rest) = bytes.split_at(TC_SEC_PREFIX_SIZE);
        let spi = u16::from_be_bytes([head[1], head[2]]);
        Ok((Self { sh: head[0], spi }, rest))
    }
}

/// A fully decoded TC transfer frame (security-header/trailer lengths are
/// policy-dependent, so this is only constructible once the caller knows the
/// owning SA's field widths).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcFrame {
    /// Primary header.
    pub header: TcPrimaryHeader,
    /// Security header flags/SPI.
    pub sec_prefix: TcSecurityPrefix,
    /// Initialization vector field (width = SA's `shivf_len`).
    pub iv: Vec<u8>,
    /// Sequence number field (width = SA's `shsnf_len`).
    pub sn: Vec<u8>,
    /// Pad field (width = SA's `shplf_len`).
    pub pad: Vec<u8>,
    /// User data / PDU payload.
    pub pdu: Vec<u8>,
    /// Message authentication code (width = SA's `stmacf_len`).
    pub mac: Vec<u8>,
    /// Frame Error Control Field as received.
    pub fecf: u16,
}

/// Decode a TC frame given the SA-policy field widths that govern the
/// security header/trailer layout.
///
/// # Errors
///
/// Returns [`ProtoError::FrameTooShort`] if `bytes` is shorter than its
/// declared `fl`, or [`ProtoError::MalformedLength`] if the declared length
/// disagrees with the supplied buffer.
pub fn decode_tc(
    bytes: &[u8],
    shivf_len: usize,
    shsnf_len: usize,
    shplf_len: usize,
    stmacf_len: usize,
) -> Result<TcFrame, ProtoError> {
    let (header, rest) = TcPrimaryHeader::decode(bytes)?;
    let declared = header.total_len();
    if bytes.len() < declared {
        return Err(ProtoError::MalformedLength { claimed: declared, actual: bytes.len() });
    }
    let (sec_prefix, rest) = TcSecurityPrefix::decode(rest)?;

    let variable_len = shivf_len + shsnf_len + shplf_len + stmacf_len + FECF_SIZE;
    if rest.len() < variable_len {
        return Err(ProtoError::FrameTooShort { needed: variable_len, actual: rest.len() });
    }

    let (iv, rest) = rest.split_at(shivf_len);
    let (sn, rest) = rest.split_at(shsnf_len);
    let (pad, rest) = rest.split_at(shplf_len);
    let pdu_len = rest.len().saturating_sub(stmacf_len + FECF_SIZE);
    let (pdu, rest) = rest.split_at(pdu_len);
    let (mac, rest) = rest.split_at(stmacf_len);
    let fecf = u16::from_be_bytes([rest[0], rest[1]]);

    Ok(TcFrame {
        header,
        sec_prefix,
        iv: iv.to_vec(),
        sn: sn.to_vec(),
        pad: pad.to_vec(),
        pdu: pdu.to_vec(),
        mac: mac.to_vec(),
        fecf,
    })
}

/// Encode a TC frame: primary header, security header, PDU, MAC, and a
/// freshly computed FECF over everything preceding it.
///
/// `header.fl` is overwritten with the correct length-minus-one for the
/// assembled frame; the caller need not precompute it.
#[must_use]
pub fn encode_tc(
    mut header: TcPrimaryHeader,
    sec_prefix: TcSecurityPrefix,
    iv: &[u8],
    sn: &[u8],
    pad: &[u8],
    pdu: &[u8],
    mac: &[u8],
    crc: &CrcEngine,
) -> Vec<u8> {
    let body_len = TC_PRIMARY_HEADER_SIZE
        + TC_SEC_PREFIX_SIZE
        + iv.len()
        + sn.len()
        + pad.len()
        + pdu.len()
        + mac.len()
        + FECF_SIZE;
    header.fl = (body_len - 1) as u16;

    let mut out = Vec::with_capacity(body_len);
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(&sec_prefix.encode());
    out.extend_from_slice(iv);
    out.extend_from_slice(sn);
    out.extend_from_slice(pad);
    out.extend_from_slice(pdu);
    out.extend_from_slice(mac);
    let fecf = crc.crc16(&out);
    out.extend_from_slice(&fecf.to_be_bytes());
    out
}

/// Compute the FECF (CRC-16-CCITT) that would cover `frame_prefix` (the
/// frame bytes up to, but not including, the trailing FECF field).
#[must_use]
pub fn frame_error_control_compute(crc: &CrcEngine, frame_prefix: &[u8]) -> u16 {
    crc.crc16(frame_prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_header_roundtrip() {
        let hdr = TcPrimaryHeader {
            tfvn: 0,
            bypass: true,
            cc: false,
            scid: 0x123,
            vcid: 0x2A,
            fl: 0x321,
            fsn: 0xAB,
        };
        let encoded = hdr.encode();
        let (decoded, rest) = TcPrimaryHeader::decode(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, hdr);
    }

    #[test]
    fn decode_rejects_short_buffer() {
        let err = TcPrimaryHeader::decode(&[0u8; 4]).unwrap_err();
        assert_eq!(err, ProtoError::FrameTooShort { needed: 5, actual: 4 });
    }

    #[test]
    fn encode_decode_roundtrip_clear_mode() {
        let crc = CrcEngine::new();
        let hdr = TcPrimaryHeader { tfvn: 0, bypass: false, cc: false, scid: 0x01, vcid: 0, fl: 0, fsn: 3 };
        let sec = TcSecurityPrefix { sh: 0xFF, spi: 1 };
        let pdu = b"hello telecommand";
        let bytes = encode_tc(hdr, sec, &[], &[], &[], pdu, &[], &crc);
        let decoded = decode_tc(&bytes, 0, 0, 0, 0).unwrap();
        assert_eq!(decoded.pdu, pdu);
        assert_eq!(decoded.sec_prefix.spi, 1);
        let prefix_len = bytes.len() - FECF_SIZE;
        assert_eq!(decoded.fecf, crc.crc16(&bytes[..prefix_len]));
    }

    #[test]
    fn encode_decode_roundtrip_aead_mode() {
        let crc = CrcEngine::new();
        let hdr = TcPrimaryHeader { tfvn: 0, bypass: false, cc: false, scid: 0x44, vcid: 2, fl: 0, fsn: 9 };
        let sec = TcSecurityPrefix { sh: 0xFF, spi: 4 };
        let iv = [7u8; 12];
        let pdu = b"payload-bytes";
        let mac = [9u8; 16];
        let bytes = encode_tc(hdr, sec, &iv, &[], &[], pdu, &mac, &crc);
        let decoded = decode_tc(&bytes, 12, 0, 0, 16).unwrap();
        assert_eq!(decoded.iv, iv);
        assert_eq!(decoded.pdu, pdu);
        assert_eq!(decoded.mac, mac);
    }
}
