//! SDLS Extended Procedures (EP) PDU: the CCSDS header + TLV envelope
//! carried inside a decrypted TC/TM payload once dispatched to the
//! interpreter in `sdls-core`.

use crate::error::ProtoError;

/// Width of the CCSDS primary header prefix used for SDLS EP PDUs.
pub const SDLS_CCSDS_HEADER_SIZE: usize = 6;
/// Width of the TLV PDU header (`type/uf/sg/pid` byte + 2-byte length).
pub const SDLS_TLV_HEADER_SIZE: usize = 3;
/// Combined header width; the fixed size of a reply carrying no payload
/// (e.g. an MC Ping reply).
pub const SDLS_REPLY_HEADER_SIZE: usize = SDLS_CCSDS_HEADER_SIZE + SDLS_TLV_HEADER_SIZE;
/// APID identifying an SDLS EP PDU embedded in a TC/TM payload. This is
/// the 11-bit Application Process ID field alone (`CcsdsHeader.app_id`'s
/// max is `0x7FF`), not the packed first header word: the reference
/// engine's `0x18 0x80` magic-byte test decodes to `appID = 0x080`
/// (`(0x18 & 0x07) << 8 | 0x80 = 0x080`).
pub const SDLS_APP_ID: u16 = 0x080;

/// CCSDS primary header prefix: `pvn(3) | type(1) | shdr(1) | appID(11) |
/// seq(2) | pktid(14) | pkt_length(16)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CcsdsHeader {
    /// Packet Version Number.
    pub pvn: u8,
    /// Packet type (0 = telemetry, 1 = telecommand).
    pub ptype: u8,
    /// Secondary header flag.
    pub shdr: u8,
    /// Application Process ID.
    pub app_id: u16,
    /// Sequence flags.
    pub seq: u8,
    /// Packet sequence count/name.
    pub pktid: u16,
    /// Packet data length field (CCSDS convention: length-of-data minus one).
    pub pkt_length: u16,
}

impl CcsdsHeader {
    /// Pack into the 6-octet wire representation.
    #[must_use]
    pub fn encode(&self) -> [u8; SDLS_CCSDS_HEADER_SIZE] {
        let b0 = (self.pvn & 0x07) << 5 | (self.ptype & 0x01) << 4 | (self.shdr & 0x01) << 3
            | ((self.app_id >> 8) & 0x07) as u8;
        let b1 = (self.app_id & 0xFF) as u8;
        let b2 = (self.seq & 0x03) << 6 | ((self.pktid >> 8) & 0x3F) as u8;
        let b3 = (self.pktid & 0xFF) as u8;
        let b4 = (self.pkt_length >> 8) as u8;
        let b5 = (self.pkt_length & 0xFF) as u8;
        [b0, b1, b2, b3, b4, b5]
    }

    /// Unpack from a 6-octet prefix, returning the header and remainder.
    pub fn decode(bytes: &[u8]) -> Result<(Self, &[u8]), ProtoError> {
        if bytes.len() < SDLS_CCSDS_HEADER_SIZE {
            return Err(ProtoError::FrameTooShort {
                needed: SDLS_CCSDS_HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        let (head, rest) = bytes.split_at(SDLS_CCSDS_HEADER_SIZE);
        let pvn = (head[0] >> 5) & 0x07;
        let ptype = (head[0] >> 4) & 0x01;
        let shdr = (head[0] >> 3) & 0x01;
        let app_id = (u16::from(head[0] & 0x07) << 8) | u16::from(head[1]);
        let seq = (head[2] >> 6) & 0x03;
        let pktid = (u16::from(head[2] & 0x3F) << 8) | u16::from(head[3]);
        let pkt_length = (u16::from(head[4]) << 8) | u16::from(head[5]);
        Ok((Self { pvn, ptype, shdr, app_id, seq, pktid, pkt_length }, rest))
    }
}

/// TLV SDLS EP PDU: `type(1) | uf(1) | sg(2) | pid(4)` packed in one octet,
/// followed by a 2-octet length and `data[pdu_len]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TlvPdu {
    /// PDU type: 0 = command, 1 = reply.
    pub pdu_type: u8,
    /// User flag: 0 = CCSDS-defined command, 1 = user/test command.
    pub uf: u8,
    /// Service group (`KeyMgmt`/`SaMgmt`/`SecMc`, encoded 2 bits).
    pub sg: u8,
    /// Procedure ID within the service group (4 bits).
    pub pid: u8,
    /// Declared payload length.
    pub pdu_len: u16,
    /// Payload bytes.
    pub data: Vec<u8>,
}

impl TlvPdu {
    /// Pack the TLV header + data.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let tag = (self.pdu_type & 0x01) << 7 | (self.uf & 0x01) << 6 | (self.sg & 0x03) << 4 | (self.pid & 0x0F);
        let len = self.data.len() as u16;
        let mut out = Vec::with_capacity(SDLS_TLV_HEADER_SIZE + self.data.len());
        out.push(tag);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    /// Unpack a TLV PDU from `bytes`; `bytes` must contain exactly the TLV
    /// header followed by `pdu_len` octets of data (trailing bytes, if any,
    /// are ignored - callers slice the frame PDU to size beforehand).
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtoError> {
        if bytes.len() < SDLS_TLV_HEADER_SIZE {
            return Err(ProtoError::FrameTooShort {
                needed: SDLS_TLV_HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        let tag = bytes[0];
        let pdu_len = (u16::from(bytes[1]) << 8) | u16::from(bytes[2]);
        let data = &bytes[SDLS_TLV_HEADER_SIZE..];
        if data.len() < usize::from(pdu_len) {
            return Err(ProtoError::MalformedPdu(format!(
                "declared pdu_len {pdu_len} exceeds available {} bytes",
                data.len()
            )));
        }
        Ok(Self {
            pdu_type: (tag >> 7) & 0x01,
            uf: (tag >> 6) & 0x01,
            sg: (tag >> 4) & 0x03,
            pid: tag & 0x0F,
            pdu_len,
            data: data[..usize::from(pdu_len)].to_vec(),
        })
    }
}

/// A decoded SDLS EP PDU: CCSDS header + TLV envelope. The distilled design
/// also allows for an optional PUS secondary header between the two, but
/// the reference engine never populates one, so it is carried opaquely and
/// unused on this engine's command paths.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SdlsFrame {
    /// CCSDS primary header.
    pub header: CcsdsHeader,
    /// Optional PUS secondary header bytes, verbatim (reserved; unused by
    /// any procedure this engine implements).
    pub pus_header: Option<Vec<u8>>,
    /// TLV procedure PDU.
    pub pdu: TlvPdu,
}

impl SdlsFrame {
    /// Decode a full SDLS EP PDU (CCSDS header + TLV envelope, no PUS
    /// header) from a decrypted TC/TM payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtoError> {
        let (header, rest) = CcsdsHeader::decode(bytes)?;
        let pdu = TlvPdu::decode(rest)?;
        Ok(Self { header, pus_header: None, pdu })
    }

    /// Encode CCSDS header + TLV envelope, keeping `pkt_length` consistent
    /// with the assembled PDU (`pdu_len + SDLS_TLV_HEADER_SIZE`, the CCSDS
    /// convention used throughout the reference reply-framing code).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SDLS_CCSDS_HEADER_SIZE + SDLS_TLV_HEADER_SIZE + self.pdu.data.len());
        out.extend_from_slice(&self.header.encode());
        out.extend_from_slice(&self.pdu.encode());
        out
    }

    /// Whether `payload` begins with the SDLS application ID, i.e. should
    /// be handed to the interpreter rather than passed through as plain
    /// CCSDS telemetry/telecommand.
    #[must_use]
    pub fn is_sdls_payload(payload: &[u8]) -> bool {
        match CcsdsHeader::decode(payload) {
            Ok((hdr, _)) => hdr.app_id == SDLS_APP_ID,
            Err(_) => false,
        }
    }
}

/// Build a bare reply frame carrying `pdu_data` for the given
/// `{type,uf,sg,pid}` reply tag, with `pkt_length` set per CCSDS convention.
#[must_use]
pub fn build_reply(app_id: u16, sg: u8, pid: u8, pdu_data: Vec<u8>) -> SdlsFrame {
    let pdu_len = pdu_data.len() as u16;
    let header = CcsdsHeader {
        pvn: 0,
        ptype: 0,
        shdr: 1,
        app_id,
        seq: 3,
        pktid: 0,
        pkt_length: pdu_len + SDLS_TLV_HEADER_SIZE as u16,
    };
    let pdu = TlvPdu { pdu_type: 1, uf: 0, sg, pid, pdu_len, data: pdu_data };
    SdlsFrame { header, pus_header: None, pdu }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ccsds_header_roundtrip() {
        let hdr = CcsdsHeader { pvn: 0, ptype: 1, shdr: 1, app_id: SDLS_APP_ID, seq: 3, pktid: 0x2AB, pkt_length: 42 };
        let encoded = hdr.encode();
        let (decoded, rest) = CcsdsHeader::decode(&encoded).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, hdr);
    }

    #[test]
    fn sdls_frame_roundtrip() {
        let frame = build_reply(SDLS_APP_ID, 0b0010, 0x0, vec![1, 2, 3, 4]);
        let bytes = frame.encode();
        let decoded = SdlsFrame::decode(&bytes).unwrap();
        assert_eq!(decoded.pdu.data, vec![1, 2, 3, 4]);
        assert_eq!(decoded.header.app_id, SDLS_APP_ID);
    }

    #[test]
    fn empty_reply_is_nine_bytes() {
        let frame = build_reply(SDLS_APP_ID, 0b0100, 0x0, Vec::new());
        assert_eq!(frame.encode().len(), SDLS_REPLY_HEADER_SIZE);
    }

    #[test]
    fn is_sdls_payload_detects_app_id() {
        let frame = build_reply(SDLS_APP_ID, 0, 0, vec![]);
        assert!(SdlsFrame::is_sdls_payload(&frame.encode()));
        assert!(!SdlsFrame::is_sdls_payload(&[0u8; 6]));
    }
}
