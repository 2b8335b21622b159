//! `Engine`: the single owning value for all process-wide state, and the
//! TC/TM `Apply`/`Process` pipelines that orchestrate `Sadb`, `KeyRing`,
//! `CryptoProvider`, and `AntiReplay`.

use tracing::{debug, info, warn};

use sdls_crypto::{AesGcmProvider, CryptoProvider};
use sdls_proto::ocf::{Clcw, Fsr};
use sdls_proto::sdls_pdu::SdlsFrame;
use sdls_proto::tc::{decode_tc, encode_tc, TcPrimaryHeader, TcSecurityPrefix};
use sdls_proto::tm::{encode_tm, is_idle_packet, TmPrimaryHeader, TM_IDLE_FHP, TM_IDLE_PREFIX};
use sdls_proto::crc::CrcEngine;
use sdls_proto::{FECF_SIZE, OCF_SIZE, TC_PRIMARY_HEADER_SIZE, TC_SEC_HEADER_PREFIX_SIZE};

use crate::anti_replay::{self, CompareResult, WindowResult};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::event_log::{EventId, EventLog};
use crate::key::KeyRing;
use crate::sa::{Sadb, SaState, SecurityAssociation, SPI_RESERVED_BROADCAST, SPI_RESERVED_ZERO};
use crate::sdls_interpreter::{self, InterpreterContext};

/// Test-mode toggles that corrupt the next emitted/received frame, used
/// only to drive the FSR-flag-raising scenarios of the test suite.
#[derive(Debug, Clone, Copy, Default)]
pub struct TestToggles {
    /// Increment the next TM frame's SPI field.
    pub bad_spi: bool,
    /// Increment the bound SA's IV last octet on the next TM frame.
    pub bad_iv: bool,
    /// Flip the last octet of the next TM frame's MAC.
    pub bad_mac: bool,
    /// Set `idle` forcibly on the next `tm_apply` call.
    pub idle_trigger: bool,
    /// `ModifyVCID`: switch the virtual channel `tm_apply` builds for.
    pub pending_vcid: Option<u8>,
    /// `ModifyActiveTM`: reserved; records the requested SPI without
    /// altering channel-binding lookup (mirrors the reference
    /// implementation's own unfinished handling of this command).
    pub pending_active_tm_spi: Option<u16>,
}

/// The spacecraft link-layer security engine: SADB, key ring, event log,
/// operational control field state, and the `CryptoProvider` collaborator,
/// consolidated into one owning value; no static/global storage.
pub struct Engine {
    config: EngineConfig,
    crc: CrcEngine,
    keys: KeyRing,
    sadb: Sadb,
    log: EventLog,
    crypto: Box<dyn CryptoProvider>,
    /// Frame Security Report, alternated into the OCF slot with `clcw`.
    pub report: Fsr,
    /// Communications Link Control Word, alternated into the OCF slot with `report`.
    pub clcw: Clcw,
    ocf_toggle: bool,
    tm_vcid: u8,
    tm_mcfc: u8,
    tm_vcfc: u8,
    toggles: TestToggles,
}

impl Engine {
    /// Initialize CRC tables, SADB/key-ring seed, and run the
    /// `CryptoProvider` self-test. A self-test failure is fatal: the
    /// engine refuses to operate.
    ///
    /// # Errors
    ///
    /// `CryptoProvider` error if the AEAD self-test fails.
    pub fn init(config: EngineConfig) -> Result<Self, EngineError> {
        let crypto: Box<dyn CryptoProvider> = Box::new(AesGcmProvider::default());
        crypto.self_test()?;

        let keys = config.build_key_ring();
        let sadb = config.build_sadb();
        let mut log = EventLog::new(config.log_size);
        log.push(EventId::Startup);
        log.push(EventId::Startup);

        info!(num_sa = sadb.len(), num_keys = keys.len(), "engine initialized");

        Ok(Self {
            config,
            crc: CrcEngine::new(),
            keys,
            sadb,
            log,
            crypto,
            report: Fsr { cwt: 1, vnum: 4, ..Fsr::default() },
            clcw: Clcw::default(),
            ocf_toggle: false,
            tm_vcid: 0,
            tm_mcfc: 0,
            tm_vcfc: 0,
            toggles: TestToggles::default(),
        })
    }

    /// Read-only access to the event log (for `DumpLog`/`LogStatus`).
    #[must_use]
    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    /// Mutable access to test-mode toggles (set by the `User` PDU handlers).
    pub fn toggles_mut(&mut self) -> &mut TestToggles {
        &mut self.toggles
    }

    /// Set the virtual channel `tm_apply` builds frames for (`ModifyVCID`).
    pub fn set_tm_vcid(&mut self, vcid: u8) {
        self.tm_vcid = vcid;
    }

    fn derive_aad(prefix: &[u8], sa: &SecurityAssociation) -> Vec<u8> {
        let len = usize::from(sa.config.abm_len).min(prefix.len()).min(crate::sa::ABM_SIZE);
        (0..len).map(|i| prefix[i] & sa.config.abm[i]).collect()
    }

    // ---- TC ApplySecurity --------------------------------------------------

    /// Insert a security header/trailer into a raw TC frame.
    ///
    /// # Errors
    ///
    /// `NoActiveSa` if no `Operational` SA is bound to the frame's VCID;
    /// `Policy` if a reserved (Authenticate-only/Encrypt-only) TC mode is
    /// selected; `CryptoProvider` on encryption failure.
    pub fn tc_apply(&mut self, bytes: &[u8]) -> Result<Vec<u8>, EngineError> {
        let (header, pdu) = TcPrimaryHeader::decode(bytes)?;
        if header.cc {
            debug!(vcid = header.vcid, "control frame passthrough");
            return Ok(bytes.to_vec());
        }

        let sa = self
            .sadb
            .find_operational_tc(self.config.scid, header.vcid)
            .cloned()
            .ok_or(EngineError::NoActiveSa)?;

        match sa.mode() {
            (false, false) => self.tc_apply_clear(header, &sa, pdu),
            (true, true) => self.tc_apply_aead(header, &sa, pdu),
            _ => Err(EngineError::Policy("reserved TC mode (authenticate-only/encrypt-only)".into())),
        }
    }

    fn tc_apply_clear(
        &self,
        header: TcPrimaryHeader,
        sa: &SecurityAssociation,
        pdu: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        let sec_prefix = TcSecurityPrefix { sh: 0xFF, spi: sa.spi };
        let pad = vec![0u8; usize::from(sa.config.shplf_len)];
        Ok(encode_tc(header, sec_prefix, &[], &[], &pad, pdu, &[], &self.crc))
    }

    fn tc_apply_aead(
        &mut self,
        header: TcPrimaryHeader,
        sa: &SecurityAssociation,
        pdu: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        let sec_prefix = TcSecurityPrefix { sh: 0xFF, spi: sa.spi };
        // The counter is advanced *before* it is used as the nonce, so the
        // transmitted IV is always one past the SA's last-sent value - the
        // same convention `tc_process_aead` expects on receipt (accepts
        // exactly `{sa.iv+1, ..., sa.iv+w}`).
        self.sadb.advance_iv(sa.spi)?;
        let iv = self.sadb.get(sa.spi)?.iv.clone();
        let sn = vec![0u8; usize::from(sa.config.shsnf_len)];
        let pad = vec![0u8; usize::from(sa.config.shplf_len)];

        let mut prefix = Vec::with_capacity(header.encode().len() + sec_prefix.encode().len() + iv.len() + sn.len() + pad.len());
        prefix.extend_from_slice(&header.encode());
        prefix.extend_from_slice(&sec_prefix.encode());
        prefix.extend_from_slice(&iv);
        prefix.extend_from_slice(&sn);
        prefix.extend_from_slice(&pad);
        let aad = Self::derive_aad(&prefix, sa);

        let key = self.keys.get(sa.ekid)?.value;
        let iv_arr: [u8; sdls_proto::IV_SIZE] = iv
            .clone()
            .try_into()
            .map_err(|_| EngineError::Policy("SA IV width is not IV_SIZE".into()))?;

        let (ciphertext, tag) = self.crypto.encrypt(&key, &iv_arr, &aad, pdu)?;
        Ok(encode_tc(header, sec_prefix, &iv, &sn, &pad, &ciphertext, &tag, &self.crc))
    }

    // ---- TC ProcessSecurity ------------------------------------------------

    /// Remove security header/trailer from a received TC frame and, if the
    /// decrypted payload carries an SDLS EP PDU, dispatch it and return the
    /// reply bytes. Returns an empty `Vec` for frames with no SDLS payload.
    ///
    /// # Errors
    ///
    /// `Policy` on an invalid/non-operational SPI; `Replay` on anti-replay
    /// rejection; `Fecf` on FECF mismatch (except the test-probe pattern,
    /// which is silently suppressed); `Mac` on GCM tag mismatch.
    pub fn tc_process(&mut self, bytes: &[u8]) -> Result<Vec<u8>, EngineError> {
        let (header, rest) = TcPrimaryHeader::decode(bytes)?;
        let (sec_prefix, _) = TcSecurityPrefix::decode(rest)?;
        let spi = sec_prefix.spi;

        let invalid_spi = spi == SPI_RESERVED_ZERO
            || spi == SPI_RESERVED_BROADCAST
            || usize::from(spi) >= self.sadb.len();
        if invalid_spi {
            self.report.ispif = true;
            self.report.lspiu = spi;
            self.log.push(EventId::SpiInvalid);
            return Err(EngineError::Policy(format!("spi {spi} is reserved or out of range")));
        }

        let sa = self.sadb.get(spi)?.clone();
        self.report.lspiu = spi;
        if sa.state != SaState::Operational {
            self.report.ispif = true;
            self.log.push(EventId::SpiInvalid);
            warn!(spi, ?sa.state, "frame references a non-operational SA");
            return Err(EngineError::Policy(format!("spi {spi} is not Operational")));
        }

        match sa.mode() {
            (false, false) => self.tc_process_clear(&header, &sa, bytes),
            (true, true) => self.tc_process_aead(&header, &sa, bytes),
            _ => Err(EngineError::Policy("reserved TC mode (authenticate-only/encrypt-only)".into())),
        }
    }

    fn verify_fecf(&mut self, header: &TcPrimaryHeader, bytes: &[u8]) -> Result<(), EngineError> {
        let total = header.total_len();
        if bytes.len() < total {
            return Err(EngineError::Framing(sdls_proto::ProtoError::MalformedLength {
                claimed: total,
                actual: bytes.len(),
            }));
        }
        let prefix = &bytes[..total - FECF_SIZE];
        let computed = self.crc.crc16(prefix);
        let received = u16::from_be_bytes([bytes[total - FECF_SIZE], bytes[total - 1]]);
        if computed == received {
            return Ok(());
        }
        let is_test_probe = bytes.len() > 20 && bytes[18] == 0x0B && bytes[19] == 0x00 && (bytes[20] & 0xF0) == 0x40;
        if is_test_probe {
            debug!("FECF mismatch suppressed: matches ESA test-probe pattern");
            return Ok(());
        }
        self.log.push(EventId::FecfErr);
        Err(EngineError::Fecf)
    }

    fn tc_process_clear(
        &mut self,
        header: &TcPrimaryHeader,
        sa: &SecurityAssociation,
        bytes: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        self.verify_fecf(header, bytes)?;
        let frame = decode_tc(
            bytes,
            usize::from(sa.config.shivf_len),
            usize::from(sa.config.shsnf_len),
            usize::from(sa.config.shplf_len),
            usize::from(sa.config.stmacf_len),
        )?;
        self.dispatch_if_sdls(sa.spi, &frame.pdu)
    }

    fn tc_process_aead(
        &mut self,
        header: &TcPrimaryHeader,
        sa: &SecurityAssociation,
        bytes: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        let frame = decode_tc(
            bytes,
            usize::from(sa.config.shivf_len),
            usize::from(sa.config.shsnf_len),
            usize::from(sa.config.shplf_len),
            usize::from(sa.config.stmacf_len),
        )?;

        if anti_replay::compare_le(&frame.iv, &sa.iv) == CompareResult::LessOrEqual {
            self.report.bsnf = true;
            self.log.push(EventId::IvReplayErr);
            return Err(EngineError::Replay(format!("spi {} iv already seen", sa.spi)));
        }
        if anti_replay::window(&frame.iv, &sa.iv, sa.window_width()) == WindowResult::OutOfWindow {
            self.report.bsnf = true;
            self.log.push(EventId::IvWindowErr);
            return Err(EngineError::Replay(format!("spi {} iv outside anti-replay window", sa.spi)));
        }

        self.verify_fecf(header, bytes)?;

        let prefix_len = TC_PRIMARY_HEADER_SIZE
            + TC_SEC_HEADER_PREFIX_SIZE
            + frame.iv.len()
            + frame.sn.len()
            + frame.pad.len();
        let aad = Self::derive_aad(&bytes[..prefix_len.min(bytes.len())], sa);

        let key = self.keys.get(sa.ekid)?.value;
        let iv_arr: [u8; sdls_proto::IV_SIZE] = frame
            .iv
            .clone()
            .try_into()
            .map_err(|_| EngineError::Policy("received IV width is not IV_SIZE".into()))?;
        let mac_arr: [u8; sdls_proto::MAC_SIZE] = frame
            .mac
            .clone()
            .try_into()
            .map_err(|_| EngineError::Policy("received MAC width is not MAC_SIZE".into()))?;

        let plaintext = match self.crypto.decrypt(&key, &iv_arr, &aad, &frame.pdu, &mac_arr) {
            Ok(p) => p,
            Err(_) => {
                self.report.bmacf = true;
                self.log.push(EventId::MacErr);
                return Err(EngineError::Mac);
            }
        };

        // On accept, sa.iv advances to the received value -
        // exactly the received counter, not one past it. The next frame's
        // accepted range is then `{frame.iv+1, ..., frame.iv+w}`, matching
        // `tc_apply_aead`'s increment-before-use convention on the sender side.
        self.sadb.set_iv_raw(sa.spi, &frame.iv)?;

        self.dispatch_if_sdls(sa.spi, &plaintext)
    }

    fn dispatch_if_sdls(&mut self, spi: u16, plaintext: &[u8]) -> Result<Vec<u8>, EngineError> {
        if !SdlsFrame::is_sdls_payload(plaintext) {
            return Ok(Vec::new());
        }
        let frame = SdlsFrame::decode(plaintext)?;
        let mut ctx = InterpreterContext {
            sadb: &mut self.sadb,
            keys: &mut self.keys,
            log: &mut self.log,
            report: &mut self.report,
            toggles: &mut self.toggles,
            crypto: self.crypto.as_ref(),
            source_spi: spi,
        };
        sdls_interpreter::dispatch(&mut ctx, &frame)
    }

    // ---- TM ApplySecurity -------------------------------------------------

    /// Build and secure the next TM frame carrying `packet`.
    ///
    /// # Errors
    ///
    /// `CryptoProvider` on encryption failure; `Policy` if no `Operational`
    /// SA is bound to the configured TM virtual channel.
    pub fn tm_apply(&mut self, packet: &[u8]) -> Result<Vec<u8>, EngineError> {
        if let Some(vcid) = self.toggles.pending_vcid.take() {
            self.tm_vcid = vcid;
        }

        let idle = self.toggles.idle_trigger || is_idle_packet(packet);
        self.toggles.idle_trigger = false;

        let (pdu, fhp) = if idle {
            (Vec::new(), TM_IDLE_FHP)
        } else {
            (self.rewrite_spp(packet), self.config.tm_offset)
        };

        self.tm_mcfc = self.tm_mcfc.wrapping_add(1);
        self.tm_vcfc = self.tm_vcfc.wrapping_add(1);

        let header = TmPrimaryHeader {
            tfvn: 0,
            scid: self.config.scid,
            vcid: self.tm_vcid,
            ocff: true,
            mcfc: self.tm_mcfc,
            vcfc: self.tm_vcfc,
            tfsh: false,
            sf: false,
            pof: false,
            slid: 0,
            fhp,
        };

        let ocf = self.next_ocf();

        let sa = self.sadb.find_operational_tc(self.config.scid, self.tm_vcid).cloned();

        let (security_header, out_pdu, mac) = match sa {
            Some(sa) if sa.mode() == (true, true) => {
                self.sadb.advance_iv(sa.spi)?;
                let mut iv = self.sadb.get(sa.spi)?.iv.clone();
                if self.toggles.bad_iv {
                    if let Some(last) = iv.last_mut() {
                        *last = last.wrapping_add(1);
                    }
                    self.toggles.bad_iv = false;
                }
                let key = self.keys.get(sa.ekid)?.value;
                let iv_arr: [u8; sdls_proto::IV_SIZE] = iv
                    .clone()
                    .try_into()
                    .map_err(|_| EngineError::Policy("SA IV width is not IV_SIZE".into()))?;
                let mut prefix = sa.spi.to_be_bytes().to_vec();
                prefix.extend_from_slice(&iv);
                let aad = Self::derive_aad(&prefix, &sa);
                let (ciphertext, mut tag) = self.crypto.encrypt(&key, &iv_arr, &aad, &pdu)?;
                if self.toggles.bad_mac {
                    if let Some(last) = tag.last_mut() {
                        *last ^= 0xFF;
                    }
                    self.toggles.bad_mac = false;
                }
                let mut sh = sa.spi.to_be_bytes().to_vec();
                sh.extend_from_slice(&iv);
                (sh, ciphertext, tag.to_vec())
            }
            Some(sa) => {
                let sh = sa.spi.to_be_bytes().to_vec();
                (sh, pdu, Vec::new())
            }
            None => (vec![0u8; 2], pdu, Vec::new()),
        };

        let mut spi_header = security_header;
        if self.toggles.bad_spi {
            if let Some(b) = spi_header.get_mut(1) {
                *b = b.wrapping_add(1);
            }
            self.toggles.bad_spi = false;
        }

        Ok(encode_tm(&header, &spi_header, &out_pdu, &mac, &ocf, &self.crc))
    }

    fn rewrite_spp(&self, packet: &[u8]) -> Vec<u8> {
        if packet.len() < 6 {
            return packet.to_vec();
        }
        let mut out = packet.to_vec();
        out[0] &= !0x08;
        out[2] = 0xFF;
        out[3] = 0xFF;
        let fecf = self.crc.crc16(&out);
        out.extend_from_slice(&fecf.to_be_bytes());
        out
    }

    fn next_ocf(&mut self) -> [u8; OCF_SIZE] {
        self.ocf_toggle = !self.ocf_toggle;
        if self.ocf_toggle {
            self.clcw.vci = self.tm_vcid;
            self.clcw.encode()
        } else {
            self.report.encode()
        }
    }

    // ---- Reserved no-ops (AOS is out of scope; TM processing is receive-side) ----

    /// Reserved: TM ingress processing is out of scope. Returns the input unchanged.
    pub fn tm_process(&mut self, bytes: &[u8]) -> Result<Vec<u8>, EngineError> {
        Ok(bytes.to_vec())
    }

    /// Reserved: AOS frame processing is out of scope. Returns the input unchanged.
    pub fn aos_apply(&mut self, bytes: &[u8]) -> Result<Vec<u8>, EngineError> {
        Ok(bytes.to_vec())
    }

    /// Reserved: AOS frame processing is out of scope. Returns the input unchanged.
    pub fn aos_process(&mut self, bytes: &[u8]) -> Result<Vec<u8>, EngineError> {
        Ok(bytes.to_vec())
    }
}
