//! SDLS Extended Procedures PDU dispatch: decoded command PDUs route to
//! `KeyMgmt`/`SaMgmt`/`SecMc`/`User` handlers by exhaustive pattern match
//! over the tagged `{type, uf, sg, pid}` PDU header (modeled as a
//! tagged enum, not a virtual call).

pub mod key_mgmt;
pub mod sa_mgmt;
pub mod sec_mc;
pub mod user;

use tracing::warn;

use sdls_crypto::CryptoProvider;
use sdls_proto::sdls_pdu::{build_reply, SdlsFrame, SDLS_APP_ID};
use sdls_proto::ocf::Fsr;

use crate::engine::TestToggles;
use crate::error::EngineError;
use crate::event_log::EventLog;
use crate::key::KeyRing;
use crate::sa::Sadb;

/// Service group tag (`sg`, 2 bits) for CCSDS-defined (`uf=0`) commands.
pub const SG_KEY_MGMT: u8 = 0;
/// SA management service group.
pub const SG_SA_MGMT: u8 = 1;
/// Security monitoring/control service group.
pub const SG_SEC_MC: u8 = 2;

/// `KeyMgmt` procedure IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPid {
    /// Over-the-air rekey.
    Otar,
    /// Key lifecycle: `PreActive -> Active`.
    Activate,
    /// Key lifecycle: `Active -> Deactivated`.
    Deactivate,
    /// Challenge-response key verification.
    Verify,
    /// Key lifecycle: `Deactivated -> Destroyed`.
    Destroy,
    /// Report key states over a kid range.
    Inventory,
}

/// `SaMgmt` procedure IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaPid {
    /// `sa_create`.
    Create,
    /// `sa_delete`.
    Delete,
    /// `sa_set_arsnw`.
    SetArsnw,
    /// `sa_rekey`.
    Rekey,
    /// `sa_expire`.
    Expire,
    /// `sa_set_arsn`.
    SetArsn,
    /// `sa_start`.
    Start,
    /// `sa_stop`.
    Stop,
    /// Report the SA's current IV.
    ReadArsn,
    /// Report the SA's state and `lpid`.
    Status,
}

/// `SecMc` procedure IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McPid {
    /// Bare liveness check.
    Ping,
    /// Report `{num_se, rs}`.
    LogStatus,
    /// Dump all populated log blocks.
    DumpLog,
    /// Zero the log and reset counters.
    EraseLog,
    /// Run the `CryptoProvider` self-test and report the result.
    SelfTest,
    /// Clear the FSR's raised flags.
    ResetAlarm,
}

/// `User` (test/debug) procedure IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserPid {
    /// Force the next `tm_apply` call to emit an idle frame.
    IdleTrigger,
    /// Corrupt the next TM frame's SPI field.
    BadSpi,
    /// Corrupt the next TM frame's IV.
    BadIv,
    /// Corrupt the next TM frame's MAC.
    BadMac,
    /// Corrupt the next TM frame's FECF (reserved; not yet driven by the engine).
    BadFecf,
    /// Overwrite a session key's raw value directly (bypassing OTAR).
    ModifyKey,
    /// Reserved: toggle which SA services the active TM channel.
    ModifyActiveTm,
    /// Change the virtual channel `tm_apply` builds frames for.
    ModifyVcid,
}

/// Tagged dispatch target for a decoded EP command PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduOp {
    /// `sg=KeyMgmt` CCSDS-defined command.
    KeyMgmt(KeyPid),
    /// `sg=SaMgmt` CCSDS-defined command.
    SaMgmt(SaPid),
    /// `sg=SecMc` CCSDS-defined command.
    SecMc(McPid),
    /// `uf=1` user/test command.
    User(UserPid),
}

impl PduOp {
    /// Classify a decoded `{type, uf, sg, pid}` tag. Returns `None` for
    /// `type=1` (reply) PDUs or any unrecognized `sg`/`pid` combination.
    #[must_use]
    pub fn classify(pdu_type: u8, uf: u8, sg: u8, pid: u8) -> Option<Self> {
        if pdu_type == 1 {
            return None;
        }
        if uf == 1 {
            return Some(Self::User(match pid {
                0 => UserPid::IdleTrigger,
                1 => UserPid::BadSpi,
                2 => UserPid::BadIv,
                3 => UserPid::BadMac,
                4 => UserPid::BadFecf,
                5 => UserPid::ModifyKey,
                6 => UserPid::ModifyActiveTm,
                7 => UserPid::ModifyVcid,
                _ => return None,
            }));
        }
        match sg {
            SG_KEY_MGMT => Some(Self::KeyMgmt(match pid {
                0 => KeyPid::Otar,
                1 => KeyPid::Activate,
                2 => KeyPid::Deactivate,
                3 => KeyPid::Verify,
                4 => KeyPid::Destroy,
                5 => KeyPid::Inventory,
                _ => return None,
            })),
            SG_SA_MGMT => Some(Self::SaMgmt(match pid {
                0 => SaPid::Create,
                1 => SaPid::Delete,
                2 => SaPid::SetArsnw,
                3 => SaPid::Rekey,
                4 => SaPid::Expire,
                5 => SaPid::SetArsn,
                6 => SaPid::Start,
                7 => SaPid::Stop,
                8 => SaPid::ReadArsn,
                9 => SaPid::Status,
                _ => return None,
            })),
            SG_SEC_MC => Some(Self::SecMc(match pid {
                0 => McPid::Ping,
                1 => McPid::LogStatus,
                2 => McPid::DumpLog,
                3 => McPid::EraseLog,
                4 => McPid::SelfTest,
                5 => McPid::ResetAlarm,
                _ => return None,
            })),
            _ => None,
        }
    }
}

/// The mutable state every EP handler may touch, borrowed for the
/// duration of one `dispatch` call.
pub struct InterpreterContext<'a> {
    /// Security Association table.
    pub sadb: &'a mut Sadb,
    /// Key ring.
    pub keys: &'a mut KeyRing,
    /// Tamper/security event log.
    pub log: &'a mut EventLog,
    /// Frame Security Report (flags raised on failure).
    pub report: &'a mut Fsr,
    /// Test-mode toggles (`User` handlers write these; `tm_apply` reads them).
    pub toggles: &'a mut TestToggles,
    /// AEAD collaborator, needed by OTAR (unwrap) and Verify (challenge encrypt).
    pub crypto: &'a dyn CryptoProvider,
    /// SPI of the SA the command PDU arrived over.
    pub source_spi: u16,
}

/// Pack `{type, uf, sg, pid}` into the one-octet `lpid` value every command
/// handler stamps onto its target SA before state gating.
#[must_use]
pub fn pack_lpid(pdu_type: u8, uf: u8, sg: u8, pid: u8) -> u8 {
    (pdu_type & 0x01) << 7 | (uf & 0x01) << 6 | (sg & 0x03) << 4 | (pid & 0x0F)
}

/// Dispatch a decoded SDLS EP PDU to its handler and return the reply
/// frame bytes (empty for `type=1` replies, which are logged and dropped).
///
/// # Errors
///
/// Propagates whatever the selected handler returns.
pub fn dispatch(ctx: &mut InterpreterContext<'_>, frame: &SdlsFrame) -> Result<Vec<u8>, EngineError> {
    let pdu = &frame.pdu;
    let lpid = pack_lpid(pdu.pdu_type, pdu.uf, pdu.sg, pdu.pid);

    let Some(op) = PduOp::classify(pdu.pdu_type, pdu.uf, pdu.sg, pdu.pid) else {
        if pdu.pdu_type == 1 {
            warn!("unexpected inbound SDLS reply PDU; dropping");
            return Ok(Vec::new());
        }
        return Err(EngineError::Policy(format!(
            "unrecognized SDLS PDU tag type={} uf={} sg={} pid={}",
            pdu.pdu_type, pdu.uf, pdu.sg, pdu.pid
        )));
    };

    let reply_pdu = match op {
        PduOp::KeyMgmt(which) => key_mgmt::handle(ctx, which, lpid, &pdu.data)?,
        PduOp::SaMgmt(which) => sa_mgmt::handle(ctx, which, lpid, &pdu.data)?,
        PduOp::SecMc(which) => sec_mc::handle(ctx, which, lpid, &pdu.data)?,
        PduOp::User(which) => user::handle(ctx, which, lpid, &pdu.data)?,
    };

    Ok(build_reply(SDLS_APP_ID, pdu.sg, pdu.pid, reply_pdu).encode())
}
