//! `SecMc` EP procedures: security monitoring/control over the event log
//! and `CryptoProvider` health.

use crate::error::EngineError;

use super::{InterpreterContext, McPid};

/// Dispatch one `SecMc` procedure.
pub fn handle(
    ctx: &mut InterpreterContext<'_>,
    which: McPid,
    _lpid: u8,
    _data: &[u8],
) -> Result<Vec<u8>, EngineError> {
    match which {
        McPid::Ping => ping(),
        McPid::LogStatus => log_status(ctx),
        McPid::DumpLog => dump_log(ctx),
        McPid::EraseLog => erase_log(ctx),
        McPid::SelfTest => self_test(ctx),
        McPid::ResetAlarm => reset_alarm(ctx),
    }
}

/// `Ping`: bare liveness check, empty reply payload (a 9-byte total reply:
/// the 6-byte CCSDS header plus the 3-byte TLV header).
fn ping() -> Result<Vec<u8>, EngineError> {
    Ok(Vec::new())
}

/// `LogStatus`: `{ num_se(1), rs(1) }`, both saturating to `u8`.
fn log_status(ctx: &mut InterpreterContext<'_>) -> Result<Vec<u8>, EngineError> {
    let num_se = u8::try_from(ctx.log.num_se()).unwrap_or(u8::MAX);
    let rs = u8::try_from(ctx.log.remaining_slots()).unwrap_or(u8::MAX);
    Ok(vec![num_se, rs])
}

/// `DumpLog`: concatenation of `{ emt(1), em_len(1), emv[EMV_SIZE] }` for
/// every populated entry.
fn dump_log(ctx: &mut InterpreterContext<'_>) -> Result<Vec<u8>, EngineError> {
    let mut reply = Vec::new();
    for block in ctx.log.entries() {
        reply.push(block.emt.code());
        reply.push(block.em_len);
        reply.extend_from_slice(&block.emv);
    }
    Ok(reply)
}

/// `EraseLog`: zero the ring, reset counters, reply with empty status.
fn erase_log(ctx: &mut InterpreterContext<'_>) -> Result<Vec<u8>, EngineError> {
    ctx.log.erase();
    Ok(Vec::new())
}

/// `SelfTest`: run the `CryptoProvider` self-test, reply `{ result(1)=OK }`.
fn self_test(ctx: &mut InterpreterContext<'_>) -> Result<Vec<u8>, EngineError> {
    let result = u8::from(ctx.crypto.self_test().is_err());
    Ok(vec![result])
}

/// `ResetAlarm`: clear `report.af/bsnf/bmacf/ispif`.
fn reset_alarm(ctx: &mut InterpreterContext<'_>) -> Result<Vec<u8>, EngineError> {
    ctx.report.reset_alarms();
    Ok(Vec::new())
}
