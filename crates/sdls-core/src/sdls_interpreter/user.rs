//! `User` (test/debug) EP procedures: toggles that corrupt the next
//! emitted/received frame, used to drive the FSR-flag-raising scenarios of
//! the test suite, plus direct key/channel overrides.

use crate::error::EngineError;
use crate::key::KEY_SIZE;

use super::{InterpreterContext, UserPid};

/// Dispatch one `User` procedure.
pub fn handle(
    ctx: &mut InterpreterContext<'_>,
    which: UserPid,
    _lpid: u8,
    data: &[u8],
) -> Result<Vec<u8>, EngineError> {
    match which {
        UserPid::IdleTrigger => {
            ctx.toggles.idle_trigger = true;
            Ok(Vec::new())
        }
        UserPid::BadSpi => {
            ctx.toggles.bad_spi = true;
            Ok(Vec::new())
        }
        UserPid::BadIv => {
            ctx.toggles.bad_iv = true;
            Ok(Vec::new())
        }
        UserPid::BadMac => {
            ctx.toggles.bad_mac = true;
            Ok(Vec::new())
        }
        UserPid::BadFecf => {
            // Reserved: no frame path currently re-derives a corrupted
            // FECF on demand (matching the reference implementation's own
            // `// TODO: future work` stub for this toggle).
            Ok(Vec::new())
        }
        UserPid::ModifyKey => modify_key(ctx, data),
        UserPid::ModifyActiveTm => modify_active_tm(ctx, data),
        UserPid::ModifyVcid => modify_vcid(ctx, data),
    }
}

/// `ModifyKey`: `kid(2) | value(32)`. Overwrites a key's raw value
/// directly, bypassing OTAR's wrap/unwrap; sets state to `PreActive` like
/// a successful OTAR install.
fn modify_key(ctx: &mut InterpreterContext<'_>, data: &[u8]) -> Result<Vec<u8>, EngineError> {
    if data.len() < 2 + KEY_SIZE {
        return Err(EngineError::Policy("ModifyKey payload too short".into()));
    }
    let kid = u16::from_be_bytes([data[0], data[1]]);
    let mut value = [0u8; KEY_SIZE];
    value.copy_from_slice(&data[2..2 + KEY_SIZE]);
    ctx.keys.install(kid, value)?;
    Ok(Vec::new())
}

/// `ModifyActiveTM`: `spi(2)`. Reserved: recorded but not yet wired
/// into TM channel-binding lookup.
fn modify_active_tm(ctx: &mut InterpreterContext<'_>, data: &[u8]) -> Result<Vec<u8>, EngineError> {
    if data.len() < 2 {
        return Err(EngineError::Policy("ModifyActiveTM payload too short".into()));
    }
    let spi = u16::from_be_bytes([data[0], data[1]]);
    ctx.toggles.pending_active_tm_spi = Some(spi);
    Ok(Vec::new())
}

/// `ModifyVCID`: `vcid(1)`. Changes the virtual channel the next
/// `tm_apply` call builds a frame for.
fn modify_vcid(ctx: &mut InterpreterContext<'_>, data: &[u8]) -> Result<Vec<u8>, EngineError> {
    let vcid = *data.first().ok_or_else(|| EngineError::Policy("ModifyVCID payload too short".into()))?;
    ctx.toggles.pending_vcid = Some(vcid);
    Ok(Vec::new())
}
