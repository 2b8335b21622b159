//! `KeyMgmt` EP procedures: OTAR, Activate/Deactivate/Destroy, Verify, Inventory.

use tracing::warn;

use sdls_proto::{IV_SIZE, MAC_SIZE};

use crate::error::EngineError;
use crate::event_log::EventId;
use crate::key::{KeyRing, KeyState, KEY_SIZE};

use super::{InterpreterContext, KeyPid};

/// Dispatch one `KeyMgmt` procedure.
pub fn handle(
    ctx: &mut InterpreterContext<'_>,
    which: KeyPid,
    lpid: u8,
    data: &[u8],
) -> Result<Vec<u8>, EngineError> {
    let _ = ctx.sadb.touch_lpid(ctx.source_spi, lpid);
    match which {
        KeyPid::Otar => otar(ctx, data),
        KeyPid::Activate => key_state_change(ctx, data, KeyState::Active),
        KeyPid::Deactivate => key_state_change(ctx, data, KeyState::Deactivated),
        KeyPid::Destroy => key_state_change(ctx, data, KeyState::Destroyed),
        KeyPid::Verify => verify(ctx, data),
        KeyPid::Inventory => inventory(ctx, data),
    }
}

const MKID_LEN: usize = 2;
const OTAR_BLOCK_LEN: usize = 2 + KEY_SIZE;

/// `OTAR`: `mkid(2) | iv(IV_SIZE) | { ekid(2) | ek(32) }* | mac(16)`.
///
/// The decrypt+MAC check runs over the *entire* wrapped blob before any
/// `ek_ring` entry is touched, so a failing MAC leaves every key untouched
/// so a tampered wrap blob installs nothing.
fn otar(ctx: &mut InterpreterContext<'_>, data: &[u8]) -> Result<Vec<u8>, EngineError> {
    if data.len() < MKID_LEN + IV_SIZE + MAC_SIZE {
        return Err(EngineError::Policy("OTAR payload too short".into()));
    }
    let mkid = u16::from_be_bytes([data[0], data[1]]);
    let iv = &data[MKID_LEN..MKID_LEN + IV_SIZE];
    let blob = &data[MKID_LEN + IV_SIZE..data.len() - MAC_SIZE];
    let mac = &data[data.len() - MAC_SIZE..];

    if !KeyRing::is_master(mkid) {
        ctx.report.af = true;
        ctx.log.push(EventId::MkidInvalidEid);
        return Err(EngineError::Auth(format!("mkid {mkid} is not a master key")));
    }
    if blob.is_empty() || blob.len() % OTAR_BLOCK_LEN != 0 {
        ctx.report.af = true;
        ctx.log.push(EventId::OtarMkErrEid);
        return Err(EngineError::Policy("OTAR wrapped-key blob is not block-aligned".into()));
    }

    let key = ctx.keys.get(mkid)?.value;
    let iv_arr: [u8; IV_SIZE] =
        iv.try_into().map_err(|_| EngineError::Policy("bad OTAR IV width".into()))?;
    let mac_arr: [u8; MAC_SIZE] =
        mac.try_into().map_err(|_| EngineError::Policy("bad OTAR MAC width".into()))?;

    let unwrapped = match ctx.crypto.decrypt(&key, &iv_arr, &[], blob, &mac_arr) {
        Ok(plaintext) => plaintext,
        Err(_) => {
            ctx.report.af = true;
            ctx.log.push(EventId::OtarMkErrEid);
            return Err(EngineError::Auth("OTAR MAC verification failed".into()));
        }
    };

    for block in unwrapped.chunks(OTAR_BLOCK_LEN) {
        let ekid = u16::from_be_bytes([block[0], block[1]]);
        if KeyRing::is_master(ekid) {
            ctx.report.af = true;
            ctx.log.push(EventId::MkidInvalidEid);
            return Err(EngineError::Auth(format!("OTAR target ekid {ekid} is a master key")));
        }
    }

    for block in unwrapped.chunks(OTAR_BLOCK_LEN) {
        let ekid = u16::from_be_bytes([block[0], block[1]]);
        let mut value = [0u8; KEY_SIZE];
        value.copy_from_slice(&block[2..2 + KEY_SIZE]);
        ctx.keys.install(ekid, value)?;
    }

    Ok(Vec::new())
}

/// Shared handler for Activate/Deactivate/Destroy: payload is `{ kid(2) }*`.
///
/// A master-key target is rejected with an explicit early `continue`
/// (this implementation does not reproduce the reference
/// implementation's fallthrough into the dead state-ordinal check for
/// master keys, which are never state-managed).
fn key_state_change(
    ctx: &mut InterpreterContext<'_>,
    data: &[u8],
    target: KeyState,
) -> Result<Vec<u8>, EngineError> {
    if data.len() % MKID_LEN != 0 {
        return Err(EngineError::Policy("key id list is not 2-byte aligned".into()));
    }
    for chunk in data.chunks(MKID_LEN) {
        let kid = u16::from_be_bytes([chunk[0], chunk[1]]);
        if KeyRing::is_master(kid) {
            ctx.report.af = true;
            ctx.log.push(EventId::MkidStateErrEid);
            continue;
        }
        if let Err(err) = ctx.keys.key_update(kid, target, ctx.log) {
            ctx.report.af = true;
            warn!(kid, ?err, "key state transition rejected");
        }
    }
    Ok(Vec::new())
}

const CHALLENGE_SIZE: usize = 8;
const VERIFY_BLOCK_LEN: usize = MKID_LEN + CHALLENGE_SIZE;

/// `Verify`: `{ kid(2), challenge(CHALLENGE_SIZE) }*`, replying
/// `{ kid(2), iv(IV_SIZE), ciphertext(CHALLENGE_SIZE), tag(MAC_SIZE) }*`.
///
/// The reply IV is derived from the originating SA's current counter with
/// its last octet incremented by `block_index + 1` (the reference
/// implementation derives it from the carrying TC frame's own IV, which
/// this SA-level counter tracks one step ahead of by construction).
fn verify(ctx: &mut InterpreterContext<'_>, data: &[u8]) -> Result<Vec<u8>, EngineError> {
    if data.is_empty() || data.len() % VERIFY_BLOCK_LEN != 0 {
        return Err(EngineError::Policy("verify payload is not block-aligned".into()));
    }
    let base_iv = ctx.sadb.get(ctx.source_spi)?.iv.clone();
    let mut reply = Vec::new();
    for (index, block) in data.chunks(VERIFY_BLOCK_LEN).enumerate() {
        let kid = u16::from_be_bytes([block[0], block[1]]);
        let challenge = &block[MKID_LEN..];
        let key = ctx.keys.get(kid)?.value;

        let mut iv = [0u8; IV_SIZE];
        let len = base_iv.len().min(IV_SIZE);
        iv[..len].copy_from_slice(&base_iv[..len]);
        iv[IV_SIZE - 1] = iv[IV_SIZE - 1].wrapping_add((index as u8) + 1);

        let (ciphertext, tag) = ctx.crypto.encrypt(&key, &iv, &[], challenge)?;
        reply.extend_from_slice(&kid.to_be_bytes());
        reply.extend_from_slice(&iv);
        reply.extend_from_slice(&ciphertext);
        reply.extend_from_slice(&tag);
    }
    Ok(reply)
}

/// `Inventory`: `kid_first(2), kid_last(2)` reply `range(2)` then
/// `{ kid(2), state(1) }*` for each kid in `[first, last)`.
fn inventory(ctx: &mut InterpreterContext<'_>, data: &[u8]) -> Result<Vec<u8>, EngineError> {
    if data.len() < 4 {
        return Err(EngineError::Policy("inventory payload too short".into()));
    }
    let first = u16::from_be_bytes([data[0], data[1]]);
    let last = u16::from_be_bytes([data[2], data[3]]);
    let range = last.saturating_sub(first);

    let mut reply = range.to_be_bytes().to_vec();
    for kid in first..last {
        let Ok(key) = ctx.keys.get(kid) else { continue };
        reply.extend_from_slice(&kid.to_be_bytes());
        reply.push(key.state.ordinal().unwrap_or(0xFF));
    }
    Ok(reply)
}
