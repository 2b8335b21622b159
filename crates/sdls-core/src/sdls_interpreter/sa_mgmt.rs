//! `SaMgmt` EP procedures: the SA lifecycle operations exposed as
//! wire commands.

use sdls_proto::Gvcid;

use crate::error::EngineError;
use crate::sa::{SaConfig, ABM_SIZE, ARC_SIZE, ECS_SIZE};

use super::{InterpreterContext, SaPid};

/// Dispatch one `SaMgmt` procedure.
pub fn handle(
    ctx: &mut InterpreterContext<'_>,
    which: SaPid,
    lpid: u8,
    data: &[u8],
) -> Result<Vec<u8>, EngineError> {
    match which {
        SaPid::Create => create(ctx, lpid, data),
        SaPid::Delete => delete(ctx, lpid, data),
        SaPid::SetArsnw => set_arsnw(ctx, lpid, data),
        SaPid::Rekey => rekey(ctx, lpid, data),
        SaPid::Expire => expire(ctx, lpid, data),
        SaPid::SetArsn => set_arsn(ctx, lpid, data),
        SaPid::Start => start(ctx, lpid, data),
        SaPid::Stop => stop(ctx, lpid, data),
        SaPid::ReadArsn => read_arsn(ctx, lpid, data),
        SaPid::Status => status(ctx, lpid, data),
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn u8(&mut self) -> Result<u8, EngineError> {
        let byte = *self.data.get(self.pos).ok_or_else(short)?;
        self.pos += 1;
        Ok(byte)
    }

    fn u16(&mut self) -> Result<u16, EngineError> {
        let hi = self.u8()?;
        let lo = self.u8()?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], EngineError> {
        let end = self.pos.checked_add(n).ok_or_else(short)?;
        let slice = self.data.get(self.pos..end).ok_or_else(short)?;
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], EngineError> {
        let slice = self.bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }
}

fn short() -> EngineError {
    EngineError::Policy("SA management payload too short".into())
}

fn decode_sa_config(cursor: &mut Cursor<'_>) -> Result<SaConfig, EngineError> {
    Ok(SaConfig {
        est: cursor.u8()? != 0,
        ast: cursor.u8()? != 0,
        shivf_len: cursor.u8()?,
        shsnf_len: cursor.u8()?,
        shplf_len: cursor.u8()?,
        stmacf_len: cursor.u8()?,
        ecs_len: cursor.u8()?,
        ecs: cursor.array::<ECS_SIZE>()?,
        iv_len: cursor.u8()?,
        acs_len: cursor.u8()?,
        acs: cursor.u8()?,
        abm_len: cursor.u8()?,
        abm: cursor.array::<ABM_SIZE>()?,
        arc_len: cursor.u8()?,
        arc: cursor.array::<ARC_SIZE>()?,
        arcw_len: cursor.u8()?,
        arcw: cursor.array::<ARC_SIZE>()?,
    })
}

/// `Create`: `spi(2) | <SaConfig, field order as in `SaConfig`>`.
fn create(ctx: &mut InterpreterContext<'_>, lpid: u8, data: &[u8]) -> Result<Vec<u8>, EngineError> {
    let mut cursor = Cursor::new(data);
    let spi = cursor.u16()?;
    let cfg = decode_sa_config(&mut cursor)?;
    ctx.sadb.create(spi, cfg, lpid)?;
    Ok(Vec::new())
}

/// `Delete`: `spi(2)`.
fn delete(ctx: &mut InterpreterContext<'_>, lpid: u8, data: &[u8]) -> Result<Vec<u8>, EngineError> {
    let mut cursor = Cursor::new(data);
    let spi = cursor.u16()?;
    ctx.sadb.delete(spi, lpid)?;
    Ok(Vec::new())
}

/// `SetARSNW`: `spi(2) | len(1) | width[len]`.
fn set_arsnw(ctx: &mut InterpreterContext<'_>, lpid: u8, data: &[u8]) -> Result<Vec<u8>, EngineError> {
    let mut cursor = Cursor::new(data);
    let spi = cursor.u16()?;
    let len = usize::from(cursor.u8()?);
    let width = cursor.bytes(len)?;
    ctx.sadb.set_arsnw(spi, width, lpid)?;
    Ok(Vec::new())
}

/// `Rekey`: `spi(2) | ekid(2) | iv(IV_SIZE)`.
fn rekey(ctx: &mut InterpreterContext<'_>, lpid: u8, data: &[u8]) -> Result<Vec<u8>, EngineError> {
    let mut cursor = Cursor::new(data);
    let spi = cursor.u16()?;
    let ekid = cursor.u16()?;
    let iv = cursor.bytes(sdls_proto::IV_SIZE)?;
    ctx.sadb.rekey(spi, ekid, iv, lpid)?;
    Ok(Vec::new())
}

/// `Expire`: `spi(2)`.
fn expire(ctx: &mut InterpreterContext<'_>, lpid: u8, data: &[u8]) -> Result<Vec<u8>, EngineError> {
    let mut cursor = Cursor::new(data);
    let spi = cursor.u16()?;
    ctx.sadb.expire(spi, lpid)?;
    Ok(Vec::new())
}

/// `SetARSN`: `spi(2) | len(1) | value[len]`.
fn set_arsn(ctx: &mut InterpreterContext<'_>, lpid: u8, data: &[u8]) -> Result<Vec<u8>, EngineError> {
    let mut cursor = Cursor::new(data);
    let spi = cursor.u16()?;
    let len = usize::from(cursor.u8()?);
    let value = cursor.bytes(len)?;
    ctx.sadb.set_arsn(spi, value, lpid)?;
    Ok(Vec::new())
}

/// `Start`: `spi(2) | num_gvcid(1) | { tfvn(1), scid(2), vcid(1), mapid(1) }*`.
fn start(ctx: &mut InterpreterContext<'_>, lpid: u8, data: &[u8]) -> Result<Vec<u8>, EngineError> {
    let mut cursor = Cursor::new(data);
    let spi = cursor.u16()?;
    let count = usize::from(cursor.u8()?);
    let mut bindings = Vec::with_capacity(count);
    for _ in 0..count {
        let tfvn = cursor.u8()?;
        let scid = cursor.u16()?;
        let vcid = cursor.u8()?;
        let mapid = cursor.u8()?;
        bindings.push(Gvcid { tfvn, scid, vcid, mapid });
    }
    ctx.sadb.start(spi, &bindings, lpid)?;
    Ok(Vec::new())
}

/// `Stop`: `spi(2)`.
fn stop(ctx: &mut InterpreterContext<'_>, lpid: u8, data: &[u8]) -> Result<Vec<u8>, EngineError> {
    let mut cursor = Cursor::new(data);
    let spi = cursor.u16()?;
    ctx.sadb.stop(spi, lpid)?;
    Ok(Vec::new())
}

/// `ReadARSN`: `spi(2)` reply `spi(2) | iv[iv_len]` with the last octet
/// decremented by 1 if nonzero, representing "last received" rather than
/// "next expected" (the SA's stored `iv` is already the next-expected
/// value, matching ProcessSecurity's own reply-IV derivation).
fn read_arsn(ctx: &mut InterpreterContext<'_>, lpid: u8, data: &[u8]) -> Result<Vec<u8>, EngineError> {
    let mut cursor = Cursor::new(data);
    let spi = cursor.u16()?;
    ctx.sadb.touch_lpid(spi, lpid)?;
    let sa = ctx.sadb.get(spi)?;
    let mut iv = sa.iv.clone();
    if let Some(last) = iv.last_mut() {
        if *last != 0 {
            *last -= 1;
        }
    }
    let mut reply = spi.to_be_bytes().to_vec();
    reply.extend_from_slice(&iv);
    Ok(reply)
}

/// `Status`: `spi(2)` reply `spi(2) | lpid(1)`.
fn status(ctx: &mut InterpreterContext<'_>, lpid: u8, data: &[u8]) -> Result<Vec<u8>, EngineError> {
    let mut cursor = Cursor::new(data);
    let spi = cursor.u16()?;
    ctx.sadb.touch_lpid(spi, lpid)?;
    let sa = ctx.sadb.get(spi)?;
    let mut reply = spi.to_be_bytes().to_vec();
    reply.push(sa.lpid);
    Ok(reply)
}
