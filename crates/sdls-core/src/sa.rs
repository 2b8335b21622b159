//! Security Association table: per-SA configuration, runtime counters, and
//! the `None -> Unkeyed -> Keyed <-> Operational` state machine.

use tracing::{debug, warn};

use sdls_proto::{Gvcid, IV_SIZE};

use crate::error::EngineError;

/// Width of the Error Control Selector buffer.
pub const ECS_SIZE: usize = 4;
/// Width of the AAD bit-mask buffer.
pub const ABM_SIZE: usize = 20;
/// Width of the anti-replay counter/window buffers.
pub const ARC_SIZE: usize = 20;
/// Number of GVCID channel-binding slots per SA, per direction.
pub const NUM_GVCID: usize = 8;
/// SPI value reserved to mean "no SA" (frames using it are always rejected).
pub const SPI_RESERVED_ZERO: u16 = 0;
/// SPI value reserved for broadcast/invalid use; always rejected.
pub const SPI_RESERVED_BROADCAST: u16 = 0xFFFF;

/// Security Association lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaState {
    /// Slot is empty; no configuration installed.
    #[default]
    None,
    /// Configuration installed, no key bound.
    Unkeyed,
    /// Key bound, not yet servicing traffic.
    Keyed,
    /// Actively servicing the bound virtual channel(s).
    Operational,
}

/// Configuration payload for `sa_create` / `sa_rekey`: every field this SA
/// carries, replaced wholesale (never merged) on each successful command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaConfig {
    /// Encryption-on service flag.
    pub est: bool,
    /// Authentication-on service flag.
    pub ast: bool,
    /// IV field width in the TC/TM security header.
    pub shivf_len: u8,
    /// Sequence-number field width.
    pub shsnf_len: u8,
    /// Pad field width.
    pub shplf_len: u8,
    /// MAC trailer width.
    pub stmacf_len: u8,
    /// Error Control Selector length.
    pub ecs_len: u8,
    /// Error Control Selector value.
    pub ecs: [u8; ECS_SIZE],
    /// IV field width used by the AEAD nonce.
    pub iv_len: u8,
    /// Authentication Control Selector length.
    pub acs_len: u8,
    /// Authentication Control Selector value.
    pub acs: u8,
    /// AAD bit-mask length.
    pub abm_len: u8,
    /// AAD bit-mask value.
    pub abm: [u8; ABM_SIZE],
    /// Anti-replay counter (initial value) length.
    pub arc_len: u8,
    /// Anti-replay counter (initial value).
    pub arc: [u8; ARC_SIZE],
    /// Anti-replay window width length.
    pub arcw_len: u8,
    /// Anti-replay window width value(s).
    pub arcw: [u8; ARC_SIZE],
}

impl Default for SaConfig {
    fn default() -> Self {
        Self {
            est: false,
            ast: false,
            shivf_len: 0,
            shsnf_len: 0,
            shplf_len: 0,
            stmacf_len: 0,
            ecs_len: 0,
            ecs: [0; ECS_SIZE],
            iv_len: 0,
            acs_len: 0,
            acs: 0,
            abm_len: 0,
            abm: [0; ABM_SIZE],
            arc_len: 0,
            arc: [0; ARC_SIZE],
            arcw_len: 1,
            arcw: {
                let mut w = [0; ARC_SIZE];
                w[0] = 1;
                w
            },
        }
    }
}

/// A Security Association record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityAssociation {
    /// Security Parameter Index.
    pub spi: u16,
    /// Lifecycle state.
    pub state: SaState,
    /// Encryption key ID.
    pub ekid: u16,
    /// Authentication key ID.
    pub akid: u16,
    /// Policy configuration, replaced wholesale by `sa_create`/`sa_rekey`.
    pub config: SaConfig,
    /// Current IV (the running anti-replay counter for AEAD SAs).
    pub iv: Vec<u8>,
    /// TC channel bindings. `sa_start` installs a binding at `[vcid]`;
    /// `sa_stop` clears by the outer loop index instead, reproducing the
    /// reference implementation's indexing asymmetry rather than papering
    /// over it, since the two indices coincide for every bound channel.
    pub gvcid_tc_blk: [Option<Gvcid>; NUM_GVCID],
    /// TM channel bindings, same indexing convention.
    pub gvcid_tm_blk: [Option<Gvcid>; NUM_GVCID],
    /// Packed `{type,uf,sg,pid}` of the last EP command executed against
    /// this SA, written before state gating on every command.
    pub lpid: u8,
}

impl SecurityAssociation {
    fn empty(spi: u16) -> Self {
        Self {
            spi,
            state: SaState::None,
            ekid: spi,
            akid: spi,
            config: SaConfig::default(),
            iv: vec![0; IV_SIZE],
            gvcid_tc_blk: [None; NUM_GVCID],
            gvcid_tm_blk: [None; NUM_GVCID],
            lpid: 0,
        }
    }

    /// Anti-replay window width: the last valid byte of `arcw`.
    #[must_use]
    pub fn window_width(&self) -> u32 {
        let len = self.config.arcw_len.max(1) as usize;
        u32::from(self.config.arcw[len.saturating_sub(1).min(ARC_SIZE - 1)])
    }

    /// `(est, ast)` service-mode tuple.
    #[must_use]
    pub fn mode(&self) -> (bool, bool) {
        (self.config.est, self.config.ast)
    }
}

/// The Security Association table, indexed by SPI.
#[derive(Debug, Clone)]
pub struct Sadb {
    sas: Vec<SecurityAssociation>,
}

impl Sadb {
    /// Build a table of `num_sa` empty (`None`-state) SAs.
    #[must_use]
    pub fn new(num_sa: usize) -> Self {
        Self { sas: (0..num_sa).map(|spi| SecurityAssociation::empty(spi as u16)).collect() }
    }

    fn slot(&self, spi: u16) -> Result<&SecurityAssociation, EngineError> {
        self.sas.get(usize::from(spi)).ok_or_else(|| EngineError::NotFound(format!("spi {spi}")))
    }

    fn slot_mut(&mut self, spi: u16) -> Result<&mut SecurityAssociation, EngineError> {
        self.sas.get_mut(usize::from(spi)).ok_or_else(|| EngineError::NotFound(format!("spi {spi}")))
    }

    /// Read an SA by SPI.
    pub fn get(&self, spi: u16) -> Result<&SecurityAssociation, EngineError> {
        self.slot(spi)
    }

    /// Total number of SA slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sas.len()
    }

    /// Whether the table has no slots (never true for a correctly configured engine).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sas.is_empty()
    }

    /// Install an SA directly (used only by `EngineConfig` seeding; SDLS
    /// commands go through the typed operations below).
    pub fn seed(&mut self, sa: SecurityAssociation) {
        let spi = usize::from(sa.spi);
        if spi < self.sas.len() {
            self.sas[spi] = sa;
        }
    }

    /// First `Operational` SA whose TC binding matches `{scid, vcid}` for
    /// the whole virtual channel. Matches in slot order (first-match,
    /// resolving a scan-order ambiguity in the reference implementation -
    /// see design notes).
    #[must_use]
    pub fn find_operational_tc(&self, scid: u16, vcid: u8) -> Option<&SecurityAssociation> {
        self.sas.iter().find(|sa| {
            sa.state == SaState::Operational
                && sa.gvcid_tc_blk.iter().flatten().any(|g| g.scid == scid && g.vcid == vcid)
        })
    }

    /// `sa_create`: `None -> Unkeyed`. Copies `cfg` wholesale and sets `lpid`.
    pub fn create(&mut self, spi: u16, cfg: SaConfig, lpid: u8) -> Result<(), EngineError> {
        let sa = self.slot_mut(spi)?;
        sa.lpid = lpid;
        if sa.state != SaState::None {
            warn!(spi, ?sa.state, "sa_create requires None");
            return Err(EngineError::State(format!("spi {spi} is not None")));
        }
        sa.config = cfg;
        sa.state = SaState::Unkeyed;
        debug!(spi, "SA created");
        Ok(())
    }

    /// `sa_rekey`: `Unkeyed -> Keyed`. Binds `ekid` and sets the SA's IV.
    pub fn rekey(&mut self, spi: u16, ekid: u16, iv: &[u8], lpid: u8) -> Result<(), EngineError> {
        let sa = self.slot_mut(spi)?;
        sa.lpid = lpid;
        if sa.state != SaState::Unkeyed {
            return Err(EngineError::State(format!("spi {spi} is not Unkeyed")));
        }
        sa.ekid = ekid;
        sa.akid = ekid;
        sa.iv = iv.to_vec();
        sa.state = SaState::Keyed;
        Ok(())
    }

    /// `sa_start`: `Keyed -> Operational`. Installs channel bindings,
    /// preserving the reference engine's indexing asymmetry: clearing uses
    /// the outer loop index, installing uses the binding's own `vcid`.
    pub fn start(&mut self, spi: u16, bindings: &[Gvcid], lpid: u8) -> Result<(), EngineError> {
        let sa = self.slot_mut(spi)?;
        sa.lpid = lpid;
        if sa.state != SaState::Keyed {
            return Err(EngineError::State(format!("spi {spi} is not Keyed")));
        }
        for (x, existing) in sa.gvcid_tc_blk.iter_mut().enumerate() {
            if let Some(g) = existing {
                if !bindings.iter().any(|b| b.vcid == g.vcid) {
                    sa.gvcid_tc_blk_clear_slot(x);
                }
            }
        }
        for binding in bindings {
            let idx = usize::from(binding.vcid) % NUM_GVCID;
            sa.gvcid_tc_blk[idx] = Some(*binding);
        }
        sa.state = SaState::Operational;
        Ok(())
    }

    /// `sa_stop`: `Operational -> Keyed`. Zeros all channel bindings.
    pub fn stop(&mut self, spi: u16, lpid: u8) -> Result<(), EngineError> {
        let sa = self.slot_mut(spi)?;
        sa.lpid = lpid;
        if sa.state != SaState::Operational {
            return Err(EngineError::State(format!("spi {spi} is not Operational")));
        }
        sa.gvcid_tc_blk = [None; NUM_GVCID];
        sa.gvcid_tm_blk = [None; NUM_GVCID];
        sa.state = SaState::Keyed;
        Ok(())
    }

    /// `sa_expire`: `Keyed -> Unkeyed`.
    pub fn expire(&mut self, spi: u16, lpid: u8) -> Result<(), EngineError> {
        let sa = self.slot_mut(spi)?;
        sa.lpid = lpid;
        if sa.state != SaState::Keyed {
            return Err(EngineError::State(format!("spi {spi} is not Keyed")));
        }
        sa.state = SaState::Unkeyed;
        Ok(())
    }

    /// `sa_delete`: `Unkeyed -> None`.
    pub fn delete(&mut self, spi: u16, lpid: u8) -> Result<(), EngineError> {
        let sa = self.slot_mut(spi)?;
        sa.lpid = lpid;
        if sa.state != SaState::Unkeyed {
            return Err(EngineError::State(format!("spi {spi} is not Unkeyed")));
        }
        sa.state = SaState::None;
        Ok(())
    }

    /// `sa_set_arsn`: valid in any state. Sets the IV then increments once.
    pub fn set_arsn(&mut self, spi: u16, value: &[u8], lpid: u8) -> Result<(), EngineError> {
        let sa = self.slot_mut(spi)?;
        sa.lpid = lpid;
        sa.iv = value.to_vec();
        crate::anti_replay::increment(&mut sa.iv)?;
        Ok(())
    }

    /// `sa_set_arsnw`: valid in any state. Clamps `arcw_len <= ARC_SIZE`.
    pub fn set_arsnw(&mut self, spi: u16, width: &[u8], lpid: u8) -> Result<(), EngineError> {
        let sa = self.slot_mut(spi)?;
        sa.lpid = lpid;
        let len = width.len().min(ARC_SIZE);
        sa.config.arcw_len = len as u8;
        sa.config.arcw = [0; ARC_SIZE];
        sa.config.arcw[..len].copy_from_slice(&width[..len]);
        Ok(())
    }

    /// Advance an SA's IV in place (post-decrypt success).
    pub fn advance_iv(&mut self, spi: u16) -> Result<(), EngineError> {
        let sa = self.slot_mut(spi)?;
        crate::anti_replay::increment(&mut sa.iv)
    }

    /// Overwrite an SA's IV directly to the just-accepted received value.
    /// No further increment follows this call - see the design note in
    /// `engine::tc_process_aead`.
    pub fn set_iv_raw(&mut self, spi: u16, iv: &[u8]) -> Result<(), EngineError> {
        let sa = self.slot_mut(spi)?;
        sa.iv = iv.to_vec();
        Ok(())
    }

    /// Overwrite `lpid` without any state gating (every EP handler does
    /// this before checking preconditions).
    pub fn touch_lpid(&mut self, spi: u16, lpid: u8) -> Result<(), EngineError> {
        self.slot_mut(spi)?.lpid = lpid;
        Ok(())
    }
}

impl SecurityAssociation {
    fn gvcid_tc_blk_clear_slot(&mut self, idx: usize) {
        self.gvcid_tc_blk[idx] = None;
    }
}
