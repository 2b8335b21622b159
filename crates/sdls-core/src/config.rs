//! Engine configuration and the default seed table.

use sdls_proto::Gvcid;

use crate::key::{Key, KeyState, KEY_SIZE};
use crate::sa::{SaConfig, SecurityAssociation, NUM_GVCID};

/// Number of SA table slots.
pub const DEFAULT_NUM_SA: usize = 8;
/// Number of key ring slots.
pub const DEFAULT_NUM_KEYS: usize = 256;
/// Event log ring capacity.
pub const DEFAULT_LOG_SIZE: usize = 64;
/// Spacecraft ID used by the seeded SAs and bound in `EngineConfig`.
pub const DEFAULT_SCID: u16 = 0x0044;

/// One seeded key: slot index, value, and initial lifecycle state.
#[derive(Debug, Clone, Copy)]
pub struct KeySeed {
    /// Key ring index.
    pub kid: u16,
    /// Key octets.
    pub value: [u8; KEY_SIZE],
    /// Initial state.
    pub state: KeyState,
}

/// One seeded SA, built from an `SaConfig` plus its initial lifecycle state
/// and channel bindings.
#[derive(Debug, Clone)]
pub struct SaSeed {
    /// SA table index.
    pub spi: u16,
    /// Initial lifecycle state.
    pub state: crate::sa::SaState,
    /// Bound encryption/authentication key id.
    pub ekid: u16,
    /// Policy configuration.
    pub config: SaConfig,
    /// TC channel bindings.
    pub gvcid_tc_blk: Vec<Gvcid>,
}

/// Engine configuration: table sizes plus the full default seed data.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// SA table size.
    pub num_sa: usize,
    /// Key ring size.
    pub num_keys: usize,
    /// Event log ring capacity.
    pub log_size: usize,
    /// Spacecraft ID bound to seeded SAs and validated against incoming frames.
    pub scid: u16,
    /// TM frame-header-position offset written to non-idle TM frames.
    pub tm_offset: u16,
    /// Keys installed at `init`.
    pub key_seeds: Vec<KeySeed>,
    /// SAs installed at `init`.
    pub sa_seeds: Vec<SaSeed>,
}

fn repeating_pattern(base: u8) -> [u8; KEY_SIZE] {
    let mut value = [0u8; KEY_SIZE];
    for (i, byte) in value.iter_mut().enumerate() {
        *byte = base.wrapping_add((i % 16) as u8);
    }
    value
}

fn master_key_seeds() -> Vec<KeySeed> {
    vec![
        KeySeed { kid: 0, value: repeating_pattern(0x00), state: KeyState::Active },
        KeySeed { kid: 1, value: repeating_pattern(0x10), state: KeyState::Active },
        KeySeed { kid: 2, value: repeating_pattern(0x20), state: KeyState::Active },
    ]
}

fn session_key_seeds() -> Vec<KeySeed> {
    let states = [
        KeyState::Active,
        KeyState::Active,
        KeyState::Active,
        KeyState::Active,
        KeyState::PreActive,
        KeyState::Active,
        KeyState::Deactivated,
    ];
    (0..7u16)
        .map(|i| KeySeed {
            kid: 128 + i,
            value: repeating_pattern(0x80 + (i as u8) * 0x10),
            state: states[i as usize],
        })
        .collect()
}

fn aead_sa_config() -> SaConfig {
    SaConfig {
        est: true,
        ast: true,
        shivf_len: 12,
        shsnf_len: 0,
        shplf_len: 0,
        stmacf_len: 16,
        ecs_len: 1,
        ecs: [0x01, 0, 0, 0],
        iv_len: 12,
        acs_len: 1,
        acs: 0x01,
        abm_len: 20,
        abm: [0xFFu8; crate::sa::ABM_SIZE],
        arc_len: 12,
        arc: [0u8; crate::sa::ARC_SIZE],
        arcw_len: 1,
        arcw: {
            let mut w = [0u8; crate::sa::ARC_SIZE];
            w[0] = 5;
            w
        },
    }
}

fn clear_sa_config() -> SaConfig {
    SaConfig { est: false, ast: false, shplf_len: 1, ..SaConfig::default() }
}

fn sa_seeds(scid: u16) -> Vec<SaSeed> {
    use crate::sa::SaState;

    let mut seeds = vec![SaSeed {
        spi: 1,
        state: SaState::Operational,
        ekid: 1,
        config: clear_sa_config(),
        gvcid_tc_blk: vec![
            Gvcid { tfvn: 0, scid, vcid: 0, mapid: sdls_proto::MAPID_TC },
            Gvcid { tfvn: 0, scid, vcid: 1, mapid: sdls_proto::MAPID_TC },
        ],
    }];

    for (i, ekid) in (128..=131u16).enumerate() {
        seeds.push(SaSeed {
            spi: (i as u16) + 2,
            state: SaState::Keyed,
            ekid,
            config: aead_sa_config(),
            gvcid_tc_blk: Vec::new(),
        });
    }

    seeds.push(SaSeed {
        spi: 6,
        state: SaState::Unkeyed,
        ekid: 132,
        config: aead_sa_config(),
        gvcid_tc_blk: Vec::new(),
    });

    seeds
}

impl Default for EngineConfig {
    fn default() -> Self {
        let scid = DEFAULT_SCID;
        let mut key_seeds = master_key_seeds();
        key_seeds.extend(session_key_seeds());
        Self {
            num_sa: DEFAULT_NUM_SA,
            num_keys: DEFAULT_NUM_KEYS,
            log_size: DEFAULT_LOG_SIZE,
            scid,
            tm_offset: 0,
            key_seeds,
            sa_seeds: sa_seeds(scid),
        }
    }
}

impl EngineConfig {
    /// Build the `KeyRing` this configuration seeds.
    #[must_use]
    pub fn build_key_ring(&self) -> crate::key::KeyRing {
        let mut ring = crate::key::KeyRing::new(self.num_keys);
        for seed in &self.key_seeds {
            let _ = ring.install(seed.kid, seed.value);
            if let Ok(key) = ring.get(seed.kid) {
                let mut key: Key = key.clone();
                key.state = seed.state;
                ring.seed_raw(seed.kid, key);
            }
        }
        ring
    }

    /// Build the `Sadb` this configuration seeds.
    #[must_use]
    pub fn build_sadb(&self) -> crate::sa::Sadb {
        let mut sadb = crate::sa::Sadb::new(self.num_sa);
        for seed in &self.sa_seeds {
            let mut sa = SecurityAssociation {
                spi: seed.spi,
                state: seed.state,
                ekid: seed.ekid,
                akid: seed.ekid,
                config: seed.config.clone(),
                iv: vec![0u8; sdls_proto::IV_SIZE],
                gvcid_tc_blk: [None; NUM_GVCID],
                gvcid_tm_blk: [None; NUM_GVCID],
                lpid: 0,
            };
            for binding in &seed.gvcid_tc_blk {
                let idx = usize::from(binding.vcid) % NUM_GVCID;
                sa.gvcid_tc_blk[idx] = Some(*binding);
            }
            sadb.seed(sa);
        }
        sadb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_seeds_expected_counts() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.key_seeds.len(), 10);
        assert_eq!(cfg.sa_seeds.len(), 6);
    }

    #[test]
    fn sa1_is_clear_and_operational() {
        let cfg = EngineConfig::default();
        let sadb = cfg.build_sadb();
        let sa1 = sadb.get(1).unwrap();
        assert_eq!(sa1.state, crate::sa::SaState::Operational);
        assert!(!sa1.config.est);
        assert!(sadb.find_operational_tc(cfg.scid, 0).is_some());
        assert!(sadb.find_operational_tc(cfg.scid, 1).is_some());
    }

    #[test]
    fn master_keys_are_active() {
        let cfg = EngineConfig::default();
        let ring = cfg.build_key_ring();
        for kid in 0..3u16 {
            assert_eq!(ring.get(kid).unwrap().state, KeyState::Active);
        }
    }
}
