//! Key ring: indexed 256-bit key store with per-key lifecycle state.

use tracing::warn;
use zeroize::Zeroize;

use crate::error::EngineError;
use crate::event_log::{EventId, EventLog};

/// Width of a key value in octets (AES-256).
pub const KEY_SIZE: usize = 32;
/// Key IDs below this boundary are master keys, unmanageable via OTAR or
/// SDLS state-change commands.
pub const MASTER_KEY_BOUNDARY: u16 = 128;

/// Key lifecycle state. `PreActive -> Active -> Deactivated -> Destroyed`
/// is the only SDLS-reachable path; `Corrupted` is terminal and set only
/// internally (never by a command).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyState {
    /// Installed (e.g. via OTAR) but not yet in use.
    #[default]
    PreActive,
    /// In use for encryption/decryption.
    Active,
    /// No longer in use but not yet destroyed.
    Deactivated,
    /// Permanently retired.
    Destroyed,
    /// Internal-only terminal state; never reachable via SDLS commands.
    Corrupted,
}

impl KeyState {
    /// Ordinal position in the `PreActive(1) -> Active(2) -> Deactivated(3)
    /// -> Destroyed(4)` sequence. `Corrupted` has no ordinal since it is
    /// never a valid `key_update` target.
    #[must_use]
    pub fn ordinal(self) -> Option<u8> {
        match self {
            Self::PreActive => Some(1),
            Self::Active => Some(2),
            Self::Deactivated => Some(3),
            Self::Destroyed => Some(4),
            Self::Corrupted => None,
        }
    }

    fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            1 => Some(Self::PreActive),
            2 => Some(Self::Active),
            3 => Some(Self::Deactivated),
            4 => Some(Self::Destroyed),
            _ => None,
        }
    }
}

/// A single 256-bit key slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    /// Key value.
    pub value: [u8; KEY_SIZE],
    /// Lifecycle state.
    pub state: KeyState,
}

impl Default for Key {
    fn default() -> Self {
        Self { value: [0u8; KEY_SIZE], state: KeyState::default() }
    }
}

impl Drop for Key {
    fn drop(&mut self) {
        self.value.zeroize();
    }
}

/// Flat key table, indexed by `kid`.
#[derive(Debug, Clone)]
pub struct KeyRing {
    keys: Vec<Key>,
}

impl KeyRing {
    /// Build a ring of `num_keys` slots, all zeroed and `PreActive`.
    #[must_use]
    pub fn new(num_keys: usize) -> Self {
        Self { keys: vec![Key::default(); num_keys] }
    }

    /// Total number of key slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the ring has no slots (never true for a correctly configured engine).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Whether `kid` names a master key (unmanageable via OTAR/SDLS state commands).
    #[must_use]
    pub fn is_master(kid: u16) -> bool {
        kid < MASTER_KEY_BOUNDARY
    }

    /// Read a key slot.
    ///
    /// # Errors
    /// `NotFound` if `kid` is out of range.
    pub fn get(&self, kid: u16) -> Result<&Key, EngineError> {
        self.keys
            .get(usize::from(kid))
            .ok_or_else(|| EngineError::NotFound(format!("kid {kid}")))
    }

    /// Overwrite a key's value and set its state to `PreActive` (the
    /// effect of a successful OTAR install). Allowed for session keys only;
    /// callers must reject master-key targets before calling this.
    pub fn install(&mut self, kid: u16, value: [u8; KEY_SIZE]) -> Result<(), EngineError> {
        let slot = self
            .keys
            .get_mut(usize::from(kid))
            .ok_or_else(|| EngineError::NotFound(format!("kid {kid}")))?;
        slot.value = value;
        slot.state = KeyState::PreActive;
        Ok(())
    }

    /// Overwrite a key slot wholesale, bypassing the `PreActive`-only
    /// transition `install` enforces. Used only by `EngineConfig` seeding.
    pub fn seed_raw(&mut self, kid: u16, key: Key) {
        if let Some(slot) = self.keys.get_mut(usize::from(kid)) {
            *slot = key;
        }
    }

    /// Mark a key `Corrupted`. Internal-only; never reachable via an SDLS command.
    pub fn corrupt(&mut self, kid: u16) -> Result<(), EngineError> {
        let slot = self
            .keys
            .get_mut(usize::from(kid))
            .ok_or_else(|| EngineError::NotFound(format!("kid {kid}")))?;
        slot.state = KeyState::Corrupted;
        Ok(())
    }

    /// Apply an SDLS key-state-change command (Activate/Deactivate/Destroy).
    ///
    /// Succeeds iff `kid >= MASTER_KEY_BOUNDARY` and the key's current
    /// state ordinal is exactly `target.ordinal() - 1`. Master keys and
    /// non-monotonic transitions fail with `StateError` and log the
    /// matching event.
    pub fn key_update(
        &mut self,
        kid: u16,
        target: KeyState,
        log: &mut EventLog,
    ) -> Result<(), EngineError> {
        if usize::from(kid) >= self.keys.len() {
            return Err(EngineError::NotFound(format!("kid {kid}")));
        }
        if Self::is_master(kid) {
            log.push(EventId::MkidStateErrEid);
            warn!(kid, "master key state is immutable via SDLS commands");
            return Err(EngineError::State(format!("kid {kid} is a master key")));
        }
        let Some(target_ordinal) = target.ordinal() else {
            log.push(EventId::KeyTransitionErr);
            return Err(EngineError::State("Corrupted is not a valid SDLS target".into()));
        };
        let slot = &mut self.keys[usize::from(kid)];
        let Some(current_ordinal) = slot.state.ordinal() else {
            log.push(EventId::KeyTransitionErr);
            return Err(EngineError::State(format!("kid {kid} is Corrupted")));
        };
        if current_ordinal + 1 != target_ordinal {
            log.push(EventId::KeyTransitionErr);
            warn!(kid, ?slot.state, ?target, "rejected non-monotonic key transition");
            return Err(EngineError::State(format!(
                "kid {kid} cannot move from {:?} to {target:?}",
                slot.state
            )));
        }
        slot.state = KeyState::from_ordinal(target_ordinal)
            .unwrap_or_else(|| unreachable!("target_ordinal was derived from a valid KeyState"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_with(kid: u16, state: KeyState) -> KeyRing {
        let mut ring = KeyRing::new(256);
        ring.keys[usize::from(kid)].state = state;
        ring
    }

    #[test]
    fn session_key_activates_from_preactive() {
        let mut log = EventLog::new(8);
        let mut ring = ring_with(128, KeyState::PreActive);
        ring.key_update(128, KeyState::Active, &mut log).unwrap();
        assert_eq!(ring.get(128).unwrap().state, KeyState::Active);
    }

    #[test]
    fn master_key_rejects_activate() {
        let mut log = EventLog::new(8);
        let mut ring = ring_with(0, KeyState::PreActive);
        let result = ring.key_update(0, KeyState::Active, &mut log);
        assert!(matches!(result, Err(EngineError::State(_))));
        assert_eq!(ring.get(0).unwrap().state, KeyState::PreActive);
        assert_eq!(log.num_se(), 1);
    }

    #[test]
    fn non_monotonic_transition_rejected() {
        let mut log = EventLog::new(8);
        let mut ring = ring_with(130, KeyState::PreActive);
        let result = ring.key_update(130, KeyState::Deactivated, &mut log);
        assert!(result.is_err());
        assert_eq!(ring.get(130).unwrap().state, KeyState::PreActive);
    }

    #[test]
    fn out_of_range_kid_is_not_found() {
        let mut log = EventLog::new(8);
        let mut ring = KeyRing::new(4);
        assert!(matches!(ring.key_update(999, KeyState::Active, &mut log), Err(EngineError::NotFound(_))));
    }

    #[test]
    fn install_sets_preactive() {
        let mut ring = KeyRing::new(256);
        ring.install(129, [0xAB; KEY_SIZE]).unwrap();
        let key = ring.get(129).unwrap();
        assert_eq!(key.state, KeyState::PreActive);
        assert_eq!(key.value, [0xAB; KEY_SIZE]);
    }
}
