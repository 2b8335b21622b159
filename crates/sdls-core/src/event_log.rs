//! Bounded ring of tamper/security events plus summary counters.

/// A tamper/security event kind. Named after the reference engine's event
/// message IDs so operators can correlate log output with the original
/// flight-software telemetry dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventId {
    /// Two entries seeded at `init`.
    Startup,
    /// FECF mismatch on a received frame.
    FecfErr,
    /// Received IV fell outside the anti-replay window.
    IvWindowErr,
    /// Received IV was less-than-or-equal to the SA's expected IV.
    IvReplayErr,
    /// SPI failed validation (zero, reserved, out of range, or not `Operational`).
    SpiInvalid,
    /// OTAR's master key ID was out of the valid master-key range.
    MkidInvalidEid,
    /// OTAR's GCM unwrap/MAC verification over the wrapped key blob failed.
    OtarMkErrEid,
    /// An SDLS command targeted a master key's lifecycle state.
    MkidStateErrEid,
    /// A session-key lifecycle transition was rejected (non-monotonic target).
    KeyTransitionErr,
    /// GCM tag verification on a TC/TM frame failed.
    MacErr,
}

impl EventId {
    /// ASCII event-marker bytes written into the log block's `emv` field.
    /// The reference engine always writes the literal `"NASA"` marker
    /// regardless of event kind; this implementation preserves that.
    #[must_use]
    pub fn marker(self) -> [u8; 4] {
        *b"NASA"
    }

    /// Numeric wire code used by `DumpLog` replies.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Startup => 0,
            Self::FecfErr => 1,
            Self::IvWindowErr => 2,
            Self::IvReplayErr => 3,
            Self::SpiInvalid => 4,
            Self::MkidInvalidEid => 5,
            Self::OtarMkErrEid => 6,
            Self::MkidStateErrEid => 7,
            Self::KeyTransitionErr => 8,
            Self::MacErr => 9,
        }
    }
}

/// Width of the `emv` marker field in a log block.
pub const EMV_SIZE: usize = 4;

/// One ring entry: event message type, declared marker length, and marker bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogBlock {
    /// Event kind.
    pub emt: EventId,
    /// Declared length of `emv` actually populated.
    pub em_len: u8,
    /// Event marker value.
    pub emv: [u8; EMV_SIZE],
}

/// Append-only bounded ring of security events, with a running
/// `num_se` counter (big-endian 4-byte arithmetic, per the reference
/// engine) and `rs` remaining-slot count.
#[derive(Debug, Clone)]
pub struct EventLog {
    blocks: Vec<LogBlock>,
    capacity: usize,
    num_se: u32,
}

impl EventLog {
    /// Build an empty log with room for `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { blocks: Vec::with_capacity(capacity), capacity, num_se: 0 }
    }

    /// Append an event. Silently dropped if the ring is full; `num_se`
    /// still increments (the reference engine counts raised events even
    /// past the point where it stops recording their detail).
    pub fn push(&mut self, emt: EventId) {
        self.num_se = self.num_se.wrapping_add(1);
        if self.blocks.len() < self.capacity {
            self.blocks.push(LogBlock { emt, em_len: EMV_SIZE as u8, emv: emt.marker() });
        }
    }

    /// Remaining free slots.
    #[must_use]
    pub fn remaining_slots(&self) -> usize {
        self.capacity - self.blocks.len()
    }

    /// Total number of security events observed (including ones dropped
    /// once the ring filled).
    #[must_use]
    pub fn num_se(&self) -> u32 {
        self.num_se
    }

    /// Populated entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[LogBlock] {
        &self.blocks
    }

    /// Zero the ring and reset counters (the `EraseLog` EP procedure).
    pub fn erase(&mut self) {
        self.blocks.clear();
        self.num_se = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_until_full_then_drops_silently() {
        let mut log = EventLog::new(2);
        log.push(EventId::Startup);
        log.push(EventId::FecfErr);
        log.push(EventId::MacErr);
        assert_eq!(log.entries().len(), 2);
        assert_eq!(log.num_se(), 3);
        assert_eq!(log.remaining_slots(), 0);
    }

    #[test]
    fn erase_resets_everything() {
        let mut log = EventLog::new(4);
        log.push(EventId::Startup);
        log.push(EventId::Startup);
        log.erase();
        assert!(log.entries().is_empty());
        assert_eq!(log.num_se(), 0);
        assert_eq!(log.remaining_slots(), 4);
    }
}
