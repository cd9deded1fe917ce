//! Frame timing and state hashing.
//!
//! The [`ProductionClock`] accumulates frame time and fires the global
//! production tick. [`StateHash`] condenses the simulation state into one
//! number so two runs (or a run and its reload) can be compared frame by
//! frame.

use crate::fixed::{Fixed64, Millis, scale_millis};

// ---------------------------------------------------------------------------
// Production clock
// ---------------------------------------------------------------------------

/// Accumulates frame time until the production interval elapses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProductionClock {
    /// Milliseconds since the last production tick.
    pub accumulator: u64,
}

impl ProductionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `dt` and report whether production fires this frame. The
    /// interval is `base_interval` scaled by `speed_factor`; on firing the
    /// accumulator resets to zero.
    pub fn tick(&mut self, dt: Millis, base_interval: Millis, speed_factor: Fixed64) -> bool {
        self.accumulator = self.accumulator.saturating_add(u64::from(dt));
        let interval = scale_millis(base_interval, speed_factor);
        if Fixed64::saturating_from_num(self.accumulator) >= interval {
            self.accumulator = 0;
            true
        } else {
            false
        }
    }
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// A simple deterministic hash of simulation state.
///
/// Uses FNV-1a (64-bit) for speed and simplicity. Not cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    /// Feed bytes into the hash.
    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_bool(&mut self, v: bool) {
        self.write(&[v as u8]);
    }

    pub fn write_str(&mut self, s: &str) {
        self.write_u64(s.len() as u64);
        self.write(s.as_bytes());
    }

    pub fn write_fixed64(&mut self, v: Fixed64) {
        self.write(&v.to_bits().to_le_bytes());
    }

    /// Feed an optional index, distinguishing `None` from every `Some`.
    pub fn write_opt_index(&mut self, v: Option<usize>) {
        match v {
            Some(i) => {
                self.write(&[1]);
                self.write_u64(i as u64);
            }
            None => self.write(&[0]),
        }
    }

    /// Finalize and return the hash value.
    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}
