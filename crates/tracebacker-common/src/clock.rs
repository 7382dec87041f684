//! Timestamp sources.
//!
//! All timestamps are `f64` seconds. Call sites that push frames or record
//! durations supply their own numbers; a [`Clock`] is only consulted where
//! the library has to time something itself, which is the trace span.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Source of "now" in seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Wall-clock anchored, monotonically advancing clock.
///
/// Reads the system time once at construction and advances it with
/// [`Instant`], so readings look like Unix timestamps but never go
/// backwards when the system clock is adjusted.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    anchor_wall: f64,
    anchor: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        let anchor_wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        Self {
            anchor_wall,
            anchor: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.anchor_wall + self.anchor.elapsed().as_secs_f64()
    }
}

/// Hand-driven clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            bits: AtomicU64::new(start.to_bits()),
        }
    }

    /// Set the current reading.
    pub fn set(&self, seconds: f64) {
        self.bits.store(seconds.to_bits(), Ordering::SeqCst);
    }

    /// Move the reading forward by `seconds`.
    pub fn advance(&self, seconds: f64) {
        let _ = self
            .bits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |bits| {
                Some((f64::from_bits(bits) + seconds).to_bits())
            });
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}
