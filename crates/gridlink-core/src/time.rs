// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! The shared snapshot clock.
//!
//! Snapshots across all drivers are stamped from one shared millisecond
//! clock that only the manager's tick timer advances. Keeping a single
//! writer gives a consistent notion of "now" across adapters without every
//! poll cycle hitting the system clock.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Cloneable handle to the gateway-wide snapshot clock.
#[derive(Debug, Clone)]
pub struct SharedClock {
    epoch_ms: Arc<AtomicI64>,
}

impl SharedClock {
    /// Creates a clock initialized to the current wall time.
    pub fn new() -> Self {
        Self {
            epoch_ms: Arc::new(AtomicI64::new(chrono::Utc::now().timestamp_millis())),
        }
    }

    /// Returns the clock's current reading in milliseconds.
    #[inline]
    pub fn now_ms(&self) -> i64 {
        self.epoch_ms.load(Ordering::Relaxed)
    }

    /// Advances the clock to the current wall time. Called only by the
    /// manager's tick timer.
    pub fn tick(&self) {
        self.epoch_ms
            .store(chrono::Utc::now().timestamp_millis(), Ordering::Relaxed);
    }
}

impl Default for SharedClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_reads_are_shared() {
        let clock = SharedClock::new();
        let other = clock.clone();
        let before = other.now_ms();
        clock.tick();
        assert!(other.now_ms() >= before);
    }
}
