//! Dispatch rate gate.
//!
//! A single slot shared by every signal: one permitted dispatch consumes the
//! slot for all detections, in the current frame and the following ones, until
//! the configured interval elapses. This is deliberately not per-class
//! throttling; the actuator is one physical device and the ceiling applies to
//! the device, not to each sorting category.

use std::time::{Duration, Instant};

/// Stateful gate permitting at most one dispatch per `min_interval`.
#[derive(Debug)]
pub struct DispatchGate {
    last_dispatch: Option<Instant>,
    min_interval: Duration,
}

impl DispatchGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_dispatch: None,
            min_interval,
        }
    }

    /// Try to claim the slot at `now`.
    ///
    /// Returns `true` and records `now` iff no dispatch has happened yet or
    /// `now - last_dispatch >= min_interval`. On denial the state is left
    /// unchanged. The caller keeps the slot regardless of whether its dispatch
    /// subsequently succeeds.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        match self.last_dispatch {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last_dispatch = Some(now);
                true
            }
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}
