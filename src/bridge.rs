//! The control loop.
//!
//! `Bridge` orchestrates one frame at a time: pull frame, detect, then per
//! detection map -> gate -> dispatch. Everything is synchronous; the only
//! cross-iteration state is the dispatch gate's last-dispatch timestamp.
//!
//! Failure containment: an unmapped label, a throttled dispatch, or a failed
//! HTTP exchange never stops the loop. Only frame-source exhaustion, a frame
//! acquisition fault, or an external stop request transition the bridge to
//! `Stopped`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::detect::{Detection, Detector};
use crate::dispatch::{DispatchError, Dispatcher};
use crate::ingest::FrameSource;
use crate::limiter::DispatchGate;
use crate::mapping::SignalTable;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeState {
    Running,
    Stopped,
}

/// Per-run counters, logged periodically and once more at shutdown.
#[derive(Clone, Copy, Debug, Default)]
pub struct BridgeCounters {
    pub frames: u64,
    pub detections: u64,
    pub dispatched: u64,
    pub dispatch_failures: u64,
    pub unmapped: u64,
    pub suppressed: u64,
    pub throttled: u64,
    pub below_confidence: u64,
}

pub struct Bridge {
    table: SignalTable,
    gate: DispatchGate,
    dispatcher: Box<dyn Dispatcher>,
    /// Detections below this confidence are ignored. 0.0 acts on everything.
    min_confidence: f32,
    state: BridgeState,
    counters: BridgeCounters,
}

impl Bridge {
    pub fn new(table: SignalTable, gate: DispatchGate, dispatcher: Box<dyn Dispatcher>) -> Self {
        Self {
            table,
            gate,
            dispatcher,
            min_confidence: 0.0,
            state: BridgeState::Running,
            counters: BridgeCounters::default(),
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn counters(&self) -> &BridgeCounters {
        &self.counters
    }

    /// Run until the source is exhausted, frame acquisition faults, or `stop`
    /// is raised. The source is released before returning.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        detector: &mut dyn Detector,
        stop: &AtomicBool,
    ) -> Result<()> {
        let mut last_health_log = Instant::now();

        while self.state == BridgeState::Running {
            if stop.load(Ordering::Relaxed) {
                log::info!("stop requested; shutting down");
                break;
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    log::info!("frame source exhausted; shutting down");
                    break;
                }
                Err(e) => {
                    log::error!("frame acquisition failed: {:#}", e);
                    break;
                }
            };
            self.counters.frames += 1;

            let detections = match detector.infer(&frame) {
                Ok(detections) => detections,
                Err(e) => {
                    log::warn!("inference failed on frame {}: {:#}", frame.index, e);
                    continue;
                }
            };
            self.counters.detections += detections.len() as u64;

            for det in &detections {
                log::debug!(
                    "frame {}: label={} conf={:.2} box=({:.0},{:.0},{:.0},{:.0})",
                    frame.index,
                    det.label,
                    det.confidence,
                    det.bbox.x1,
                    det.bbox.y1,
                    det.bbox.x2,
                    det.bbox.y2
                );
            }

            self.process_detections(&detections, Instant::now());

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                let c = &self.counters;
                log::info!(
                    "bridge health: frames={} detections={} dispatched={} failures={}",
                    c.frames,
                    c.detections,
                    c.dispatched,
                    c.dispatch_failures
                );
                last_health_log = Instant::now();
            }
        }

        self.state = BridgeState::Stopped;
        source.release();
        let c = &self.counters;
        log::info!(
            "bridge stopped: frames={} detections={} dispatched={} failures={} unmapped={} throttled={}",
            c.frames,
            c.detections,
            c.dispatched,
            c.dispatch_failures,
            c.unmapped,
            c.throttled
        );
        Ok(())
    }

    /// Handle one frame's detections, in detector order, at time `now`.
    ///
    /// Split out from `run` so tests can drive the gate with fabricated
    /// timestamps.
    pub fn process_detections(&mut self, detections: &[Detection], now: Instant) {
        for det in detections {
            if det.confidence < self.min_confidence {
                log::debug!(
                    "skipping {:?} at {:.2}: below confidence floor {:.2}",
                    det.label,
                    det.confidence,
                    self.min_confidence
                );
                self.counters.below_confidence += 1;
                continue;
            }

            let signal = match self.table.map(&det.label) {
                Some(signal) => signal,
                None => {
                    log::warn!("unmapped label {:?}; skipping detection", det.label);
                    self.counters.unmapped += 1;
                    continue;
                }
            };

            if signal.is_empty() {
                log::debug!("label {:?} maps to no action", det.label);
                self.counters.suppressed += 1;
                continue;
            }

            if !self.gate.try_acquire(now) {
                log::debug!("dispatch throttled for signal {:?}", signal);
                self.counters.throttled += 1;
                continue;
            }

            // The slot stays consumed whether or not the dispatch succeeds.
            match self.dispatcher.dispatch(signal) {
                Ok(()) => {
                    log::info!("dispatched signal {:?} for label {:?}", signal, det.label);
                    self.counters.dispatched += 1;
                }
                Err(DispatchError::Rejected { status }) => {
                    log::error!(
                        "actuator rejected signal {:?} for label {:?}: http {}",
                        signal,
                        det.label,
                        status
                    );
                    self.counters.dispatch_failures += 1;
                }
                Err(e @ DispatchError::Transport(_)) => {
                    log::error!(
                        "dispatch failed for signal {:?} for label {:?}: {}",
                        signal,
                        det.label,
                        e
                    );
                    self.counters.dispatch_failures += 1;
                }
            }
        }
    }
}
