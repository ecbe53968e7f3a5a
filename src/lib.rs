//! Sorter Bridge
//!
//! This crate bridges a camera-fed object detector to a physical waste-sorting
//! actuator addressed over HTTP.
//!
//! # Architecture
//!
//! The bridge is a single synchronous loop. Per frame:
//!
//! 1. **Ingest**: pull a frame from the camera source.
//! 2. **Detect**: run the detector, obtaining zero or more labelled detections.
//! 3. **Map**: translate each class label to an actuator signal (or no action).
//! 4. **Gate**: a single shared rate-limiter slot admits at most one dispatch
//!    per configured interval, across all signals.
//! 5. **Dispatch**: POST the admitted signal to the actuator endpoint.
//!
//! Per-detection and per-dispatch failures are contained within one loop
//! iteration; only frame-source exhaustion and startup configuration errors
//! stop the daemon.
//!
//! # Module Structure
//!
//! - `frame`: pixel buffer handed from ingestion to detection
//! - `ingest`: camera sources (synthetic stub, optional HTTP MJPEG)
//! - `detect`: detector trait, detection types, label vocabulary
//! - `mapping`: class label to actuator signal table
//! - `limiter`: shared dispatch gate (one slot per interval)
//! - `dispatch`: HTTP actuator client and dispatch error classification
//! - `bridge`: the control loop tying the above together
//! - `config`: sorterd configuration (JSON file + environment)

use anyhow::{anyhow, Result};
use std::sync::OnceLock;

pub mod bridge;
pub mod config;
pub mod detect;
pub mod dispatch;
pub mod frame;
pub mod ingest;
pub mod limiter;
pub mod mapping;

pub use bridge::{Bridge, BridgeCounters, BridgeState};
pub use detect::{BoundingBox, Detection, Detector, StubDetector};
pub use dispatch::{DispatchError, Dispatcher, DryRunDispatcher, HttpDispatcher};
pub use frame::Frame;
pub use ingest::{CameraConfig, CameraSource, CameraStats, FrameSource};
pub use limiter::DispatchGate;
pub use mapping::SignalTable;

/// A conforming actuator signal is a short lowercase token. The empty string
/// is allowed and means "known label, explicitly no action".
///
/// Allowed: "plastic", "bio", "metal", ""
/// Disallowed: whitespace, uppercase, punctuation outside [_-], length > 32.
pub fn validate_signal(signal: &str) -> Result<()> {
    // Compile once for hot paths.
    static SIGNAL_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = SIGNAL_RE.get_or_init(|| regex::Regex::new(r"^[a-z0-9_-]{0,32}$").unwrap());

    if !re.is_match(signal) {
        return Err(anyhow!(
            "signal {:?} must match ^[a-z0-9_-]{{0,32}}$",
            signal
        ));
    }
    Ok(())
}
