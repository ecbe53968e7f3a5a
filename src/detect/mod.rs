//! Detection interface.
//!
//! The object-detection model is an external collaborator with a fixed
//! surface: given a frame it returns zero or more labelled detections, and it
//! exposes a label vocabulary that is queried once at startup (to check
//! signal-table coverage). Model loading and inference live behind the
//! `Detector` trait; this crate ships only a stub implementation for bench
//! bring-up and tests.

use anyhow::Result;

use crate::frame::Frame;

/// Label vocabulary of the trained sorter model.
pub const WASTE_LABELS: [&str; 7] = [
    "metals_and_plastic",
    "other",
    "non_recyclable",
    "glass",
    "paper",
    "bio",
    "unknown",
];

/// Axis-aligned box in frame pixel coordinates, `x1 <= x2`, `y1 <= y2`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

/// One classified, localized object instance from a single frame.
#[derive(Clone, Debug)]
pub struct Detection {
    pub label: String,
    /// Confidence in [0, 1].
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Detector surface the control loop runs against.
pub trait Detector {
    /// Run inference on one frame. Detections come back in the model's output
    /// order; no sorting by confidence or position is implied.
    fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// The fixed label vocabulary this detector can produce.
    fn labels(&self) -> &[String];
}

/// Stub detector: emits one detection every `emit_every` frames, cycling
/// through the vocabulary. Enough to drive the loop end to end without a
/// model.
pub struct StubDetector {
    labels: Vec<String>,
    frames_seen: u64,
    emit_every: u64,
}

impl StubDetector {
    pub fn new() -> Self {
        Self {
            labels: WASTE_LABELS.iter().map(|s| s.to_string()).collect(),
            frames_seen: 0,
            emit_every: 25,
        }
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_emit_every(mut self, emit_every: u64) -> Self {
        self.emit_every = emit_every.max(1);
        self
    }
}

impl Default for StubDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for StubDetector {
    fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        self.frames_seen += 1;
        if !self.frames_seen.is_multiple_of(self.emit_every) || self.labels.is_empty() {
            return Ok(Vec::new());
        }

        let cycle = (self.frames_seen / self.emit_every - 1) as usize % self.labels.len();
        let label = self.labels[cycle].clone();
        let w = frame.width as f32;
        let h = frame.height as f32;
        Ok(vec![Detection {
            label,
            confidence: 0.85,
            bbox: BoundingBox {
                x1: w * 0.25,
                y1: h * 0.25,
                x2: w * 0.75,
                y2: h * 0.75,
            },
        }])
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frame(index: u64) -> Frame {
        Frame::new(vec![0u8; 640 * 480 * 3], 640, 480, index)
    }

    #[test]
    fn stub_emits_on_schedule_and_cycles_labels() -> Result<()> {
        let mut detector = StubDetector::new()
            .with_labels(vec!["bio".to_string(), "paper".to_string()])
            .with_emit_every(2);

        let mut seen = Vec::new();
        for i in 1..=8 {
            let detections = detector.infer(&test_frame(i))?;
            if i % 2 == 0 {
                assert_eq!(detections.len(), 1);
                seen.push(detections[0].label.clone());
            } else {
                assert!(detections.is_empty());
            }
        }
        assert_eq!(seen, ["bio", "paper", "bio", "paper"]);
        Ok(())
    }

    #[test]
    fn stub_detections_have_valid_geometry() -> Result<()> {
        let mut detector = StubDetector::new().with_emit_every(1);
        let detections = detector.infer(&test_frame(1))?;
        let bbox = detections[0].bbox;
        assert!(bbox.x1 <= bbox.x2);
        assert!(bbox.y1 <= bbox.y2);
        assert!(bbox.width() > 0.0);
        assert!((0.0..=1.0).contains(&detections[0].confidence));
        Ok(())
    }

    #[test]
    fn stub_vocabulary_matches_trained_model() {
        let detector = StubDetector::new();
        assert_eq!(detector.labels().len(), WASTE_LABELS.len());
        assert!(detector.labels().iter().any(|l| l == "metals_and_plastic"));
        assert!(detector.labels().iter().any(|l| l == "non_recyclable"));
    }
}
