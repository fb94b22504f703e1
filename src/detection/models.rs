// src/detection/models.rs
//
// Seams to the face detector and the mask classifier.
// Both are supplied by the embedding application; this crate only
// consumes them.

use crate::types::{BBox, Frame, Label};
use tracing::debug;

/// Face detector. Must return an empty list for an empty or degenerate
/// image instead of failing.
pub trait Detector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Vec<BBox>;
}

/// Mask classifier for one cropped face. Never fails: on internal trouble
/// it answers with its best guess.
pub trait Classifier: Send + Sync {
    fn classify(&self, region: &Frame) -> (Label, f32);
}

impl<F> Detector for F
where
    F: Fn(&Frame) -> Vec<BBox> + Send + Sync,
{
    fn detect(&self, frame: &Frame) -> Vec<BBox> {
        self(frame)
    }
}

impl<F> Classifier for F
where
    F: Fn(&Frame) -> (Label, f32) + Send + Sync,
{
    fn classify(&self, region: &Frame) -> (Label, f32) {
        self(region)
    }
}

/// Run the detector and keep only boxes that still have area once
/// clipped to the frame.
pub fn detect_faces(detector: &dyn Detector, frame: &Frame) -> Vec<BBox> {
    if frame.is_empty() {
        return Vec::new();
    }
    let raw = detector.detect(frame);
    let total = raw.len();
    let boxes: Vec<BBox> = raw
        .into_iter()
        .filter_map(|b| b.clamp_to(frame.width, frame.height))
        .collect();
    if boxes.len() < total {
        debug!("Dropped {} degenerate face box(es)", total - boxes.len());
    }
    boxes
}

/// Classify a face crop, forcing the confidence into `[0, 1]`.
pub fn classify_face(classifier: &dyn Classifier, region: &Frame) -> (Label, f32) {
    let (label, confidence) = classifier.classify(region);
    let confidence = if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    };
    (label, confidence)
}
