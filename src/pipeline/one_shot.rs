// src/pipeline/one_shot.rs
//
// Single image analysis. Every face is detected, classified and logged;
// there is no tracking and no cooldown for still images.

use super::alert_policy::AlertPolicy;
use super::event_sink::{EventRecord, EventSink, SnapshotStore};
use crate::annotate::draw_detections;
use crate::detection::{classify_face, detect_faces, Classifier, Detector};
use crate::types::{Detection, Frame, Label, Source};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct ImageReport {
    pub detections: Vec<Detection>,
    pub label_counts: BTreeMap<Label, u64>,
    pub total_faces: usize,
    #[serde(skip)]
    pub annotated: Frame,
}

pub struct ImageAnalyzer {
    detector: Arc<dyn Detector>,
    classifier: Arc<dyn Classifier>,
    events: Arc<dyn EventSink>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    snapshots_enabled: bool,
}

impl ImageAnalyzer {
    pub fn new(
        detector: Arc<dyn Detector>,
        classifier: Arc<dyn Classifier>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            detector,
            classifier,
            events,
            snapshots: None,
            snapshots_enabled: false,
        }
    }

    /// Snapshots are saved for violations only while `enabled` is set.
    pub fn with_snapshots(mut self, store: Arc<dyn SnapshotStore>, enabled: bool) -> Self {
        self.snapshots = Some(store);
        self.snapshots_enabled = enabled;
        self
    }

    pub fn analyze(&self, frame: &Frame) -> Result<ImageReport> {
        let boxes = detect_faces(self.detector.as_ref(), frame);
        let mut detections = Vec::with_capacity(boxes.len());
        let mut label_counts = Label::zeroed_counts();

        for bbox in boxes {
            let Some(region) = frame.crop(&bbox) else {
                continue;
            };
            let (label, confidence) = classify_face(self.classifier.as_ref(), &region);
            let decision = AlertPolicy::decide(Source::Image, label, None);

            let snapshot_ref = if label.is_violation() && self.snapshots_enabled {
                self.save_snapshot(&region)
            } else {
                None
            };
            let event = EventRecord::new(Source::Image, label, confidence)
                .with_snapshot(snapshot_ref)
                .with_meta(serde_json::json!({ "box": bbox }));
            self.events
                .log_event(event)
                .context("Failed to log image event")?;

            *label_counts.entry(label).or_insert(0) += 1;
            detections.push(Detection {
                track_id: None,
                bbox,
                label,
                confidence,
                alert: decision.alert(),
            });
        }

        info!(
            "🖼  Image analysed: {} face(s), {} violation(s)",
            detections.len(),
            detections.iter().filter(|d| d.alert).count()
        );

        Ok(ImageReport {
            annotated: draw_detections(frame, &detections),
            total_faces: detections.len(),
            label_counts,
            detections,
        })
    }

    fn save_snapshot(&self, region: &Frame) -> Option<String> {
        let store = self.snapshots.as_ref()?;
        store
            .save_snapshot(region, "image")
            .map_err(|e| warn!("⚠️  Image snapshot failed: {:#}", e))
            .ok()
    }
}
