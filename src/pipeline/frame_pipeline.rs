// src/pipeline/frame_pipeline.rs
//
// Per-frame live processing:
//
//   detect -> track -> crop -> classify -> alert policy -> snapshot -> log
//
// One FramePipeline belongs to one live stream. It owns the tracker and
// the cooldown gate, so identities and cooldowns never leak between
// streams.

use super::alert_policy::{AlertPolicy, Decision};
use super::event_sink::{EventRecord, EventSink, SnapshotStore};
use super::metrics::PipelineMetrics;
use crate::analysis::{CentroidTracker, Clock, CooldownGate, SystemClock};
use crate::detection::{classify_face, detect_faces, Classifier, Detector};
use crate::types::{Config, Detection, Frame, FrameResult, Source};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct FramePipeline {
    detector: Arc<dyn Detector>,
    classifier: Arc<dyn Classifier>,
    events: Arc<dyn EventSink>,
    snapshots: Option<Arc<dyn SnapshotStore>>,

    tracker: CentroidTracker,
    gate: CooldownGate,
    identity_namespace: String,
    snapshots_enabled: bool,

    next_frame_id: u64,
    metrics: PipelineMetrics,
}

impl FramePipeline {
    pub fn new(
        config: &Config,
        detector: Arc<dyn Detector>,
        classifier: Arc<dyn Classifier>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self::with_clock(config, detector, classifier, events, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: &Config,
        detector: Arc<dyn Detector>,
        classifier: Arc<dyn Classifier>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            detector,
            classifier,
            events,
            snapshots: None,
            tracker: CentroidTracker::from_config(&config.tracker),
            gate: CooldownGate::with_clock(config.alerts.cooldown_seconds, clock),
            identity_namespace: config.live.identity_namespace.clone(),
            snapshots_enabled: config.alerts.snapshots_enabled,
            next_frame_id: 0,
            metrics: PipelineMetrics::new(),
        }
    }

    pub fn with_snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = Some(store);
        self
    }

    /// Run one frame. Frames must be fed in stream order.
    ///
    /// An error means the event sink failed part-way; earlier faces of the
    /// same frame may already be logged.
    pub fn process(&mut self, frame: &Frame) -> Result<FrameResult> {
        let started = Instant::now();
        let frame_id = self.next_frame_id;

        let boxes = detect_faces(self.detector.as_ref(), frame);
        let tracked = self.tracker.update(&boxes);

        let mut detections = Vec::with_capacity(tracked.len());
        for (track_id, bbox) in tracked {
            let Some(region) = frame.crop(&bbox) else {
                continue;
            };
            let (label, confidence) = classify_face(self.classifier.as_ref(), &region);
            let identity = format!("{}_{}", self.identity_namespace, track_id);

            let decision = AlertPolicy::decide(
                Source::Live,
                label,
                Some((&mut self.gate, identity.as_str())),
            );

            if let Decision::Log { alert } = decision {
                let snapshot_ref = if alert && self.snapshots_enabled {
                    self.save_snapshot(&region, &identity)
                } else {
                    None
                };
                let event = EventRecord::new(Source::Live, label, confidence)
                    .with_track_id(identity.clone())
                    .with_snapshot(snapshot_ref)
                    .with_meta(serde_json::json!({ "frame": frame_id, "box": bbox }));
                self.events
                    .log_event(event)
                    .with_context(|| format!("Failed to log event for {}", identity))?;
                self.metrics.inc(&self.metrics.events_logged);
            } else {
                self.metrics.inc(&self.metrics.alerts_suppressed);
            }

            if decision.alert() {
                self.metrics.inc(&self.metrics.alerts_raised);
                info!("🚨 {} on {} ({:.2})", label, identity, confidence);
            }

            detections.push(Detection {
                track_id: Some(identity),
                bbox,
                label,
                confidence,
                alert: decision.alert(),
            });
        }

        self.next_frame_id += 1;
        self.metrics.inc(&self.metrics.frames_processed);
        self.metrics
            .add(&self.metrics.faces_detected, detections.len() as u64);
        self.metrics.set_timing(
            &self.metrics.frame_time_us,
            started.elapsed().as_micros() as u64,
        );

        let any_alert = detections.iter().any(|d| d.alert);
        debug!(
            "Frame {}: {} face(s), {} track(s), alert={}",
            frame_id,
            detections.len(),
            self.tracker.len(),
            any_alert
        );

        Ok(FrameResult {
            frame_id,
            faces_count: detections.len(),
            detections,
            any_alert,
        })
    }

    fn save_snapshot(&self, region: &Frame, identity: &str) -> Option<String> {
        let store = self.snapshots.as_ref()?;
        match store.save_snapshot(region, &format!("live_{}", identity)) {
            Ok(name) => {
                self.metrics.inc(&self.metrics.snapshots_saved);
                Some(name)
            }
            Err(e) => {
                warn!("⚠️  Snapshot for {} failed: {:#}", identity, e);
                None
            }
        }
    }

    pub fn set_cooldown(&mut self, seconds: u64) {
        self.gate.set_cooldown(seconds);
    }

    pub fn cooldown_seconds(&self) -> u64 {
        self.gate.cooldown_seconds()
    }

    pub fn set_snapshots_enabled(&mut self, enabled: bool) {
        self.snapshots_enabled = enabled;
    }

    pub fn snapshots_enabled(&self) -> bool {
        self.snapshots_enabled
    }

    pub fn tracker(&self) -> &CentroidTracker {
        &self.tracker
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Forget all tracks and cooldowns. Frame ids keep counting.
    pub fn end_session(&mut self) {
        self.tracker.reset();
        self.gate.reset_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ManualClock;
    use crate::pipeline::event_sink::{MemoryEventLog, MemorySnapshotStore};
    use crate::types::{BBox, Label};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Detector that replays a fixed list of boxes per call.
    struct Script(Mutex<Vec<Vec<BBox>>>);

    impl Script {
        fn new(frames: Vec<Vec<BBox>>) -> Arc<Self> {
            let mut frames = frames;
            frames.reverse();
            Arc::new(Self(Mutex::new(frames)))
        }
    }

    impl Detector for Script {
        fn detect(&self, _frame: &Frame) -> Vec<BBox> {
            self.0.lock().unwrap().pop().unwrap_or_default()
        }
    }

    struct FailingSink;

    impl EventSink for FailingSink {
        fn log_event(&self, _event: EventRecord) -> Result<u64> {
            anyhow::bail!("database is locked")
        }
    }

    fn face() -> BBox {
        BBox::new(10, 10, 30, 30)
    }

    fn pipeline(
        detector: Arc<dyn Detector>,
        label: Label,
        events: Arc<dyn EventSink>,
    ) -> (FramePipeline, ManualClock) {
        let clock = ManualClock::new();
        let classifier: Arc<dyn Classifier> = Arc::new(move |_: &Frame| (label, 0.9_f32));
        let p = FramePipeline::with_clock(
            &Config::default(),
            detector,
            classifier,
            events,
            Arc::new(clock.clone()),
        );
        (p, clock)
    }

    #[test]
    fn test_no_faces_gives_empty_result() {
        let log = Arc::new(MemoryEventLog::new());
        let (mut p, _) = pipeline(Script::new(vec![]), Label::NoMask, log.clone());
        let r = p.process(&Frame::filled(64, 64, [0, 0, 0])).unwrap();
        assert_eq!(r.frame_id, 0);
        assert!(r.detections.is_empty());
        assert_eq!(r.faces_count, 0);
        assert!(!r.any_alert);
        assert!(log.is_empty());
    }

    #[test]
    fn test_continuous_violation_alerts_once_per_cooldown() {
        let log = Arc::new(MemoryEventLog::new());
        let (mut p, clock) = pipeline(
            Script::new(vec![vec![face()]; 3]),
            Label::NoMask,
            log.clone(),
        );
        let frame = Frame::filled(64, 64, [0, 0, 0]);

        let r0 = p.process(&frame).unwrap();
        assert!(r0.any_alert);
        assert_eq!(r0.detections[0].track_id.as_deref(), Some("track_0"));

        clock.advance(Duration::from_secs(5));
        let r1 = p.process(&frame).unwrap();
        assert_eq!(r1.frame_id, 1);
        assert_eq!(r1.faces_count, 1);
        assert!(!r1.detections[0].alert, "suppressed but still reported");
        assert_eq!(log.len(), 1, "suppressed violations are not logged");

        clock.advance(Duration::from_secs(6));
        let r2 = p.process(&frame).unwrap();
        assert!(r2.any_alert);
        assert_eq!(log.len(), 2);

        let m = p.metrics().summary();
        assert_eq!(m.alerts_raised, 2);
        assert_eq!(m.alerts_suppressed, 1);
        assert_eq!(m.frames_processed, 3);
    }

    #[test]
    fn test_compliant_faces_logged_every_frame() {
        let log = Arc::new(MemoryEventLog::new());
        let (mut p, _) = pipeline(
            Script::new(vec![vec![face()]; 2]),
            Label::MaskOn,
            log.clone(),
        );
        let frame = Frame::filled(64, 64, [0, 0, 0]);
        p.process(&frame).unwrap();
        p.process(&frame).unwrap();

        let events = log.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.source == Source::Live));
        assert_eq!(events[0].track_id.as_deref(), Some("track_0"));
    }

    #[test]
    fn test_box_outside_frame_is_skipped() {
        let log = Arc::new(MemoryEventLog::new());
        let (mut p, _) = pipeline(
            Script::new(vec![vec![BBox::new(500, 500, 520, 520), face()]]),
            Label::MaskOn,
            log.clone(),
        );
        let r = p.process(&Frame::filled(64, 64, [0, 0, 0])).unwrap();
        assert_eq!(r.faces_count, 1);
        assert_eq!(r.detections[0].bbox, face());
    }

    #[test]
    fn test_snapshot_attached_when_enabled() {
        let log = Arc::new(MemoryEventLog::new());
        let store = Arc::new(MemorySnapshotStore::new());
        let (p, _) = pipeline(
            Script::new(vec![vec![face()]]),
            Label::MaskIncorrect,
            log.clone(),
        );
        let mut p = p.with_snapshot_store(store.clone());
        p.set_snapshots_enabled(true);

        p.process(&Frame::filled(64, 64, [0, 0, 0])).unwrap();
        let events = log.events();
        let snap = events[0].snapshot_ref.clone().unwrap();
        assert!(snap.starts_with("live_track_0_"));
        assert_eq!(store.names(), vec![snap]);
    }

    #[test]
    fn test_sink_failure_is_an_error() {
        let (mut p, _) = pipeline(
            Script::new(vec![vec![face()]]),
            Label::NoMask,
            Arc::new(FailingSink),
        );
        let err = p.process(&Frame::filled(64, 64, [0, 0, 0])).unwrap_err();
        assert!(format!("{:#}", err).contains("database is locked"));
    }

    #[test]
    fn test_end_session_resets_cooldowns() {
        let log = Arc::new(MemoryEventLog::new());
        let (mut p, _) = pipeline(
            Script::new(vec![vec![face()]; 2]),
            Label::NoMask,
            log.clone(),
        );
        let frame = Frame::filled(64, 64, [0, 0, 0]);
        assert!(p.process(&frame).unwrap().any_alert);

        p.end_session();
        assert!(p.tracker().is_empty());
        let r = p.process(&frame).unwrap();
        // new track id, fresh cooldown
        assert_eq!(r.detections[0].track_id.as_deref(), Some("track_1"));
        assert!(r.any_alert);
    }
}
