// src/lib.rs
//
// Face-mask compliance monitoring core: stable face identities across
// frames, cooldown-gated alerts, and background batch video jobs.
// Detection, classification, storage and transport are supplied by the
// embedding application through the traits re-exported here.

pub mod analysis;
pub mod annotate;
pub mod config;
pub mod detection;
pub mod jobs;
pub mod pipeline;
pub mod session;
pub mod telemetry;
pub mod types;
pub mod video;

pub use analysis::{CentroidTracker, CooldownGate};
pub use detection::{Classifier, Detector};
pub use jobs::{Job, JobEngine, JobStatus};
pub use pipeline::{EventRecord, EventSink, FramePipeline, ImageAnalyzer, SnapshotStore};
pub use session::LiveSession;
pub use types::{BBox, Config, Detection, Frame, FrameResult, Label, Source};
