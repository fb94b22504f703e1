// src/pipeline/mod.rs

pub mod alert_policy;
pub mod event_sink;
pub mod frame_pipeline;
pub mod metrics;
pub mod one_shot;

pub use alert_policy::{AlertPolicy, Decision};
pub use event_sink::{EventRecord, EventSink, MemoryEventLog, MemorySnapshotStore, SnapshotStore};
pub use frame_pipeline::FramePipeline;
pub use metrics::{MetricsSummary, PipelineMetrics};
pub use one_shot::{ImageAnalyzer, ImageReport};
