// src/analysis/mod.rs
//
// Stateful per-stream analysis.
//
// Signal flow:
//   Detector boxes → centroid_tracker → (track_id, box)
//   Classified violation + identity → cooldown → alert / suppress
//
// Both pieces are owned by one live session; nothing here is shared.

pub mod centroid_tracker;
pub mod cooldown;

pub use centroid_tracker::{CentroidTracker, Track, TrackId};
pub use cooldown::{Clock, CooldownGate, ManualClock, SystemClock};
