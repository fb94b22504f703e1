// src/pipeline/event_sink.rs
//
// Outbound seams for accepted events and violation snapshots.
// Durable storage lives in the embedding application; the in-memory
// implementations here back tests and small embeddings.

use crate::types::{Frame, Label, Source};
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// One accepted detection, ready to be persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub ts: DateTime<Utc>,
    pub source: Source,
    pub label: Label,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl EventRecord {
    pub fn new(source: Source, label: Label, confidence: f32) -> Self {
        Self {
            ts: Utc::now(),
            source,
            label,
            confidence,
            track_id: None,
            snapshot_ref: None,
            meta: None,
        }
    }

    pub fn with_track_id(mut self, track_id: impl Into<String>) -> Self {
        self.track_id = Some(track_id.into());
        self
    }

    pub fn with_snapshot(mut self, snapshot_ref: Option<String>) -> Self {
        self.snapshot_ref = snapshot_ref;
        self
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Persists events. Returns the id the store assigned.
pub trait EventSink: Send + Sync {
    fn log_event(&self, event: EventRecord) -> Result<u64>;
}

/// Stores a cropped face image, returns a reference to it.
pub trait SnapshotStore: Send + Sync {
    fn save_snapshot(&self, region: &Frame, prefix: &str) -> Result<String>;
}

// ============================================================================
// IN-MEMORY IMPLEMENTATIONS
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryEventLog {
    events: Mutex<Vec<(u64, EventRecord)>>,
    next_id: AtomicU64,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EventRecord> {
        self.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(u64, EventRecord)>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EventSink for MemoryEventLog {
    fn log_event(&self, event: EventRecord) -> Result<u64> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            "📝 Event #{} {} {} ({:.2})",
            id,
            event.source.as_str(),
            event.label,
            event.confidence
        );
        self.lock().push((id, event));
        Ok(id)
    }
}

/// Keeps snapshots as JPEG bytes keyed by a generated name.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<String> {
        self.snapshots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(n, _)| n.clone())
            .collect()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save_snapshot(&self, region: &Frame, prefix: &str) -> Result<String> {
        let img = match region.to_rgb_image() {
            Some(img) if !region.is_empty() => img,
            _ => bail!("Snapshot region has no pixels"),
        };
        let mut jpeg = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut jpeg),
            image::ImageFormat::Jpeg,
        )?;

        let name = format!("{}_{}.jpg", prefix, uuid::Uuid::new_v4().simple());
        self.snapshots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((name.clone(), jpeg));
        Ok(name)
    }
}
