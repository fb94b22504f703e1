// src/analysis/centroid_tracker.rs
//
// Centroid tracker for faces in a live stream.
// Turns the unordered boxes of each frame into stable track ids.
//
// Design:
//   - Matching key is the box centroid, no motion model and no re-id
//   - Greedy nearest-neighbour assignment, rows visited by ascending
//     minimum distance (faces per frame are few, O(n*m) is fine)
//   - A track that misses more than `max_disappeared` updates is retired;
//     if the face comes back it gets a fresh id
//   - Ids are monotonic and never reused, including across reset()

use crate::types::{BBox, TrackerConfig};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

pub type TrackId = u64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Track {
    pub centroid: (f64, f64),
    /// Consecutive updates without a matching detection
    pub disappeared: u32,
}

pub struct CentroidTracker {
    /// Ascending id order doubles as registration order.
    tracks: BTreeMap<TrackId, Track>,
    next_id: TrackId,
    max_disappeared: u32,
}

impl CentroidTracker {
    pub fn new(max_disappeared: u32) -> Self {
        Self {
            tracks: BTreeMap::new(),
            next_id: 0,
            max_disappeared,
        }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(config.max_disappeared)
    }

    /// Feed one frame's detections, get `(track_id, box)` pairs back.
    ///
    /// Matched pairs come first (in greedy order), then newly registered
    /// tracks in input order.
    pub fn update(&mut self, boxes: &[BBox]) -> Vec<(TrackId, BBox)> {
        if boxes.is_empty() {
            let ids: Vec<TrackId> = self.tracks.keys().copied().collect();
            for id in ids {
                self.mark_missed(id);
            }
            return Vec::new();
        }

        let centroids: Vec<(f64, f64)> = boxes.iter().map(BBox::centroid).collect();

        if self.tracks.is_empty() {
            return boxes
                .iter()
                .zip(&centroids)
                .map(|(b, c)| (self.register(*c), *b))
                .collect();
        }

        let track_ids: Vec<TrackId> = self.tracks.keys().copied().collect();
        let distances: Vec<Vec<f64>> = self
            .tracks
            .values()
            .map(|t| centroids.iter().map(|c| distance(t.centroid, *c)).collect())
            .collect();

        let pairs = greedy_assignment(&distances);

        let mut used_rows = vec![false; track_ids.len()];
        let mut used_cols = vec![false; boxes.len()];
        let mut results = Vec::with_capacity(boxes.len());

        for (row, col) in pairs {
            let id = track_ids[row];
            if let Some(track) = self.tracks.get_mut(&id) {
                track.centroid = centroids[col];
                track.disappeared = 0;
            }
            used_rows[row] = true;
            used_cols[col] = true;
            results.push((id, boxes[col]));
        }

        for (row, id) in track_ids.iter().enumerate() {
            if !used_rows[row] {
                self.mark_missed(*id);
            }
        }

        for (col, used) in used_cols.iter().enumerate() {
            if !used {
                let id = self.register(centroids[col]);
                results.push((id, boxes[col]));
            }
        }

        results
    }

    /// Drop every track. Ids keep increasing so old ids are never handed out again.
    pub fn reset(&mut self) {
        self.tracks.clear();
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.tracks.contains_key(&id)
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn centroid(&self, id: TrackId) -> Option<(f64, f64)> {
        self.tracks.get(&id).map(|t| t.centroid)
    }

    pub fn next_id(&self) -> TrackId {
        self.next_id
    }

    pub fn max_disappeared(&self) -> u32 {
        self.max_disappeared
    }

    fn register(&mut self, centroid: (f64, f64)) -> TrackId {
        let id = self.next_id;
        self.tracks.insert(
            id,
            Track {
                centroid,
                disappeared: 0,
            },
        );
        self.next_id += 1;
        debug!("🆕 Track {} registered at ({:.1}, {:.1})", id, centroid.0, centroid.1);
        id
    }

    fn mark_missed(&mut self, id: TrackId) {
        let retire = match self.tracks.get_mut(&id) {
            Some(track) => {
                track.disappeared += 1;
                track.disappeared > self.max_disappeared
            }
            None => false,
        };
        if retire {
            self.tracks.remove(&id);
            debug!("🗑 Track {} retired after {} missed frames", id, self.max_disappeared + 1);
        }
    }
}

// ============================================================================
// MATCHING
// ============================================================================

fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    (dx * dx + dy * dy).sqrt()
}

/// Index of the smallest value, first one wins on ties.
fn argmin(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v >= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Greedy row→column assignment over a `rows x cols` distance matrix.
///
/// Rows are visited by ascending minimum distance (stable on ties); each
/// takes its nearest column that is still free. Intentionally not an
/// optimal (Hungarian) assignment.
fn greedy_assignment(distances: &[Vec<f64>]) -> Vec<(usize, usize)> {
    let cols = distances.first().map_or(0, Vec::len);
    if cols == 0 {
        return Vec::new();
    }

    let row_min: Vec<f64> = distances
        .iter()
        .map(|row| row.iter().copied().fold(f64::INFINITY, f64::min))
        .collect();
    let mut order: Vec<usize> = (0..distances.len()).collect();
    order.sort_by(|&a, &b| row_min[a].partial_cmp(&row_min[b]).unwrap_or(Ordering::Equal));

    let mut used_cols = vec![false; cols];
    let mut pairs = Vec::new();

    for row in order {
        let free: Vec<f64> = distances[row]
            .iter()
            .enumerate()
            .map(|(c, &d)| if used_cols[c] { f64::INFINITY } else { d })
            .collect();
        if let Some(col) = argmin(&free) {
            if used_cols[col] {
                // every column is taken
                break;
            }
            used_cols[col] = true;
            pairs.push((row, col));
        }
    }
    pairs
}
