// src/types.rs

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub alerts: AlertConfig,
    pub live: LiveConfig,
    pub video: VideoConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Consecutive missed updates a track survives before it is retired
    pub max_disappeared: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Minimum seconds between two alerts for the same identity
    pub cooldown_seconds: u64,
    /// Save a face crop for every alerting violation
    pub snapshots_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Frame rate live clients are told to send at. Not enforced server side.
    pub fps_cap: u32,
    /// Prefix of the cooldown identity, e.g. `track` -> `track_3`
    pub identity_namespace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Rate at which batch jobs sample frames for detection
    pub target_fps: u32,
    pub output_dir: PathBuf,
    pub output_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { max_disappeared: 30 }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 10,
            snapshots_enabled: false,
        }
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            fps_cap: 5,
            identity_namespace: "track".to_string(),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            target_fps: 5,
            output_dir: PathBuf::from("data/outputs"),
            output_prefix: "annotated".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ============================================================================
// GEOMETRY
// ============================================================================

/// Axis-aligned face box in pixel coordinates, `x2 > x1` and `y2 > y1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> i64 {
        self.width().max(0) as i64 * self.height().max(0) as i64
    }

    pub fn centroid(&self) -> (f64, f64) {
        (
            (self.x1 as f64 + self.x2 as f64) / 2.0,
            (self.y1 as f64 + self.y2 as f64) / 2.0,
        )
    }

    /// Intersect with the `[0, width) x [0, height)` frame. None when nothing is left.
    pub fn clamp_to(&self, width: usize, height: usize) -> Option<BBox> {
        let x1 = self.x1.clamp(0, width as i32);
        let y1 = self.y1.clamp(0, height as i32);
        let x2 = self.x2.clamp(0, width as i32);
        let y2 = self.y2.clamp(0, height as i32);
        if x2 > x1 && y2 > y1 {
            Some(BBox { x1, y1, x2, y2 })
        } else {
            None
        }
    }
}

impl From<[i32; 4]> for BBox {
    fn from(v: [i32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [i32; 4] {
    fn from(b: BBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

// ============================================================================
// FRAMES
// ============================================================================

/// Packed RGB8 image plus its position in the stream.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub timestamp_ms: f64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: usize, height: usize, timestamp_ms: f64) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ms,
        }
    }

    /// Solid-colour frame, mostly useful for tests and placeholders.
    pub fn filled(width: usize, height: usize, rgb: [u8; 3]) -> Self {
        let data = rgb.iter().copied().cycle().take(width * height * 3).collect();
        Self::new(data, width, height, 0.0)
    }

    pub fn from_rgb_image(img: RgbImage, timestamp_ms: f64) -> Self {
        let (w, h) = img.dimensions();
        Self::new(img.into_raw(), w as usize, h as usize, timestamp_ms)
    }

    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width as u32, self.height as u32, self.data.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.len() < self.width * self.height * 3
    }

    /// Copy out the region under `bbox`, clipped to the frame.
    /// Returns None when the clipped region is empty.
    pub fn crop(&self, bbox: &BBox) -> Option<Frame> {
        if self.is_empty() {
            return None;
        }
        let b = bbox.clamp_to(self.width, self.height)?;
        let (x1, y1) = (b.x1 as usize, b.y1 as usize);
        let (w, h) = (b.width() as usize, b.height() as usize);

        let mut data = Vec::with_capacity(w * h * 3);
        for row in y1..y1 + h {
            let start = (row * self.width + x1) * 3;
            data.extend_from_slice(&self.data[start..start + w * 3]);
        }
        Some(Frame::new(data, w, h, self.timestamp_ms))
    }
}

// ============================================================================
// LABELS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Label {
    MaskOn,
    NoMask,
    MaskIncorrect,
}

impl Label {
    pub const ALL: [Label; 3] = [Label::MaskOn, Label::NoMask, Label::MaskIncorrect];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaskOn => "MASK_ON",
            Self::NoMask => "NO_MASK",
            Self::MaskIncorrect => "MASK_INCORRECT",
        }
    }

    pub fn is_violation(&self) -> bool {
        matches!(self, Self::NoMask | Self::MaskIncorrect)
    }

    /// Per-label counter map with every label present at zero.
    pub fn zeroed_counts() -> BTreeMap<Label, u64> {
        Self::ALL.iter().map(|l| (*l, 0)).collect()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a detection came from. Only `Live` is subject to cooldowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Live,
    Image,
    Video,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

// ============================================================================
// RESULTS
// ============================================================================

/// One classified face in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,
    #[serde(rename = "box")]
    pub bbox: BBox,
    pub label: Label,
    pub confidence: f32,
    pub alert: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    pub frame_id: u64,
    pub detections: Vec<Detection>,
    /// True when at least one detection in the frame raised an alert
    #[serde(rename = "alert")]
    pub any_alert: bool,
    pub faces_count: usize,
}
