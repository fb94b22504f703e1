// src/video/mod.rs
//
// Video I/O seams used by batch jobs. The OpenCV implementation lives
// behind the `opencv` cargo feature so the core builds without a system
// OpenCV install.

#[cfg(feature = "opencv")]
pub mod opencv_io;

#[cfg(feature = "opencv")]
pub use opencv_io::OpenCvBackend;

use crate::types::Frame;
use anyhow::Result;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VideoProperties {
    /// As reported by the container, may be 0 or negative when unknown
    pub fps: f64,
    /// As reported by the container, may be 0 or negative when unknown
    pub total_frames: i64,
    pub width: usize,
    pub height: usize,
}

/// Sequential decoder. `Ok(None)` marks the end of the stream.
pub trait FrameSource: Send {
    fn properties(&self) -> VideoProperties;
    fn read_frame(&mut self) -> Result<Option<Frame>>;
}

/// Sequential encoder. Dropping without `finish` still releases the
/// underlying handle but may leave a truncated file.
pub trait FrameSink: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;
    fn finish(self: Box<Self>) -> Result<()>;
}

pub trait VideoBackend: Send + Sync {
    fn open_input(&self, path: &Path) -> Result<Box<dyn FrameSource>>;
    fn open_output(
        &self,
        path: &Path,
        fps: f64,
        width: usize,
        height: usize,
    ) -> Result<Box<dyn FrameSink>>;
}
