// src/video/opencv_io.rs
//
// OpenCV implementation of the video traits. Frames cross the boundary as
// RGB8: BGR mats from `VideoCapture` are converted on read and converted
// back before `VideoWriter` (fourcc `mp4v`) writes them. Capture and writer
// handles are released when the reader or writer is dropped.

use super::{FrameSink, FrameSource, VideoBackend, VideoProperties};
use crate::types::Frame;
use anyhow::{bail, Context, Result};
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTraitConst, VideoWriter},
};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenCvBackend;

impl VideoBackend for OpenCvBackend {
    fn open_input(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(OpenCvReader::open(path)?))
    }

    fn open_output(
        &self,
        path: &Path,
        fps: f64,
        width: usize,
        height: usize,
    ) -> Result<Box<dyn FrameSink>> {
        Ok(Box::new(OpenCvWriter::create(path, fps, width, height)?))
    }
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .with_context(|| format!("Non UTF-8 path: {}", path.display()))
}

// ============================================================================
// READER
// ============================================================================

pub struct OpenCvReader {
    cap: VideoCapture,
    props: VideoProperties,
    current_frame: u64,
}

impl OpenCvReader {
    pub fn open(path: &Path) -> Result<Self> {
        info!("Opening video: {}", path.display());

        let cap = VideoCapture::from_file(path_str(path)?, videoio::CAP_ANY)?;
        if !cap.is_opened()? {
            bail!("Failed to open video file");
        }

        let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
        let total_frames = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_COUNT)? as i64;
        let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)? as usize;
        let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)? as usize;

        info!(
            "Video properties: {}x{} @ {:.1} FPS, {} frames",
            width, height, fps, total_frames
        );

        Ok(Self {
            cap,
            props: VideoProperties {
                fps,
                total_frames,
                width,
                height,
            },
            current_frame: 0,
        })
    }
}

impl FrameSource for OpenCvReader {
    fn properties(&self) -> VideoProperties {
        self.props
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        use opencv::videoio::VideoCaptureTrait;

        let mut mat = Mat::default();
        if !VideoCaptureTrait::read(&mut self.cap, &mut mat)? || mat.empty() {
            return Ok(None);
        }

        self.current_frame += 1;
        let timestamp_ms = if self.props.fps > 0.0 {
            (self.current_frame as f64 / self.props.fps) * 1000.0
        } else {
            0.0
        };

        let mut rgb_mat = Mat::default();
        imgproc::cvt_color(&mat, &mut rgb_mat, imgproc::COLOR_BGR2RGB, 0)?;

        let data = rgb_mat.data_bytes()?.to_vec();
        Ok(Some(Frame::new(
            data,
            rgb_mat.cols() as usize,
            rgb_mat.rows() as usize,
            timestamp_ms,
        )))
    }
}

impl Drop for OpenCvReader {
    fn drop(&mut self) {
        use opencv::videoio::VideoCaptureTrait;
        let _ = self.cap.release();
    }
}

// ============================================================================
// WRITER
// ============================================================================

pub struct OpenCvWriter {
    writer: VideoWriter,
    width: usize,
    height: usize,
    written: u64,
}

impl OpenCvWriter {
    pub fn create(path: &Path, fps: f64, width: usize, height: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        info!("Output video: {}", path.display());

        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
        let writer = VideoWriter::new(
            path_str(path)?,
            fourcc,
            fps,
            core::Size::new(width as i32, height as i32),
            true,
        )?;
        if !writer.is_opened()? {
            bail!("Failed to open video writer for {}", path.display());
        }

        Ok(Self {
            writer,
            width,
            height,
            written: 0,
        })
    }
}

impl FrameSink for OpenCvWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        use opencv::videoio::VideoWriterTrait;

        if frame.width != self.width || frame.height != self.height || frame.is_empty() {
            bail!(
                "Frame {}x{} does not match output {}x{}",
                frame.width,
                frame.height,
                self.width,
                self.height
            );
        }

        let mut rgb = Mat::new_rows_cols_with_default(
            frame.height as i32,
            frame.width as i32,
            core::CV_8UC3,
            core::Scalar::all(0.0),
        )?;
        rgb.data_bytes_mut()?
            .copy_from_slice(&frame.data[..frame.width * frame.height * 3]);

        let mut bgr = Mat::default();
        imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0)?;
        self.writer.write(&bgr)?;
        self.written += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        use opencv::videoio::VideoWriterTrait;
        self.writer.release()?;
        debug!("✓ Wrote {} frames", self.written);
        Ok(())
    }
}

impl Drop for OpenCvWriter {
    fn drop(&mut self) {
        use opencv::videoio::VideoWriterTrait;
        // no-op when finish() already released
        let _ = self.writer.release();
    }
}
