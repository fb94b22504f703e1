// src/session.rs
//
// Live stream session: the message protocol spoken with one client.
//
//   client                          server
//   {type: config, ...}        ->   {type: config_ack, snapshots_enabled, cooldown_seconds}
//   {type: frame, data}        ->   {type: result, frame_id, detections, alert, faces_count}
//   {type: ping}               ->   {type: pong}
//
// `data` is a base64 JPEG/PNG, optionally prefixed with a data URL header.
// Every decodable frame is processed and answered; frames that cannot be
// decoded get no answer. `fps_cap` is the send rate advertised to clients,
// the server does not throttle. A session owns its pipeline; nothing is
// shared between clients.

use crate::analysis::{Clock, SystemClock};
use crate::detection::{Classifier, Detector};
use crate::pipeline::{EventSink, FramePipeline, MetricsSummary, SnapshotStore};
use crate::types::{Config, Frame, FrameResult};
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Config {
        snapshots_enabled: Option<bool>,
        #[serde(default, deserialize_with = "lenient_seconds")]
        cooldown_seconds: Option<u64>,
    },
    Frame {
        #[serde(default)]
        data: String,
    },
    Ping,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConfigAck {
        snapshots_enabled: bool,
        cooldown_seconds: u64,
    },
    Result(FrameResult),
    Pong,
}

pub struct LiveSession {
    pipeline: FramePipeline,
    fps_cap: u32,
}

impl LiveSession {
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
        info!(
            "🔌 Live session started (fps cap {}, cooldown {}s)",
            config.live.fps_cap, config.alerts.cooldown_seconds
        );
        Self {
            pipeline: FramePipeline::with_clock(
                config,
                detector,
                classifier,
                events,
                clock,
            ),
            fps_cap: config.live.fps_cap,
        }
    }

    pub fn with_snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.pipeline = self.pipeline.with_snapshot_store(store);
        self
    }

    pub fn pipeline(&self) -> &FramePipeline {
        &self.pipeline
    }

    /// Frames per second clients are told to send at.
    pub fn fps_cap(&self) -> u32 {
        self.fps_cap
    }

    /// Handle one raw text message. `Ok(None)` means no reply is due.
    pub fn handle_text(&mut self, text: &str) -> Result<Option<String>> {
        let message: ClientMessage =
            serde_json::from_str(text).context("Invalid client message")?;
        match self.handle(message) {
            Some(reply) => Ok(Some(serde_json::to_string(&reply)?)),
            None => Ok(None),
        }
    }

    pub fn handle(&mut self, message: ClientMessage) -> Option<ServerMessage> {
        match message {
            ClientMessage::Config {
                snapshots_enabled,
                cooldown_seconds,
            } => {
                if let Some(enabled) = snapshots_enabled {
                    self.pipeline.set_snapshots_enabled(enabled);
                }
                if let Some(seconds) = cooldown_seconds {
                    self.pipeline.set_cooldown(seconds);
                }
                info!(
                    "⚙️  Session config: snapshots={}, cooldown={}s",
                    self.pipeline.snapshots_enabled(),
                    self.pipeline.cooldown_seconds()
                );
                Some(ServerMessage::ConfigAck {
                    snapshots_enabled: self.pipeline.snapshots_enabled(),
                    cooldown_seconds: self.pipeline.cooldown_seconds(),
                })
            }
            ClientMessage::Frame { data } => self.handle_frame(&data).map(ServerMessage::Result),
            ClientMessage::Ping => Some(ServerMessage::Pong),
        }
    }

    fn handle_frame(&mut self, data: &str) -> Option<FrameResult> {
        let frame = match decode_frame(data) {
            Ok(frame) => frame,
            Err(e) => {
                let metrics = self.pipeline.metrics();
                metrics.inc(&metrics.frames_skipped);
                warn!("⚠️  Frame decode error: {:#}", e);
                return None;
            }
        };

        match self.pipeline.process(&frame) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!("⚠️  Frame processing error: {:#}", e);
                None
            }
        }
    }

    /// Close the session: forget tracks and cooldowns, report counters.
    pub fn end(&mut self) -> MetricsSummary {
        self.pipeline.end_session();
        let summary = self.pipeline.metrics().summary();
        info!(
            "👋 Live session ended: {} frame(s), {} alert(s), {} suppressed, {} undecodable",
            summary.frames_processed,
            summary.alerts_raised,
            summary.alerts_suppressed,
            summary.frames_skipped
        );
        summary
    }
}

/// Cooldown from a client: integer, float or numeric string. Fractions are
/// truncated, negatives become 0 (clamped to 1s downstream). Anything else
/// is ignored so the rest of the config message still applies.
fn lenient_seconds<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    let seconds = match &raw {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(match seconds {
        Some(v) if v.is_finite() => Some(v.max(0.0).trunc() as u64),
        _ => {
            if let Some(value) = raw.filter(|v| !v.is_null()) {
                warn!("Ignoring cooldown_seconds={}", value);
            }
            None
        }
    })
}

/// Decode a base64 image payload, with or without a `data:...;base64,` header.
pub fn decode_frame(data: &str) -> Result<Frame> {
    let payload = match data.split_once(',') {
        Some((_, rest)) => rest,
        None => data,
    };
    let bytes = STANDARD
        .decode(payload.trim())
        .context("Frame payload is not base64")?;
    let img = image::load_from_memory(&bytes).context("Frame payload is not an image")?;
    Ok(Frame::from_rgb_image(img.to_rgb8(), 0.0))
}
