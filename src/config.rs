// src/config.rs

use crate::types::Config;
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path))?;
        let mut config = Self::from_yaml_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents).context("Invalid config YAML")?;
        Ok(config)
    }

    /// Environment variables used by existing deployments take precedence
    /// over the file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var::<u64, _>(&lookup, "ALERT_COOLDOWN_SECONDS") {
            self.alerts.cooldown_seconds = v.max(1);
        }
        if let Some(v) = lookup("SNAPSHOTS_ENABLED") {
            self.alerts.snapshots_enabled = v.eq_ignore_ascii_case("true");
        }
        if let Some(v) = parse_var::<u32, _>(&lookup, "LIVE_FPS_CAP") {
            self.live.fps_cap = v;
        }
        if let Some(v) = parse_var::<u32, _>(&lookup, "VIDEO_PROCESS_FPS") {
            self.video.target_fps = v.max(1);
        }
        if let Some(v) = lookup("OUTPUTS_DIR") {
            self.video.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.logging.level = v;
        }
        info!(
            "✓ Config: cooldown={}s, snapshots={}, live_fps_cap={}, video_fps={}",
            self.alerts.cooldown_seconds,
            self.alerts.snapshots_enabled,
            self.live.fps_cap,
            self.video.target_fps
        );
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a number", key, raw);
            None
        }
    }
}
