use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapter::Topology;

/// Common choices for the minimum landmark score.
pub struct ScoreThreshold;

impl ScoreThreshold {
    pub const LENIENT: f64 = 0.3;
    pub const STRICT: f64 = 0.5;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// Hips are mandatory; missing hips fail the frame.
    Strict,
    /// Falls back to the shoulder-line heuristic when hips are not visible.
    #[default]
    Adaptive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Emit an info line with the current status every this many frames. 0 disables.
    pub log_every_n_frames: u64,
    pub classifier: ClassifierConfig,
    pub adapter: AdapterConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_every_n_frames: 300,
            classifier: ClassifierConfig::default(),
            adapter: AdapterConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Degrees subtracted from 180 to form the slouch boundary.
    pub threshold_angle: f64,
    pub score_threshold: f64,
    pub mode: DetectionMode,
    pub hip: HipTuning,
    pub shoulder: ShoulderTuning,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            threshold_angle: 35.0,
            score_threshold: ScoreThreshold::LENIENT,
            mode: DetectionMode::Adaptive,
            hip: HipTuning::default(),
            shoulder: ShoulderTuning::default(),
        }
    }
}

impl ClassifierConfig {
    pub fn with_mode(mut self, mode: DetectionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_score_threshold(mut self, score_threshold: f64) -> Self {
        self.score_threshold = score_threshold;
        self
    }

    /// Neck-shoulder-hip angle below which the spine counts as collapsed.
    pub fn slouch_boundary(&self) -> f64 {
        180.0 - self.threshold_angle
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.threshold_angle > 0.0 && self.threshold_angle < 180.0) {
            anyhow::bail!("threshold_angle must be in (0, 180), got {}", self.threshold_angle);
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            anyhow::bail!("score_threshold must be in [0, 1], got {}", self.score_threshold);
        }

        let positive = [
            ("hip.confidence_window", self.hip.confidence_window),
            ("shoulder.neck_offset", self.shoulder.neck_offset),
            ("shoulder.y_diff_threshold", self.shoulder.y_diff_threshold),
            ("shoulder.y_diff_scale", self.shoulder.y_diff_scale),
            ("shoulder.line_angle_window", self.shoulder.line_angle_window),
            ("shoulder.ok_window", self.shoulder.ok_window),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                anyhow::bail!("{name} must be positive, got {value}");
            }
        }
        if !(0.0..=90.0).contains(&self.shoulder.max_line_angle) {
            anyhow::bail!(
                "shoulder.max_line_angle must be in [0, 90], got {}",
                self.shoulder.max_line_angle
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HipTuning {
    /// Degrees past the boundary at which confidence saturates.
    pub confidence_window: f64,
}

impl Default for HipTuning {
    fn default() -> Self {
        Self {
            confidence_window: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShoulderTuning {
    /// Upward offset from the shoulder midpoint used as the neck when the nose is missing.
    pub neck_offset: f64,
    /// Neck this far above the shoulder line (normalized units) counts as slouched.
    pub y_diff_threshold: f64,
    pub y_diff_scale: f64,
    /// Neck-shoulder line steeper than this (degrees) counts as slouched.
    pub max_line_angle: f64,
    pub line_angle_window: f64,
    pub ok_window: f64,
}

impl Default for ShoulderTuning {
    fn default() -> Self {
        Self {
            neck_offset: 0.05,
            y_diff_threshold: 0.015,
            y_diff_scale: 0.08,
            max_line_angle: 75.0,
            line_angle_window: 15.0,
            ok_window: 0.03,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub topology: Topology,
    /// Model input size in pixels; set when the backend reports pixel coordinates.
    pub input_size: Option<(u32, u32)>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            topology: Topology::MoveNet17,
            input_size: None,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults when `path` does not exist; a present but broken file is still an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.classifier.validate()?;
        if let Some((w, h)) = self.adapter.input_size {
            if w == 0 || h == 0 {
                anyhow::bail!("adapter.input_size must be non-zero, got {w}x{h}");
            }
        }
        Ok(())
    }
}
