use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::SessionConfig;
use crate::frame::FrameOrientation;
use crate::projector::OverlayStyle;
use crate::vision::{default_class_labels, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_MODEL_INPUT};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Validation(String),
}

/// Input geometry and class order of the hand model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub input_width: u32,
    pub input_height: u32,
    pub class_labels: Vec<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            input_width: DEFAULT_MODEL_INPUT,
            input_height: DEFAULT_MODEL_INPUT,
            class_labels: default_class_labels(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Observations must be strictly above this to be drawn.
    pub confidence_threshold: f32,
    /// Orientation attached to frames handed to the detector.
    pub orientation: FrameOrientation,
    pub camera: SessionConfig,
    pub overlay: OverlayStyle,
    /// Clear the overlay when a frame yields no detections instead of
    /// keeping the last drawn boxes.
    pub clear_overlay_on_empty: bool,
    pub model: ModelConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            orientation: FrameOrientation::Right,
            camera: SessionConfig::default(),
            overlay: OverlayStyle::default(),
            clear_overlay_on_empty: false,
            model: ModelConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.confidence_threshold.is_finite()
            || !(0.0..1.0).contains(&self.confidence_threshold)
        {
            return Err(ConfigError::Validation(format!(
                "confidence_threshold must be in [0, 1), got {}",
                self.confidence_threshold
            )));
        }
        if self.model.input_width == 0 || self.model.input_height == 0 {
            return Err(ConfigError::Validation(
                "model input dimensions must be > 0".into(),
            ));
        }
        if self.model.class_labels.is_empty() {
            return Err(ConfigError::Validation(
                "model.class_labels must not be empty".into(),
            ));
        }
        if self.model.class_labels.iter().any(|l| l.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "model.class_labels must not contain blank labels".into(),
            ));
        }
        Ok(())
    }
}
