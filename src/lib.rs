// lib.rs - shared core of the live hand tracking app

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod app;
pub mod capabilities;
pub mod config;
pub mod detector;
pub mod event;
pub mod frame;
pub mod gate;
pub mod geometry;
pub mod model;
pub mod overlay;
pub mod pipeline;
pub mod projector;
pub mod vision;

#[cfg(feature = "ml")]
pub mod onnx_detector;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::capabilities::CameraError;
use crate::config::ConfigError;
use crate::detector::DetectorError;
use crate::frame::FrameError;

pub use app::App;
pub use capabilities::{Capabilities, Effect};
pub use config::PipelineConfig;
pub use crux_core::{render::Render, App as CruxApp};
pub use detector::HandDetector;
pub use event::Event;
pub use gate::AdmissionGate;
pub use model::{Model, ViewModel};
pub use pipeline::{Admission, DetectionPipeline};
pub use projector::{project, ColorTag, ViewRect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Camera,
    CameraPermissionDenied,
    CameraUnavailable,
    CameraConfiguration,
    InvalidFrame,
    Detection,
    Configuration,
    InvalidState,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Camera => "CAMERA_ERROR",
            Self::CameraPermissionDenied => "CAMERA_PERMISSION_DENIED",
            Self::CameraUnavailable => "CAMERA_UNAVAILABLE",
            Self::CameraConfiguration => "CAMERA_CONFIGURATION_ERROR",
            Self::InvalidFrame => "INVALID_FRAME",
            Self::Detection => "DETECTION_ERROR",
            Self::Configuration => "CONFIGURATION_ERROR",
            Self::InvalidState => "INVALID_STATE",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub const fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::Camera | Self::Detection => ErrorSeverity::Transient,

            Self::CameraPermissionDenied
            | Self::CameraUnavailable
            | Self::CameraConfiguration
            | Self::Configuration => ErrorSeverity::Permanent,

            Self::InvalidFrame | Self::InvalidState | Self::Internal => ErrorSeverity::Fatal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
    pub internal_message: Option<String>,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            internal_message: None,
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self.severity, ErrorSeverity::Fatal)
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::Camera => "Camera error. Please close and reopen the app.".into(),
            ErrorKind::CameraPermissionDenied => {
                "Camera access is required. Please enable camera permissions in Settings.".into()
            }
            ErrorKind::CameraUnavailable => "No suitable camera was found on this device.".into(),
            ErrorKind::CameraConfiguration => {
                "The camera could not be set up for live tracking.".into()
            }
            ErrorKind::InvalidFrame => {
                "The camera delivered an unreadable frame. Hand tracking has stopped.".into()
            }
            ErrorKind::Detection => "Hand detection is temporarily unavailable.".into(),
            ErrorKind::Configuration => self.message.clone(),
            ErrorKind::InvalidState => {
                "The app is in an invalid state. Please restart the app.".into()
            }
            ErrorKind::Internal => "An unexpected error occurred. Please restart the app.".into(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " (internal: {internal})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

impl From<CameraError> for AppError {
    fn from(e: CameraError) -> Self {
        let kind = match &e {
            CameraError::PermissionDenied => ErrorKind::CameraPermissionDenied,
            CameraError::DeviceNotFound { .. } => ErrorKind::CameraUnavailable,
            CameraError::InputUnavailable { .. }
            | CameraError::CannotAddInput
            | CameraError::CannotAddOutput => ErrorKind::CameraConfiguration,
            CameraError::Internal { .. } => ErrorKind::Camera,
        };
        AppError::new(kind, e.to_string())
    }
}

impl From<FrameError> for AppError {
    fn from(e: FrameError) -> Self {
        AppError::new(ErrorKind::InvalidFrame, e.to_string())
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::new(ErrorKind::Configuration, e.to_string())
    }
}

impl From<DetectorError> for AppError {
    fn from(e: DetectorError) -> Self {
        let error = AppError::new(ErrorKind::Detection, "hand detection failed")
            .with_internal(e.to_string());
        match e {
            DetectorError::Unavailable { .. } => error.with_severity(ErrorSeverity::Permanent),
            _ => error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::CameraFacing;

    #[test]
    fn camera_errors_map_to_kinds() {
        assert_eq!(
            AppError::from(CameraError::PermissionDenied).kind,
            ErrorKind::CameraPermissionDenied
        );
        assert_eq!(
            AppError::from(CameraError::DeviceNotFound {
                facing: CameraFacing::Back
            })
            .kind,
            ErrorKind::CameraUnavailable
        );
        assert_eq!(
            AppError::from(CameraError::CannotAddOutput).kind,
            ErrorKind::CameraConfiguration
        );
    }

    #[test]
    fn invalid_frame_is_fatal() {
        let error = AppError::from(FrameError::EmptyBuffer);
        assert!(error.is_fatal());
        assert_eq!(error.code(), "INVALID_FRAME");
    }

    #[test]
    fn detector_errors_keep_detail_internal() {
        let error = AppError::from(DetectorError::Inference {
            message: "tensor shape".into(),
        });
        assert_eq!(error.severity, ErrorSeverity::Transient);
        assert!(error.internal_message.unwrap().contains("tensor shape"));
    }

    #[test]
    fn display_includes_code_and_internal() {
        let error = AppError::new(ErrorKind::Internal, "boom").with_internal("detail");
        assert_eq!(error.to_string(), "[INTERNAL_ERROR] boom (internal: detail)");
    }

    #[test]
    fn configuration_message_is_shown_verbatim() {
        let error = AppError::from(ConfigError::Validation("bad threshold".into()));
        assert!(error.user_facing_message().contains("bad threshold"));
    }
}
