use serde::{Deserialize, Serialize};

use crate::capabilities::CameraResult;
use crate::config::PipelineConfig;
use crate::detector::DetectionResult;
use crate::frame::{FrameId, FrameInfo};

// --- Event enum: large variants boxed ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Event {
    // View lifecycle
    ViewAppeared,
    ViewDisappeared,
    ViewResized {
        width: f64,
        height: f64,
    },
    Configure(Box<PipelineConfig>),

    // Camera output: the shell holds the buffer, the core decides whether it
    // is worth running the detector on.
    FrameCaptured(FrameInfo),

    ErrorDismissed,

    // Capability responses
    CameraResponse(Box<CameraResult>),
    DetectionFinished {
        frame_id: FrameId,
        result: Box<DetectionResult>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::ViewAppeared => "view_appeared",
            Event::ViewDisappeared => "view_disappeared",
            Event::ViewResized { .. } => "view_resized",
            Event::Configure(_) => "configure",
            Event::FrameCaptured(_) => "frame_captured",
            Event::ErrorDismissed => "error_dismissed",
            Event::CameraResponse(_) => "camera_response",
            Event::DetectionFinished { .. } => "detection_finished",
        }
    }

    /// Events that arrive once per camera frame. Logged at trace level only.
    pub fn is_per_frame(&self) -> bool {
        matches!(
            self,
            Event::FrameCaptured(_) | Event::DetectionFinished { .. }
        )
    }
}
