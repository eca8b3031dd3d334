use serde::{Deserialize, Serialize};

use crate::capabilities::SessionId;
use crate::config::PipelineConfig;
use crate::frame::FrameId;
use crate::gate::{AdmissionGate, GateSnapshot};
use crate::geometry::ViewSize;
use crate::overlay::OverlayCanvas;
use crate::projector::ViewRect;
use crate::AppError;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
    /// Setup failed or the camera broke its contract. Frames are ignored
    /// until the app restarts.
    Failed,
}

impl SessionState {
    pub fn accepts_frames(self) -> bool {
        matches!(self, SessionState::Starting | SessionState::Running)
    }
}

#[derive(Default, Debug)]
pub struct Model {
    pub config: PipelineConfig,
    pub session: SessionState,
    pub session_id: Option<SessionId>,
    pub view_size: Option<ViewSize>,
    pub gate: AdmissionGate,
    /// Frame currently out for detection, if any.
    pub in_flight: Option<FrameId>,
    pub overlay: OverlayCanvas,
    pub frames_processed: u64,
    pub last_detection_count: usize,
    pub error: Option<AppError>,
}

impl Model {
    pub fn set_error(&mut self, error: AppError) {
        self.error = Some(error);
    }
}

// --- View model ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorView {
    pub code: String,
    pub message: String,
    pub is_fatal: bool,
}

impl From<&AppError> for ErrorView {
    fn from(error: &AppError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.user_facing_message(),
            is_fatal: error.is_fatal(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ViewModel {
    pub session: SessionState,
    pub rects: Vec<ViewRect>,
    pub detecting: bool,
    pub gate: GateSnapshot,
    pub frames_processed: u64,
    pub last_detection_count: usize,
    pub error: Option<ErrorView>,
}
