use crux_core::capability::{CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::frame::PixelFormat;

// ============================================================================
// Capability
// ============================================================================

/// Asks the shell to start or stop the live capture session.
#[derive(crux_core::macros::Capability)]
pub struct Camera<Ev> {
    context: CapabilityContext<CameraOperation, Ev>,
}

impl<Ev> Camera<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<CameraOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn start_session<F>(&self, config: SessionConfig, make_event: F)
    where
        F: FnOnce(CameraResult) -> Ev + Send + 'static,
    {
        self.request(CameraOperation::StartSession { config }, make_event);
    }

    pub fn stop_session<F>(&self, make_event: F)
    where
        F: FnOnce(CameraResult) -> Ev + Send + 'static,
    {
        self.request(CameraOperation::StopSession, make_event);
    }

    fn request<F>(&self, operation: CameraOperation, make_event: F)
    where
        F: FnOnce(CameraResult) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let result = ctx.request_from_shell(operation).await;
            ctx.update_app(make_event(result));
        });
    }
}

// ============================================================================
// Operations
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum CameraOperation {
    /// Configure the session if needed, then start running it. Starting a
    /// session that is already configured only resumes it.
    StartSession { config: SessionConfig },
    StopSession,
}

impl Operation for CameraOperation {
    type Output = CameraResult;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraFacing {
    Front,
    #[default]
    Back,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPreset {
    Medium,
    #[default]
    High,
    Photo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub facing: CameraFacing,
    pub preset: SessionPreset,
    /// Drop frames that arrive while the output queue is still busy.
    pub discard_late_frames: bool,
    pub pixel_format: PixelFormat,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            facing: CameraFacing::Back,
            preset: SessionPreset::High,
            discard_late_frames: true,
            pixel_format: PixelFormat::Nv12FullRange,
        }
    }
}

// ============================================================================
// Output
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum CameraOutput {
    SessionStarted { session_id: SessionId },
    SessionStopped,
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("camera {facing:?} not available on this device")]
    DeviceNotFound { facing: CameraFacing },

    #[error("could not create video device input: {reason}")]
    InputUnavailable { reason: String },

    #[error("could not add video device input to the session")]
    CannotAddInput,

    #[error("could not add video data output to the session")]
    CannotAddOutput,

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl CameraError {
    pub fn is_permission_error(&self) -> bool {
        matches!(self, CameraError::PermissionDenied)
    }

    /// Setup failures that leave the session unusable until the app restarts.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            CameraError::DeviceNotFound { .. }
                | CameraError::InputUnavailable { .. }
                | CameraError::CannotAddInput
                | CameraError::CannotAddOutput
        )
    }
}

pub type CameraResult = Result<CameraOutput, CameraError>;
