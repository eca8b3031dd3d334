mod camera;
mod detector;

pub use self::camera::{
    Camera, CameraError, CameraFacing, CameraOperation, CameraOutput, CameraResult, SessionConfig,
    SessionId, SessionPreset,
};
pub use self::detector::{DetectOperation, Detector};

// Crux's built-in Render capability covers view updates as is.
pub use crux_core::render::Render;

use crate::app::App;
use crate::event::Event;

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub render: Render<Event>,
    pub camera: Camera<Event>,
    pub detector: Detector<Event>,
}
