use crux_core::capability::{CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

use crate::detector::DetectionResult;
use crate::frame::FrameInfo;

/// Asks the shell to run the hand model on a frame it still holds.
///
/// Pixel buffers never cross the bridge: the shell keeps the buffer for the
/// frame it announced and the core refers to it by [`FrameInfo`].
#[derive(crux_core::macros::Capability)]
pub struct Detector<Ev> {
    context: CapabilityContext<DetectOperation, Ev>,
}

impl<Ev> Detector<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<DetectOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn detect<F>(&self, frame: FrameInfo, make_event: F)
    where
        F: FnOnce(DetectionResult) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let result = ctx
                .request_from_shell(DetectOperation::Detect { frame })
                .await;
            ctx.update_app(make_event(result));
        });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DetectOperation {
    Detect { frame: FrameInfo },
}

impl Operation for DetectOperation {
    type Output = DetectionResult;
}
