//! Hand detector seam.
//!
//! The model itself is opaque: anything that turns a [`Frame`] into a list of
//! [`Observation`]s can drive the pipeline. Each dispatched detection reports
//! back exactly once through a one-shot channel.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, Instrument};

use crate::frame::{Frame, FrameError, FrameId};
use crate::vision::{Observation, VisionError};

#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum DetectorError {
    #[error("detector unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("inference failed: {message}")]
    Inference { message: String },

    #[error("could not decode model output: {0}")]
    Decode(String),

    #[error("frame rejected: {0}")]
    Frame(#[from] FrameError),

    #[error("detection aborted before completion")]
    Aborted,
}

impl From<VisionError> for DetectorError {
    fn from(err: VisionError) -> Self {
        DetectorError::Decode(err.to_string())
    }
}

pub type DetectionResult = Result<Vec<Observation>, DetectorError>;

#[async_trait]
pub trait HandDetector: Send + Sync + 'static {
    /// Runs the model on one frame. Called at most once per frame.
    async fn detect(&self, frame: &Frame) -> DetectionResult;
}

// ============================================================================
// Dispatch
// ============================================================================

/// Completion handle of one dispatched detection.
#[derive(Debug)]
pub struct DetectionTicket {
    frame_id: FrameId,
    rx: oneshot::Receiver<DetectionResult>,
}

impl DetectionTicket {
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Resolves once the detector finishes. A detector task that panicked or
    /// was dropped resolves to [`DetectorError::Aborted`].
    pub async fn wait(self) -> DetectionResult {
        self.rx.await.unwrap_or(Err(DetectorError::Aborted))
    }
}

/// Spawns `detector` on `frame` without blocking the caller.
pub fn dispatch<D>(detector: Arc<D>, frame: Frame, handle: &Handle) -> DetectionTicket
where
    D: HandDetector + ?Sized,
{
    let frame_id = frame.id();
    let (tx, rx) = oneshot::channel();
    let span = tracing::debug_span!("detect", frame = %frame_id);

    handle.spawn(
        async move {
            let result = detector.detect(&frame).await;
            debug!(ok = result.is_ok(), "detector returned");
            // Receiver gone means nobody waits for this frame any more.
            let _ = tx.send(result);
        }
        .instrument(span),
    );

    DetectionTicket { frame_id, rx }
}

// ============================================================================
// Test doubles
// ============================================================================

#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Semaphore;

    /// What a [`ScriptedDetector`] does on its next call.
    #[derive(Debug, Clone)]
    pub enum Scripted {
        Observations(Vec<Observation>),
        Fail(DetectorError),
        Panic,
    }

    /// Detector that replays queued responses, optionally holding each call
    /// until the test lets it through.
    #[derive(Debug, Default)]
    pub struct ScriptedDetector {
        script: Mutex<VecDeque<Scripted>>,
        calls: AtomicUsize,
        seen: Mutex<Vec<FrameId>>,
        hold: Option<Semaphore>,
    }

    impl ScriptedDetector {
        pub fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
                ..Self::default()
            }
        }

        /// Every call blocks until [`ScriptedDetector::finish_one`] is called.
        pub fn held(script: impl IntoIterator<Item = Scripted>) -> Self {
            Self {
                hold: Some(Semaphore::new(0)),
                ..Self::new(script)
            }
        }

        pub fn finish_one(&self) {
            if let Some(hold) = &self.hold {
                hold.add_permits(1);
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn seen(&self) -> Vec<FrameId> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HandDetector for ScriptedDetector {
        async fn detect(&self, frame: &Frame) -> DetectionResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(frame.id());

            if let Some(hold) = &self.hold {
                hold.acquire().await.unwrap().forget();
            }

            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Scripted::Observations(observations)) => Ok(observations),
                Some(Scripted::Fail(err)) => Err(err),
                Some(Scripted::Panic) => panic!("scripted detector panic"),
                None => Ok(Vec::new()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Scripted, ScriptedDetector};
    use super::*;
    use crate::frame::{FrameInfo, FrameOrientation, PixelFormat};
    use crate::geometry::NormalizedRect;
    use crate::vision::ClassCandidate;

    fn frame(id: u64) -> Frame {
        Frame::new(
            FrameInfo {
                id: FrameId(id),
                width: 2,
                height: 2,
                pixel_format: PixelFormat::Rgba8,
                orientation: FrameOrientation::Right,
                timestamp_ms: 0,
            },
            vec![0; 16],
        )
        .unwrap()
    }

    fn hand() -> Observation {
        Observation {
            labels: vec![ClassCandidate::new("left", 0.8)],
            confidence: 0.8,
            bounding_box: NormalizedRect::new(0.1, 0.1, 0.2, 0.2).unwrap(),
        }
    }

    #[tokio::test]
    async fn ticket_delivers_observations() {
        let detector = Arc::new(ScriptedDetector::new([Scripted::Observations(vec![hand()])]));
        let ticket = dispatch(detector.clone(), frame(7), &Handle::current());

        assert_eq!(ticket.frame_id(), FrameId(7));
        assert_eq!(ticket.wait().await.unwrap(), vec![hand()]);
        assert_eq!(detector.seen(), vec![FrameId(7)]);
    }

    #[tokio::test]
    async fn ticket_delivers_errors() {
        let err = DetectorError::Inference {
            message: "boom".into(),
        };
        let detector = Arc::new(ScriptedDetector::new([Scripted::Fail(err.clone())]));
        let result = dispatch(detector, frame(1), &Handle::current()).wait().await;
        assert_eq!(result, Err(err));
    }

    #[tokio::test]
    async fn panicking_detector_aborts_ticket() {
        let detector = Arc::new(ScriptedDetector::new([Scripted::Panic]));
        let result = dispatch(detector, frame(1), &Handle::current()).wait().await;
        assert_eq!(result, Err(DetectorError::Aborted));
    }

    #[tokio::test]
    async fn held_detector_waits_for_release() {
        let detector = Arc::new(ScriptedDetector::held([Scripted::Observations(vec![hand()])]));
        let mut ticket = dispatch(detector.clone(), frame(3), &Handle::current());

        tokio::task::yield_now().await;
        assert!(ticket.rx.try_recv().is_err());

        detector.finish_one();
        assert_eq!(ticket.wait().await.unwrap().len(), 1);
    }

    #[test]
    fn vision_errors_become_decode_errors() {
        let err: DetectorError = VisionError::TooManyRows(20_000).into();
        assert!(matches!(err, DetectorError::Decode(_)));
    }
}
