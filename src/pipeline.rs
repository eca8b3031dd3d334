//! Native frame pipeline: admission, detection, projection, delivery.
//!
//! Camera threads call [`DetectionPipeline::submit`] for every frame. At most
//! one frame is in detection at a time; frames arriving meanwhile are dropped
//! on the spot. When a detection completes, its result is filtered, projected
//! into view space, the gate is released, and the rects are sent to the UI.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, instrument, warn};

use crate::config::{ConfigError, PipelineConfig};
use crate::detector::{dispatch, DetectionTicket, HandDetector};
use crate::frame::{Frame, FrameError, FrameInfo};
use crate::gate::{AdmissionGate, GateSnapshot};
use crate::geometry::ViewSize;
use crate::overlay::{OverlayReceiver, OverlaySender, OverlayUpdate};
use crate::projector::project;
use crate::vision::select_detections;

/// Outcome of offering a frame to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Admission {
    Admitted,
    /// The detector was busy; the frame was discarded.
    Dropped,
}

pub struct DetectionPipeline<D: HandDetector + ?Sized> {
    detector: Arc<D>,
    gate: Arc<AdmissionGate>,
    config: Arc<PipelineConfig>,
    view_size: watch::Sender<ViewSize>,
    overlay_tx: Arc<OverlaySender>,
    handle: Handle,
}

impl<D: HandDetector + ?Sized> DetectionPipeline<D> {
    /// Builds a pipeline whose tasks run on `handle`. The returned receiver
    /// belongs to the UI context.
    pub fn new(
        detector: Arc<D>,
        config: PipelineConfig,
        view_size: ViewSize,
        handle: Handle,
    ) -> Result<(Self, OverlayReceiver), ConfigError> {
        config.validate()?;
        let (overlay_tx, overlay) = OverlayReceiver::channel();
        let (view_size, _) = watch::channel(view_size);

        let pipeline = Self {
            detector,
            gate: Arc::new(AdmissionGate::new()),
            config: Arc::new(config),
            view_size,
            overlay_tx: Arc::new(overlay_tx),
            handle,
        };
        Ok((pipeline, overlay))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Offers a frame. Never blocks: either the frame starts detection or it
    /// is dropped because another frame is still in flight.
    #[instrument(skip(self, frame), fields(frame = %frame.id()))]
    pub fn submit(&self, frame: Frame) -> Admission {
        if !self.gate.try_admit() {
            debug!("detector busy, dropping frame");
            return Admission::Dropped;
        }
        debug!("frame admitted");

        let ticket = dispatch(Arc::clone(&self.detector), frame, &self.handle);
        let completion = Completion {
            gate: Arc::clone(&self.gate),
            config: Arc::clone(&self.config),
            view_size: self.view_size.subscribe(),
            overlay_tx: Arc::clone(&self.overlay_tx),
        };
        self.handle.spawn(completion.run(ticket));
        Admission::Admitted
    }

    /// Validates a raw camera buffer and submits it.
    ///
    /// A buffer that does not match its metadata is a producer bug; it is
    /// reported and never reaches the gate.
    pub fn submit_buffer(&self, info: FrameInfo, pixels: Vec<u8>) -> Result<Admission, FrameError> {
        let frame = Frame::new(info, pixels).map_err(|err| {
            error!(frame = %info.id, error = %err, "camera delivered an invalid frame");
            err
        })?;
        Ok(self.submit(frame))
    }

    /// Updates the size used for frames that complete from now on.
    pub fn set_view_size(&self, size: ViewSize) {
        self.view_size.send_replace(size);
    }

    pub fn view_size(&self) -> ViewSize {
        *self.view_size.borrow()
    }

    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    pub fn gate_snapshot(&self) -> GateSnapshot {
        self.gate.snapshot()
    }
}

/// Everything the completion of one detection needs, detached from the
/// pipeline so it can outlive the caller of `submit`.
struct Completion {
    gate: Arc<AdmissionGate>,
    config: Arc<PipelineConfig>,
    view_size: watch::Receiver<ViewSize>,
    overlay_tx: Arc<OverlaySender>,
}

impl Completion {
    #[instrument(skip_all, fields(frame = %ticket.frame_id()))]
    async fn run(self, ticket: DetectionTicket) {
        let frame_id = ticket.frame_id();
        let observations = match ticket.wait().await {
            Ok(observations) => observations,
            Err(err) => {
                warn!(error = %err, "detection failed, treating as no hands");
                Vec::new()
            }
        };

        let detections = select_detections(&observations, self.config.confidence_threshold);
        let view_size = *self.view_size.borrow();
        let rects = project(&detections, view_size, &self.config.overlay);

        // The next frame may start as soon as the rects exist.
        self.gate.release();

        if rects.is_empty() && !self.config.clear_overlay_on_empty {
            debug!("no detections, keeping previous overlay");
            return;
        }

        // Replaces any update the UI has not picked up yet; never waits.
        debug!(rects = rects.len(), "delivering overlay update");
        if self
            .overlay_tx
            .send(Some(OverlayUpdate { frame_id, rects }))
            .is_err()
        {
            debug!("overlay receiver gone");
        }
    }
}
