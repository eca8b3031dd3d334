//! The Crux app: session lifecycle, frame admission and overlay state.
//!
//! The shell owns the camera and the model runtime. For every captured frame
//! it sends [`Event::FrameCaptured`]; the core either asks for a detection or
//! tells nothing, in which case the shell drops the buffer.

use tracing::{debug, error, info, trace, warn};

use crate::capabilities::{CameraOutput, CameraResult, Capabilities};
use crate::detector::DetectionResult;
use crate::event::Event;
use crate::frame::{FrameId, FrameInfo};
use crate::geometry::ViewSize;
use crate::model::{ErrorView, Model, SessionState, ViewModel};
use crate::overlay::OverlaySink;
use crate::projector::project;
use crate::vision::select_detections;
use crate::AppError;

#[derive(Default)]
pub struct App;

impl App {
    fn start_session(model: &mut Model, caps: &Capabilities) {
        model.session = SessionState::Starting;
        caps.camera.start_session(model.config.camera.clone(), |result| {
            Event::CameraResponse(Box::new(result))
        });
    }

    fn on_camera_response(model: &mut Model, result: CameraResult) {
        match result {
            Ok(CameraOutput::SessionStarted { session_id }) => {
                if model.session_id.is_some_and(|id| id != session_id) {
                    debug!(?session_id, "camera session replaced");
                }
                info!(?session_id, "camera session running");
                model.session_id = Some(session_id);
                model.session = SessionState::Running;
            }
            Ok(CameraOutput::SessionStopped) => {
                info!("camera session stopped");
                if model.session != SessionState::Failed {
                    model.session = SessionState::Stopped;
                }
            }
            Err(e) => {
                error!(error = %e, "camera session setup failed");
                model.session = SessionState::Failed;
                model.set_error(AppError::from(e));
            }
        }
    }

    fn on_frame(model: &mut Model, info: FrameInfo, caps: &Capabilities) {
        if !model.session.accepts_frames() {
            trace!(frame = %info.id, session = ?model.session, "ignoring frame, session not live");
            return;
        }

        if let Err(e) = info.validate() {
            error!(frame = %info.id, error = %e, "camera delivered an invalid frame");
            model.session = SessionState::Failed;
            model.set_error(AppError::from(e).with_context("frame", info.id.to_string()));
            caps.camera.stop_session(|result| Event::CameraResponse(Box::new(result)));
            caps.render.render();
            return;
        }

        if !model.gate.try_admit() {
            trace!(frame = %info.id, "detector busy, dropping frame");
            return;
        }

        debug!(frame = %info.id, "frame admitted");
        model.in_flight = Some(info.id);

        let frame = FrameInfo {
            orientation: model.config.orientation,
            ..info
        };
        let frame_id = frame.id;
        caps.detector.detect(frame, move |result| Event::DetectionFinished {
            frame_id,
            result: Box::new(result),
        });
    }

    fn on_detection(model: &mut Model, frame_id: FrameId, result: DetectionResult, caps: &Capabilities) {
        // Only the admitted frame may release the gate.
        if model.in_flight != Some(frame_id) {
            warn!(frame = %frame_id, expected = ?model.in_flight, "ignoring stale detection result");
            return;
        }
        model.in_flight = None;

        let observations = result.unwrap_or_else(|e| {
            warn!(frame = %frame_id, error = %e, "detection failed, treating as no hands");
            Vec::new()
        });

        let detections = select_detections(&observations, model.config.confidence_threshold);
        let rects = match model.view_size {
            Some(size) => project(&detections, size, &model.config.overlay),
            None => {
                debug!(frame = %frame_id, "view size unknown, nothing to draw");
                Vec::new()
            }
        };

        model.gate.release();
        model.frames_processed += 1;
        model.last_detection_count = rects.len();

        if rects.is_empty() && !model.config.clear_overlay_on_empty {
            return;
        }
        model.overlay.show(&rects);
        caps.render.render();
    }
}

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        if event.is_per_frame() {
            trace!(event = event.name(), "update");
        } else {
            debug!(event = event.name(), "update");
        }

        match event {
            Event::ViewAppeared => match model.session {
                SessionState::Starting | SessionState::Running => {}
                SessionState::Failed => {
                    debug!("camera session failed earlier, not restarting");
                }
                SessionState::Idle | SessionState::Stopping | SessionState::Stopped => {
                    Self::start_session(model, caps);
                    caps.render.render();
                }
            },

            Event::ViewDisappeared => {
                if matches!(model.session, SessionState::Starting | SessionState::Running) {
                    model.session = SessionState::Stopping;
                    caps.camera.stop_session(|result| Event::CameraResponse(Box::new(result)));
                    caps.render.render();
                }
            }

            Event::ViewResized { width, height } => match ViewSize::new(width, height) {
                Ok(size) => model.view_size = Some(size),
                Err(e) => debug!(error = %e, "ignoring degenerate view size"),
            },

            Event::Configure(config) => {
                match config.validate() {
                    Ok(()) => {
                        info!("pipeline configuration updated");
                        model.config = *config;
                    }
                    Err(e) => {
                        warn!(error = %e, "rejected pipeline configuration");
                        model.set_error(AppError::from(e));
                    }
                }
                caps.render.render();
            }

            Event::FrameCaptured(info) => Self::on_frame(model, info, caps),

            Event::DetectionFinished { frame_id, result } => {
                Self::on_detection(model, frame_id, *result, caps);
            }

            Event::CameraResponse(result) => {
                Self::on_camera_response(model, *result);
                caps.render.render();
            }

            Event::ErrorDismissed => {
                if model.error.as_ref().is_some_and(AppError::is_fatal) {
                    debug!("fatal error dismissed, session stays failed");
                }
                model.error = None;
                caps.render.render();
            }
        }
    }

    fn view(&self, model: &Model) -> ViewModel {
        ViewModel {
            session: model.session,
            rects: model.overlay.detection_rects(),
            detecting: model.gate.is_busy(),
            gate: model.gate.snapshot(),
            frames_processed: model.frames_processed,
            last_detection_count: model.last_detection_count,
            error: model.error.as_ref().map(ErrorView::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{CameraError, CameraOperation, DetectOperation, SessionId};
    use crate::capabilities::Effect;
    use crate::frame::{FrameOrientation, PixelFormat};
    use crate::geometry::{NormalizedRect, PixelRect};
    use crate::projector::ColorTag;
    use crate::vision::{ClassCandidate, Observation};
    use crate::ErrorKind;
    use crux_core::testing::AppTester;

    fn frame(id: u64) -> FrameInfo {
        FrameInfo {
            id: FrameId(id),
            width: 1920,
            height: 1080,
            pixel_format: PixelFormat::Nv12FullRange,
            orientation: FrameOrientation::Up,
            timestamp_ms: id * 33,
        }
    }

    fn running_model() -> Model {
        Model {
            session: SessionState::Running,
            view_size: Some(ViewSize::new(400.0, 800.0).unwrap()),
            ..Model::default()
        }
    }

    fn hand() -> Observation {
        Observation {
            labels: vec![ClassCandidate::new("left", 0.9), ClassCandidate::new("right", 0.4)],
            confidence: 0.9,
            bounding_box: NormalizedRect::new(0.25, 0.25, 0.5, 0.5).unwrap(),
        }
    }

    #[test]
    fn appear_starts_session() {
        let app = AppTester::<App, Effect>::default();
        let mut model = Model::default();

        let update = app.update(Event::ViewAppeared, &mut model);

        assert_eq!(model.session, SessionState::Starting);
        let mut camera = update
            .effects
            .into_iter()
            .find_map(|effect| match effect {
                Effect::Camera(request) => Some(request),
                _ => None,
            })
            .expect("camera effect");
        assert!(matches!(camera.operation, CameraOperation::StartSession { .. }));

        let update = app
            .resolve(
                &mut camera,
                Ok(CameraOutput::SessionStarted {
                    session_id: SessionId::new(),
                }),
            )
            .unwrap();
        for event in update.events {
            app.update(event, &mut model);
        }
        assert_eq!(model.session, SessionState::Running);
    }

    #[test]
    fn appear_while_running_is_noop() {
        let app = AppTester::<App, Effect>::default();
        let mut model = running_model();
        let update = app.update(Event::ViewAppeared, &mut model);
        assert!(update.effects.is_empty());
    }

    #[test]
    fn frame_requests_detection_with_configured_orientation() {
        let app = AppTester::<App, Effect>::default();
        let mut model = running_model();

        let update = app.update(Event::FrameCaptured(frame(1)), &mut model);

        let request = update
            .effects
            .into_iter()
            .find_map(|effect| match effect {
                Effect::Detector(request) => Some(request),
                _ => None,
            })
            .expect("detector effect");
        let DetectOperation::Detect { frame } = request.operation.clone();
        assert_eq!(frame.id, FrameId(1));
        assert_eq!(frame.orientation, FrameOrientation::Right);
        assert_eq!(model.in_flight, Some(FrameId(1)));
    }

    #[test]
    fn busy_gate_drops_frames_without_effects() {
        let app = AppTester::<App, Effect>::default();
        let mut model = running_model();

        let _ = app.update(Event::FrameCaptured(frame(1)), &mut model);
        let update = app.update(Event::FrameCaptured(frame(2)), &mut model);

        assert!(update.effects.is_empty());
        assert_eq!(model.gate.snapshot().dropped, 1);
        assert_eq!(model.in_flight, Some(FrameId(1)));
    }

    #[test]
    fn detection_draws_and_releases() {
        let app = AppTester::<App, Effect>::default();
        let mut model = running_model();
        let _ = app.update(Event::FrameCaptured(frame(1)), &mut model);

        let update = app.update(
            Event::DetectionFinished {
                frame_id: FrameId(1),
                result: Box::new(Ok(vec![hand()])),
            },
            &mut model,
        );

        assert!(update.effects.iter().any(|e| matches!(e, Effect::Render(_))));
        assert!(!model.gate.is_busy());
        let view = app.view(&model);
        assert_eq!(view.rects.len(), 1);
        assert_eq!(view.rects[0].color, ColorTag::Red);
        assert_eq!(view.rects[0].rect, PixelRect::new(100.0, 200.0, 200.0, 400.0));
        assert_eq!(view.last_detection_count, 1);
    }

    #[test]
    fn failed_detection_keeps_overlay_and_releases() {
        let app = AppTester::<App, Effect>::default();
        let mut model = running_model();

        let _ = app.update(Event::FrameCaptured(frame(1)), &mut model);
        let _ = app.update(
            Event::DetectionFinished {
                frame_id: FrameId(1),
                result: Box::new(Ok(vec![hand()])),
            },
            &mut model,
        );
        let _ = app.update(Event::FrameCaptured(frame(2)), &mut model);
        let update = app.update(
            Event::DetectionFinished {
                frame_id: FrameId(2),
                result: Box::new(Err(crate::detector::DetectorError::Aborted)),
            },
            &mut model,
        );

        assert!(update.effects.is_empty());
        assert!(!model.gate.is_busy());
        assert_eq!(app.view(&model).rects.len(), 1);
        assert!(model.error.is_none());
    }

    #[test]
    fn stale_result_does_not_release_gate() {
        let app = AppTester::<App, Effect>::default();
        let mut model = running_model();
        let _ = app.update(Event::FrameCaptured(frame(2)), &mut model);

        let update = app.update(
            Event::DetectionFinished {
                frame_id: FrameId(1),
                result: Box::new(Ok(vec![hand()])),
            },
            &mut model,
        );

        assert!(update.effects.is_empty());
        assert!(model.gate.is_busy());
        assert_eq!(model.in_flight, Some(FrameId(2)));
        assert_eq!(model.frames_processed, 0);
        assert!(app.view(&model).rects.is_empty());

        // A second frame still cannot get in.
        let update = app.update(Event::FrameCaptured(frame(3)), &mut model);
        assert!(update.effects.is_empty());
        assert_eq!(model.gate.snapshot().dropped, 1);
    }

    #[test]
    fn duplicate_result_is_ignored() {
        let app = AppTester::<App, Effect>::default();
        let mut model = running_model();
        let _ = app.update(Event::FrameCaptured(frame(1)), &mut model);
        let finished = || Event::DetectionFinished {
            frame_id: FrameId(1),
            result: Box::new(Ok(vec![hand()])),
        };
        let _ = app.update(finished(), &mut model);
        let update = app.update(finished(), &mut model);

        assert!(update.effects.is_empty());
        assert_eq!(model.frames_processed, 1);
        assert_eq!(model.gate.snapshot().released, 1);
    }

    #[test]
    fn invalid_frame_fails_session() {
        let app = AppTester::<App, Effect>::default();
        let mut model = running_model();

        let mut bad = frame(1);
        bad.width = 0;
        let update = app.update(Event::FrameCaptured(bad), &mut model);

        assert_eq!(model.session, SessionState::Failed);
        assert!(model.error.as_ref().unwrap().is_fatal());
        assert!(!update.effects.iter().any(|e| matches!(e, Effect::Detector(_))));

        // Later frames are ignored.
        let update = app.update(Event::FrameCaptured(frame(2)), &mut model);
        assert!(update.effects.is_empty());
        assert_eq!(model.gate.snapshot().admitted, 0);
    }

    #[test]
    fn camera_setup_failure_is_reported() {
        let app = AppTester::<App, Effect>::default();
        let mut model = Model {
            session: SessionState::Starting,
            ..Model::default()
        };

        let _ = app.update(
            Event::CameraResponse(Box::new(Err(CameraError::CannotAddInput))),
            &mut model,
        );

        assert_eq!(model.session, SessionState::Failed);
        let view = app.view(&model);
        assert_eq!(view.error.unwrap().code, "CAMERA_CONFIGURATION_ERROR");
    }

    #[test]
    fn degenerate_resize_is_ignored() {
        let app = AppTester::<App, Effect>::default();
        let mut model = running_model();
        let _ = app.update(Event::ViewResized { width: 0.0, height: 10.0 }, &mut model);
        assert_eq!(model.view_size, Some(ViewSize::new(400.0, 800.0).unwrap()));
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let app = AppTester::<App, Effect>::default();
        let mut model = Model::default();
        let config = crate::PipelineConfig {
            confidence_threshold: 2.0,
            ..crate::PipelineConfig::default()
        };
        let _ = app.update(Event::Configure(Box::new(config)), &mut model);

        assert!((model.config.confidence_threshold - 0.1).abs() < f32::EPSILON);
        assert_eq!(model.error.as_ref().unwrap().kind, ErrorKind::Configuration);
    }
}
