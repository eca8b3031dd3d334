//! Overlay drawing surface.
//!
//! The UI owns an [`OverlaySink`]. Each processed frame replaces the
//! detection layers it drew last time; layers added by anything else are
//! left alone.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::frame::FrameId;
use crate::projector::ViewRect;

/// Receives the rects of one processed frame. Showing the same list twice
/// leaves the surface unchanged.
pub trait OverlaySink {
    fn show(&mut self, rects: &[ViewRect]);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OverlayLayer {
    Detection(ViewRect),
    /// A layer this crate did not draw, kept across updates.
    Foreign { name: String },
}

/// In-memory overlay: the layer tree the shell mirrors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverlayCanvas {
    layers: Vec<OverlayLayer>,
}

impl OverlayCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_foreign_layer(&mut self, name: impl Into<String>) {
        self.layers.push(OverlayLayer::Foreign { name: name.into() });
    }

    pub fn layers(&self) -> &[OverlayLayer] {
        &self.layers
    }

    pub fn detection_rects(&self) -> Vec<ViewRect> {
        self.layers
            .iter()
            .filter_map(|layer| match layer {
                OverlayLayer::Detection(rect) => Some(*rect),
                OverlayLayer::Foreign { .. } => None,
            })
            .collect()
    }

    pub fn detection_count(&self) -> usize {
        self.layers
            .iter()
            .filter(|layer| matches!(layer, OverlayLayer::Detection(_)))
            .count()
    }

    pub fn clear_detections(&mut self) {
        self.show(&[]);
    }
}

impl OverlaySink for OverlayCanvas {
    fn show(&mut self, rects: &[ViewRect]) {
        self.layers
            .retain(|layer| !matches!(layer, OverlayLayer::Detection(_)));
        self.layers
            .extend(rects.iter().copied().map(OverlayLayer::Detection));
    }
}

// ============================================================================
// Delivery to the UI context
// ============================================================================

/// Rects produced for one frame, on their way to the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayUpdate {
    pub frame_id: FrameId,
    pub rects: Vec<ViewRect>,
}

/// Sending half: holds the newest update only.
pub(crate) type OverlaySender = watch::Sender<Option<OverlayUpdate>>;

/// UI-side end of the overlay channel.
///
/// Only the newest update is kept. A UI that stops reading never causes
/// updates to queue up behind it; it sees the latest frame when it resumes.
#[derive(Debug)]
pub struct OverlayReceiver {
    rx: watch::Receiver<Option<OverlayUpdate>>,
}

impl OverlayReceiver {
    pub(crate) fn channel() -> (OverlaySender, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self { rx })
    }

    /// Waits for an update newer than the last one seen. `None` once the
    /// pipeline is gone and nothing new is left.
    pub async fn recv(&mut self) -> Option<OverlayUpdate> {
        self.rx.changed().await.ok()?;
        (*self.rx.borrow_and_update()).clone()
    }

    /// Shows the newest update without waiting, if one arrived since the
    /// last call.
    ///
    /// Returns the frame that ended up on screen.
    pub fn apply_pending<S: OverlaySink + ?Sized>(&mut self, sink: &mut S) -> Option<FrameId> {
        let update = {
            let current = self.rx.borrow_and_update();
            if !current.has_changed() {
                return None;
            }
            (*current).clone()?
        };
        sink.show(&update.rects);
        Some(update.frame_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PixelRect;
    use crate::projector::ColorTag;

    fn rect(x: f64) -> ViewRect {
        ViewRect {
            color: ColorTag::Red,
            rect: PixelRect::new(x, 0.0, 10.0, 10.0),
        }
    }

    #[test]
    fn show_replaces_previous_detections() {
        let mut canvas = OverlayCanvas::new();
        canvas.show(&[rect(1.0), rect(2.0)]);
        canvas.show(&[rect(3.0)]);
        assert_eq!(canvas.detection_rects(), vec![rect(3.0)]);
    }

    #[test]
    fn show_is_idempotent() {
        let mut canvas = OverlayCanvas::new();
        canvas.add_foreign_layer("preview");
        canvas.show(&[rect(1.0)]);
        let once = canvas.clone();
        canvas.show(&[rect(1.0)]);
        assert_eq!(canvas, once);
    }

    #[test]
    fn foreign_layers_survive_updates() {
        let mut canvas = OverlayCanvas::new();
        canvas.add_foreign_layer("preview");
        canvas.show(&[rect(1.0)]);
        canvas.clear_detections();

        assert_eq!(canvas.detection_count(), 0);
        assert_eq!(
            canvas.layers(),
            &[OverlayLayer::Foreign {
                name: "preview".into()
            }]
        );
    }

    #[test]
    fn apply_pending_shows_newest_only() {
        let (tx, mut receiver) = OverlayReceiver::channel();
        let mut canvas = OverlayCanvas::new();

        assert_eq!(receiver.apply_pending(&mut canvas), None);

        for id in 1..=3 {
            tx.send_replace(Some(OverlayUpdate {
                frame_id: FrameId(id),
                rects: vec![rect(id as f64)],
            }));
        }

        assert_eq!(receiver.apply_pending(&mut canvas), Some(FrameId(3)));
        assert_eq!(canvas.detection_rects(), vec![rect(3.0)]);
        // Already on screen; nothing new to show.
        assert_eq!(receiver.apply_pending(&mut canvas), None);
    }

    #[tokio::test]
    async fn recv_yields_last_update_then_ends() {
        let (tx, mut receiver) = OverlayReceiver::channel();
        tx.send_replace(Some(OverlayUpdate {
            frame_id: FrameId(9),
            rects: vec![],
        }));
        drop(tx);
        assert_eq!(receiver.recv().await.map(|u| u.frame_id), Some(FrameId(9)));
        assert!(receiver.recv().await.is_none());
    }
}
