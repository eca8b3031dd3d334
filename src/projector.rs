use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::geometry::{AffineTransform, NormalizedRect, PixelRect, ViewSize};
use crate::vision::Detection;

/// Stroke color of an overlay rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorTag {
    #[default]
    Red,
    Green,
    Blue,
    Yellow,
    White,
}

/// One rectangle ready for the overlay, in view coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewRect {
    pub color: ColorTag,
    pub rect: PixelRect,
}

/// Color assignment for projected detections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayStyle {
    pub default_color: ColorTag,
    pub label_colors: BTreeMap<String, ColorTag>,
}

impl OverlayStyle {
    pub fn color_for(&self, label: &str) -> ColorTag {
        self.label_colors
            .get(label)
            .copied()
            .unwrap_or(self.default_color)
    }
}

/// Vision space to view space: flip the y axis, scale to the view, then move
/// the flipped rect back down by the view height.
pub fn vision_to_view(view_size: ViewSize) -> AffineTransform {
    AffineTransform::scale(1.0, -1.0)
        .then(AffineTransform::scale(view_size.width(), view_size.height()))
        .then(AffineTransform::translation(0.0, view_size.height()))
}

pub fn project_rect(rect: &NormalizedRect, view_size: ViewSize) -> PixelRect {
    vision_to_view(view_size).apply_rect(rect.x(), rect.y(), rect.width(), rect.height())
}

/// Projects detections into view rects, one per detection, in input order.
pub fn project(detections: &[Detection], view_size: ViewSize, style: &OverlayStyle) -> Vec<ViewRect> {
    let transform = vision_to_view(view_size);
    detections
        .iter()
        .map(|detection| {
            let bbox = &detection.bounding_box;
            ViewRect {
                color: style.color_for(&detection.label),
                rect: transform.apply_rect(bbox.x(), bbox.y(), bbox.width(), bbox.height()),
            }
        })
        .collect()
}
