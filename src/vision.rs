use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::geometry::{GeometryError, NormalizedRect};

// ============================================================================
// Constants
// ============================================================================

/// Observations at or below this confidence are discarded.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.1;

/// Label used when an observation carries no class candidates.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Square input the hand model was trained with.
pub const DEFAULT_MODEL_INPUT: u32 = 416;

/// Class order of the hand model's confidence rows.
pub const DEFAULT_CLASS_LABELS: &[&str] = &["left", "right"];

/// Upper bound on rows accepted from a single model run.
const MAX_MODEL_ROWS: usize = 10_000;

// ============================================================================
// Error Types
// ============================================================================

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum VisionError {
    #[error("coordinates/confidence row count mismatch: {coordinates} vs {confidences}")]
    RowCountMismatch { coordinates: usize, confidences: usize },

    #[error("confidence row {row} has {got} classes, expected {expected}")]
    ClassCountMismatch { row: usize, expected: usize, got: usize },

    #[error("model returned {0} rows (max: {MAX_MODEL_ROWS})")]
    TooManyRows(usize),

    #[error("invalid letterbox: {0}")]
    InvalidLetterbox(String),

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

// ============================================================================
// Detector output
// ============================================================================

/// One class hypothesis for a detected region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassCandidate {
    pub identifier: String,
    pub confidence: f32,
}

impl ClassCandidate {
    pub fn new(identifier: impl Into<String>, confidence: f32) -> Self {
        Self {
            identifier: identifier.into(),
            confidence,
        }
    }
}

/// Raw detector output for one region, before the confidence policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Class candidates in the order the detector reported them.
    pub labels: Vec<ClassCandidate>,
    /// Region confidence.
    pub confidence: f32,
    /// Bounding box in vision space (bottom-left origin).
    pub bounding_box: NormalizedRect,
}

/// A region that passed the confidence policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[must_use]
pub struct Detection {
    pub label: String,
    pub bounding_box: NormalizedRect,
}

// ============================================================================
// Confidence policy
// ============================================================================

/// Highest-confidence label of an observation.
///
/// Ties go to the candidate reported first. Non-finite confidences never win.
pub fn top_label(labels: &[ClassCandidate]) -> Option<&ClassCandidate> {
    labels
        .iter()
        .filter(|candidate| candidate.confidence.is_finite())
        .fold(None, |best: Option<&ClassCandidate>, candidate| match best {
            Some(current) if current.confidence >= candidate.confidence => Some(current),
            _ => Some(candidate),
        })
}

/// Applies the confidence policy: keeps observations strictly above
/// `threshold`, one detection per observation, labelled with its best class.
pub fn select_detections(observations: &[Observation], threshold: f32) -> Vec<Detection> {
    let detections: Vec<Detection> = observations
        .iter()
        .filter(|observation| {
            observation.confidence.is_finite() && observation.confidence > threshold
        })
        .map(|observation| Detection {
            label: top_label(&observation.labels)
                .map_or_else(|| UNKNOWN_LABEL.to_string(), |c| c.identifier.clone()),
            bounding_box: observation.bounding_box,
        })
        .collect();

    debug!(
        observations = observations.len(),
        kept = detections.len(),
        threshold,
        "confidence policy applied"
    );
    detections
}

// ============================================================================
// Model output decoding
// ============================================================================

/// Placement of a source image inside the model input.
///
/// The source is scaled to fit and pasted at the top-left corner of the
/// input canvas; the rest is padding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub source_width: u32,
    pub source_height: u32,
    pub input_width: u32,
    pub input_height: u32,
}

impl Letterbox {
    pub fn new(
        source_width: u32,
        source_height: u32,
        input_width: u32,
        input_height: u32,
    ) -> Result<Self, VisionError> {
        if source_width == 0 || source_height == 0 || input_width == 0 || input_height == 0 {
            return Err(VisionError::InvalidLetterbox(format!(
                "source {source_width}x{source_height}, input {input_width}x{input_height}"
            )));
        }
        Ok(Self {
            source_width,
            source_height,
            input_width,
            input_height,
        })
    }

    /// Factor from source pixels to input pixels.
    pub fn scale(&self) -> f64 {
        let sx = f64::from(self.input_width) / f64::from(self.source_width);
        let sy = f64::from(self.input_height) / f64::from(self.source_height);
        sx.min(sy)
    }

    /// Size of the scaled source inside the input canvas.
    pub fn content_size(&self) -> (u32, u32) {
        let scale = self.scale();
        let w = (f64::from(self.source_width) * scale).round() as u32;
        let h = (f64::from(self.source_height) * scale).round() as u32;
        (w.clamp(1, self.input_width), h.clamp(1, self.input_height))
    }

    /// Multipliers turning input-normalized coordinates into source-normalized ones.
    fn source_factors(&self) -> (f64, f64) {
        let scale = self.scale();
        (
            f64::from(self.input_width) / (f64::from(self.source_width) * scale),
            f64::from(self.input_height) / (f64::from(self.source_height) * scale),
        )
    }
}

/// Decodes a YOLO-style hand model output into observations.
///
/// `coordinates` rows are `[center_x, center_y, width, height]`, normalized
/// to the model input with a top-left origin. `confidences` rows hold one
/// score per entry of `class_labels`. Boxes are mapped back to the source
/// image, clamped to it, and flipped into vision space (bottom-left origin).
pub fn decode_model_output(
    coordinates: &[[f32; 4]],
    confidences: &[Vec<f32>],
    class_labels: &[String],
    letterbox: Letterbox,
) -> Result<Vec<Observation>, VisionError> {
    if coordinates.len() != confidences.len() {
        return Err(VisionError::RowCountMismatch {
            coordinates: coordinates.len(),
            confidences: confidences.len(),
        });
    }
    if coordinates.len() > MAX_MODEL_ROWS {
        return Err(VisionError::TooManyRows(coordinates.len()));
    }

    let (fx, fy) = letterbox.source_factors();
    let mut observations = Vec::with_capacity(coordinates.len());

    for (row, (coords, scores)) in coordinates.iter().zip(confidences).enumerate() {
        if scores.len() != class_labels.len() {
            return Err(VisionError::ClassCountMismatch {
                row,
                expected: class_labels.len(),
                got: scores.len(),
            });
        }

        let [cx, cy, w, h] = (*coords).map(f64::from);
        if !(cx.is_finite() && cy.is_finite() && w.is_finite() && h.is_finite()) || w <= 0.0 || h <= 0.0 {
            warn!(row, "skipping malformed model row");
            continue;
        }

        let left = ((cx - w / 2.0) * fx).clamp(0.0, 1.0);
        let top = ((cy - h / 2.0) * fy).clamp(0.0, 1.0);
        let right = ((cx + w / 2.0) * fx).clamp(0.0, 1.0);
        let bottom = ((cy + h / 2.0) * fy).clamp(0.0, 1.0);

        if right - left <= f64::EPSILON || bottom - top <= f64::EPSILON {
            continue;
        }

        let labels: Vec<ClassCandidate> = class_labels
            .iter()
            .zip(scores)
            .map(|(label, &score)| ClassCandidate::new(label.clone(), score))
            .collect();

        let confidence = top_label(&labels).map_or(0.0, |c| c.confidence);

        observations.push(Observation {
            labels,
            confidence,
            bounding_box: NormalizedRect::new(left, 1.0 - bottom, right - left, bottom - top)?,
        });
    }

    Ok(observations)
}

pub fn default_class_labels() -> Vec<String> {
    DEFAULT_CLASS_LABELS.iter().map(|s| (*s).to_string()).collect()
}

// ============================================================================
// Tests
// ============================================================================
