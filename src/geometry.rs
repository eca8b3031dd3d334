use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum GeometryError {
    #[error("non-finite rect: x={x}, y={y}, width={width}, height={height}")]
    NonFinite { x: f64, y: f64, width: f64, height: f64 },

    #[error("negative rect size: width={width}, height={height}")]
    NegativeSize { width: f64, height: f64 },

    #[error("invalid view size: {width}x{height}")]
    InvalidViewSize { width: f64, height: f64 },
}

// ============================================================================
// Normalized (vision space) rectangle
// ============================================================================

/// Rectangle in normalized image coordinates.
///
/// Follows the vision framework convention: the origin is the bottom-left
/// corner of the image and `y` grows upwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl NormalizedRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Result<Self, GeometryError> {
        if !(x.is_finite() && y.is_finite() && width.is_finite() && height.is_finite()) {
            return Err(GeometryError::NonFinite { x, y, width, height });
        }
        if width < 0.0 || height < 0.0 {
            return Err(GeometryError::NegativeSize { width, height });
        }
        Ok(Self { x, y, width, height })
    }

    /// The whole frame.
    pub const fn full() -> Self {
        Self { x: 0.0, y: 0.0, width: 1.0, height: 1.0 }
    }

    pub fn x(&self) -> f64 {
        self.x
    }
    pub fn y(&self) -> f64 {
        self.y
    }
    pub fn width(&self) -> f64 {
        self.width
    }
    pub fn height(&self) -> f64 {
        self.height
    }
}

// ============================================================================
// View space
// ============================================================================

/// Size of the view the overlay is drawn into, in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewSize {
    width: f64,
    height: f64,
}

impl ViewSize {
    pub fn new(width: f64, height: f64) -> Result<Self, GeometryError> {
        if !width.is_finite() || !height.is_finite() || width <= 0.0 || height <= 0.0 {
            return Err(GeometryError::InvalidViewSize { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> f64 {
        self.width
    }
    pub fn height(&self) -> f64 {
        self.height
    }
}

/// Rectangle in view coordinates: origin top-left, `y` grows downwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelRect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }
}

// ============================================================================
// Affine transform
// ============================================================================

/// 2D affine transform `(x, y) -> (a*x + c*y + tx, b*x + d*y + ty)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl AffineTransform {
    pub const IDENTITY: Self = Self { a: 1.0, b: 0.0, c: 0.0, d: 1.0, tx: 0.0, ty: 0.0 };

    pub const fn scale(sx: f64, sy: f64) -> Self {
        Self { a: sx, b: 0.0, c: 0.0, d: sy, tx: 0.0, ty: 0.0 }
    }

    pub const fn translation(tx: f64, ty: f64) -> Self {
        Self { a: 1.0, b: 0.0, c: 0.0, d: 1.0, tx, ty }
    }

    /// Transform equivalent to applying `self` first, then `next`.
    #[must_use]
    pub fn then(self, next: Self) -> Self {
        Self {
            a: self.a * next.a + self.b * next.c,
            b: self.a * next.b + self.b * next.d,
            c: self.c * next.a + self.d * next.c,
            d: self.c * next.b + self.d * next.d,
            tx: self.tx * next.a + self.ty * next.c + next.tx,
            ty: self.tx * next.b + self.ty * next.d + next.ty,
        }
    }

    pub fn apply_point(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.tx,
            self.b * x + self.d * y + self.ty,
        )
    }

    /// Smallest axis-aligned rect containing the four transformed corners.
    pub fn apply_rect(&self, x: f64, y: f64, width: f64, height: f64) -> PixelRect {
        let corners = [
            self.apply_point(x, y),
            self.apply_point(x + width, y),
            self.apply_point(x, y + height),
            self.apply_point(x + width, y + height),
        ];

        let (mut min_x, mut min_y) = corners[0];
        let (mut max_x, mut max_y) = corners[0];
        for &(px, py) in &corners[1..] {
            min_x = min_x.min(px);
            min_y = min_y.min(py);
            max_x = max_x.max(px);
            max_y = max_y.max(py);
        }

        PixelRect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}
