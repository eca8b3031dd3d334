use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Largest frame edge accepted from the camera.
pub const MAX_FRAME_DIMENSION: u32 = 8192;

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameError {
    #[error("invalid frame dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("frame buffer is empty")]
    EmptyBuffer,

    #[error("frame buffer size mismatch: expected {expected} bytes, got {got}")]
    BufferSizeMismatch { expected: usize, got: usize },

    #[error("unsupported EXIF orientation: {0}")]
    InvalidOrientation(u32),
}

// --- Frame identity ---

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameId(pub u64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame-{}", self.0)
    }
}

// --- Pixel layout ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Bgra8,
    Rgba8,
    /// Bi-planar 4:2:0, full-range luma followed by interleaved CbCr.
    #[default]
    Nv12FullRange,
}

impl PixelFormat {
    pub fn buffer_len(self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self {
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => w * h * 4,
            PixelFormat::Nv12FullRange => w * h + 2 * w.div_ceil(2) * h.div_ceil(2),
        }
    }
}

/// EXIF orientation of the pixel buffer relative to the upright image.
///
/// One entry per combination of rotation and mirroring, which covers every
/// device rotation for both the front and back camera.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameOrientation {
    Up,
    UpMirrored,
    Down,
    DownMirrored,
    LeftMirrored,
    #[default]
    Right,
    RightMirrored,
    Left,
}

impl FrameOrientation {
    pub const ALL: [FrameOrientation; 8] = [
        FrameOrientation::Up,
        FrameOrientation::UpMirrored,
        FrameOrientation::Down,
        FrameOrientation::DownMirrored,
        FrameOrientation::LeftMirrored,
        FrameOrientation::Right,
        FrameOrientation::RightMirrored,
        FrameOrientation::Left,
    ];

    pub const fn exif_value(self) -> u32 {
        match self {
            FrameOrientation::Up => 1,
            FrameOrientation::UpMirrored => 2,
            FrameOrientation::Down => 3,
            FrameOrientation::DownMirrored => 4,
            FrameOrientation::LeftMirrored => 5,
            FrameOrientation::Right => 6,
            FrameOrientation::RightMirrored => 7,
            FrameOrientation::Left => 8,
        }
    }

    pub fn from_exif(value: u32) -> Result<Self, FrameError> {
        value
            .checked_sub(1)
            .and_then(|idx| Self::ALL.get(idx as usize).copied())
            .ok_or(FrameError::InvalidOrientation(value))
    }
}

// --- Frame ---

/// Frame metadata passed between the shell and the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub id: FrameId,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub orientation: FrameOrientation,
    pub timestamp_ms: u64,
}

impl FrameInfo {
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.width == 0
            || self.height == 0
            || self.width > MAX_FRAME_DIMENSION
            || self.height > MAX_FRAME_DIMENSION
        {
            return Err(FrameError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    pub fn expected_len(&self) -> usize {
        self.pixel_format.buffer_len(self.width, self.height)
    }
}

/// A captured frame with its pixel data.
#[derive(Clone, PartialEq)]
pub struct Frame {
    info: FrameInfo,
    pixels: Vec<u8>,
}

// Pixel data is large; keep it out of logs.
impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("info", &self.info)
            .field("pixels_len", &self.pixels.len())
            .finish()
    }
}

impl Frame {
    pub fn new(info: FrameInfo, pixels: Vec<u8>) -> Result<Self, FrameError> {
        info.validate()?;
        if pixels.is_empty() {
            return Err(FrameError::EmptyBuffer);
        }
        let expected = info.expected_len();
        if pixels.len() != expected {
            return Err(FrameError::BufferSizeMismatch {
                expected,
                got: pixels.len(),
            });
        }
        Ok(Self { info, pixels })
    }

    pub fn info(&self) -> &FrameInfo {
        &self.info
    }

    pub fn id(&self) -> FrameId {
        self.info.id
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Converts the buffer to packed RGB in buffer orientation.
    pub fn to_rgb_image(&self) -> RgbImage {
        let (width, height) = (self.info.width, self.info.height);
        let w = width as usize;
        match self.info.pixel_format {
            PixelFormat::Rgba8 => RgbImage::from_fn(width, height, |x, y| {
                let i = (y as usize * w + x as usize) * 4;
                image::Rgb([self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]])
            }),
            PixelFormat::Bgra8 => RgbImage::from_fn(width, height, |x, y| {
                let i = (y as usize * w + x as usize) * 4;
                image::Rgb([self.pixels[i + 2], self.pixels[i + 1], self.pixels[i]])
            }),
            PixelFormat::Nv12FullRange => {
                let chroma = &self.pixels[w * height as usize..];
                let chroma_stride = 2 * w.div_ceil(2);
                RgbImage::from_fn(width, height, |x, y| {
                    let luma = self.pixels[y as usize * w + x as usize];
                    let ci = (y as usize / 2) * chroma_stride + (x as usize / 2) * 2;
                    ycbcr_full_range_to_rgb(luma, chroma[ci], chroma[ci + 1])
                })
            }
        }
    }
}

/// BT.601 full-range YCbCr to RGB.
fn ycbcr_full_range_to_rgb(y: u8, cb: u8, cr: u8) -> image::Rgb<u8> {
    let y = f32::from(y);
    let cb = f32::from(cb) - 128.0;
    let cr = f32::from(cr) - 128.0;

    let r = y + 1.402 * cr;
    let g = y - 0.344_136 * cb - 0.714_136 * cr;
    let b = y + 1.772 * cb;

    image::Rgb([clamp_u8(r), clamp_u8(g), clamp_u8(b)])
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}
