//! ONNX Runtime backed [`HandDetector`].
//!
//! Expects the exported hand model: one NCHW float input scaled to `[0, 1]`,
//! and two outputs, `coordinates` (`[N, 4]`, center/size normalized to the
//! input) and `confidence` (`[N, classes]`).

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, instrument};

use crate::config::ModelConfig;
use crate::detector::{DetectionResult, DetectorError, HandDetector};
use crate::frame::Frame;
use crate::vision::{decode_model_output, Letterbox};

const COORDINATES_OUTPUT: &str = "coordinates";
const CONFIDENCE_OUTPUT: &str = "confidence";

impl From<ort::Error> for DetectorError {
    fn from(e: ort::Error) -> Self {
        DetectorError::Inference {
            message: e.to_string(),
        }
    }
}

pub struct OnnxHandDetector {
    session: Arc<Mutex<Session>>,
    model: ModelConfig,
}

impl OnnxHandDetector {
    #[instrument(skip(model_bytes), fields(model_size = model_bytes.len()))]
    pub fn from_memory(model_bytes: &[u8], model: ModelConfig) -> Result<Self, DetectorError> {
        let session = Session::builder()?.commit_from_memory(model_bytes)?;
        debug!(
            input = %format!("{}x{}", model.input_width, model.input_height),
            classes = model.class_labels.len(),
            "hand model loaded"
        );
        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            model,
        })
    }

    /// Letterboxes the frame into the model input and lays it out as NCHW.
    fn preprocess(&self, frame: &Frame) -> Result<(Array4<f32>, Letterbox), DetectorError> {
        let info = frame.info();
        let letterbox = Letterbox::new(
            info.width,
            info.height,
            self.model.input_width,
            self.model.input_height,
        )?;
        let (content_w, content_h) = letterbox.content_size();

        let resized = imageops::resize(&frame.to_rgb_image(), content_w, content_h, FilterType::Triangle);
        let mut canvas = RgbImage::new(self.model.input_width, self.model.input_height);
        imageops::replace(&mut canvas, &resized, 0, 0);

        let (w, h) = (self.model.input_width as usize, self.model.input_height as usize);
        let mut input = Array4::<f32>::zeros((1, 3, h, w));
        for (x, y, pixel) in canvas.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] = f32::from(pixel[c]) / 255.0;
            }
        }
        Ok((input, letterbox))
    }
}

#[async_trait]
impl HandDetector for OnnxHandDetector {
    #[instrument(skip_all, fields(frame = %frame.id()))]
    async fn detect(&self, frame: &Frame) -> DetectionResult {
        let (input, letterbox) = self.preprocess(frame)?;
        let session = Arc::clone(&self.session);

        let (coordinates, confidences) = tokio::task::spawn_blocking(move || run_model(&session, input))
            .await
            .map_err(|e| DetectorError::Inference {
                message: format!("inference task failed: {e}"),
            })??;

        let observations =
            decode_model_output(&coordinates, &confidences, &self.model.class_labels, letterbox)?;
        debug!(observations = observations.len(), "inference completed");
        Ok(observations)
    }
}

type RawOutput = (Vec<[f32; 4]>, Vec<Vec<f32>>);

fn run_model(session: &Mutex<Session>, input: Array4<f32>) -> Result<RawOutput, DetectorError> {
    let (n, c, h, w) = input.dim();
    let (data, _) = input.into_raw_vec_and_offset();
    let tensor = Tensor::from_array(([n, c, h, w], data.into_boxed_slice()))?;

    let mut session = session.lock().map_err(|_| DetectorError::Unavailable {
        reason: "session lock poisoned".into(),
    })?;
    let outputs = session.run(ort::inputs![tensor])?;

    let coordinates = outputs
        .get(COORDINATES_OUTPUT)
        .ok_or_else(|| DetectorError::Decode(format!("model has no '{COORDINATES_OUTPUT}' output")))?;
    let confidence = outputs
        .get(CONFIDENCE_OUTPUT)
        .ok_or_else(|| DetectorError::Decode(format!("model has no '{CONFIDENCE_OUTPUT}' output")))?;

    let (coord_shape, coord_data) = coordinates.try_extract_tensor::<f32>()?;
    let (conf_shape, conf_data) = confidence.try_extract_tensor::<f32>()?;

    let coord_rows = rows(coord_data, coord_shape.last().copied(), COORDINATES_OUTPUT)?;
    if coord_rows.iter().any(|row| row.len() != 4) {
        return Err(DetectorError::Decode("coordinate rows must have 4 values".into()));
    }
    let coordinates = coord_rows
        .into_iter()
        .map(|row| [row[0], row[1], row[2], row[3]])
        .collect();
    let confidences = rows(conf_data, conf_shape.last().copied(), CONFIDENCE_OUTPUT)?;

    Ok((coordinates, confidences))
}

/// Splits a flat tensor into rows of its innermost dimension.
fn rows(data: &[f32], width: Option<i64>, name: &str) -> Result<Vec<Vec<f32>>, DetectorError> {
    let width = width
        .and_then(|w| usize::try_from(w).ok())
        .filter(|&w| w > 0)
        .ok_or_else(|| DetectorError::Decode(format!("'{name}' output has no usable shape")))?;
    if data.len() % width != 0 {
        return Err(DetectorError::Decode(format!(
            "'{name}' output length {} is not a multiple of {width}",
            data.len()
        )));
    }
    Ok(data.chunks_exact(width).map(<[f32]>::to_vec).collect())
}
