#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::classifier::Classifier;
use crate::detect::result::{Detection, GestureLabel, Region};
use crate::frame::InferenceView;

/// Floor applied to decoded rows before they count as detections.
const SCORE_FLOOR: f32 = 0.25;

/// Tract-based ONNX hand gesture detector.
///
/// Expects a single-input model taking `1x3xHxW` RGB in 0..1 and producing rows of
/// `[cx, cy, w, h, objectness, class scores...]`, box values in input pixels with a
/// top-left origin. Model loading happens in `new`; a failure there aborts startup.
pub struct TractClassifier {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
    labels: Vec<GestureLabel>,
}

impl TractClassifier {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        width: u32,
        height: u32,
        labels: Vec<GestureLabel>,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        if labels.is_empty() {
            return Err(anyhow!("tract classifier needs at least one class label"));
        }
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            labels,
        })
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        let image = RgbImage::from_raw(width, height, pixels.to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{} RGB", width, height))?;
        let resized = if width == self.width && height == self.height {
            image
        } else {
            imageops::resize(&image, self.width, self.height, FilterType::Nearest)
        };

        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, self.width as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let rows = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let columns = 5 + self.labels.len();
        let cols_in_model = rows.shape().last().copied().unwrap_or(0);
        if cols_in_model != columns {
            return Err(anyhow!(
                "model output has {} columns, expected {} for {} labels",
                cols_in_model,
                columns,
                self.labels.len()
            ));
        }
        let values: Vec<f32> = rows.iter().copied().collect();
        Ok(decode_rows(
            &values,
            &self.labels,
            self.width as f32,
            self.height as f32,
            SCORE_FLOOR,
        ))
    }
}

/// Turn flat `[cx, cy, w, h, obj, scores...]` rows into detections.
fn decode_rows(
    values: &[f32],
    labels: &[GestureLabel],
    input_w: f32,
    input_h: f32,
    floor: f32,
) -> Vec<Detection> {
    let columns = 5 + labels.len();
    values
        .chunks_exact(columns)
        .filter_map(|row| {
            let (best, class_score) = row[5..]
                .iter()
                .copied()
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |acc, (i, s)| {
                    if s > acc.1 {
                        (i, s)
                    } else {
                        acc
                    }
                });
            let score = row[4] * class_score;
            if !score.is_finite() || score < floor {
                return None;
            }
            // Clamp the centre, not the corner: boxes may overhang the frame edge.
            let cx = (row[0] / input_w).clamp(0.0, 1.0);
            let cy = (row[1] / input_h).clamp(0.0, 1.0);
            let w = (row[2] / input_w).clamp(0.0, 1.0);
            let h = (row[3] / input_h).clamp(0.0, 1.0);
            Some(Detection::new(
                labels[best].clone(),
                score,
                Region::from_top_left(cx - w / 2.0, cy - h / 2.0, w, h),
            ))
        })
        .collect()
}

impl Classifier for TractClassifier {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn classify(&mut self, view: &InferenceView<'_>) -> Result<Vec<Detection>> {
        let input = view.with_upright_pixels(|pixels, w, h| self.build_input(pixels, w, h))?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Tensor::zero::<f32>(&[1, 3, self.height as usize, self.width as usize])?;
        self.model
            .run(tvec!(blank.into()))
            .context("ONNX warm-up inference failed")?;
        Ok(())
    }
}
