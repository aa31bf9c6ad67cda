//! Age/gender regression and expression classification networks.

use crate::alignment;
use crate::types::{BoundingBox, Expression, ExpressionScores, Gender, GenderEstimate};
use image::{DynamicImage, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// InsightFace genderage: 96×96 RGB, unnormalized, output [female, male, age / 100].
const GENDERAGE_INPUT_SIZE: u32 = 96;
const GENDERAGE_MARGIN: f32 = 1.5;
const GENDERAGE_AGE_SCALE: f32 = 100.0;

// FER+ emotion network: 64×64 grayscale, raw 0–255 values, 8 logits.
const FERPLUS_INPUT_SIZE: u32 = 64;
const FERPLUS_MARGIN: f32 = 1.2;
const FERPLUS_CLASSES: [Expression; 8] = [
    Expression::Neutral,
    Expression::Happy,
    Expression::Surprised,
    Expression::Sad,
    Expression::Angry,
    Expression::Disgusted,
    Expression::Fearful,
    Expression::Contempt,
];

#[derive(Error, Debug)]
pub enum AttributeError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

fn load_session(model_path: &Path, what: &str) -> Result<Session, AttributeError> {
    if !model_path.exists() {
        return Err(AttributeError::ModelNotFound(model_path.display().to_string()));
    }
    let session = Session::builder()?
        .with_intra_threads(1)?
        .commit_from_file(model_path)?;
    tracing::info!(path = %model_path.display(), model = what, "loaded attribute model");
    Ok(session)
}

/// Age and gender regressor.
pub struct GenderAgeEstimator {
    session: Session,
}

impl GenderAgeEstimator {
    pub fn load(model_path: &Path) -> Result<Self, AttributeError> {
        Ok(Self {
            session: load_session(model_path, "genderage")?,
        })
    }

    /// Estimate (age in years, gender) for one detected face.
    pub fn estimate(
        &mut self,
        image: &RgbImage,
        face: &BoundingBox,
    ) -> Result<(f32, GenderEstimate), AttributeError> {
        let crop = alignment::crop_around(image, face, GENDERAGE_INPUT_SIZE, GENDERAGE_MARGIN);
        let input = rgb_tensor(&crop);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| AttributeError::InferenceFailed(format!("genderage: {e}")))?;

        decode_genderage(raw)
    }
}

fn decode_genderage(raw: &[f32]) -> Result<(f32, GenderEstimate), AttributeError> {
    let [female, male, age] = match raw {
        [f, m, a, ..] => [*f, *m, *a],
        _ => {
            return Err(AttributeError::InferenceFailed(format!(
                "genderage: expected 3 outputs, got {}",
                raw.len()
            )))
        }
    };

    let probs = softmax(&[female, male]);
    let gender = if probs[1] > probs[0] {
        GenderEstimate { gender: Gender::Male, probability: probs[1] }
    } else {
        GenderEstimate { gender: Gender::Female, probability: probs[0] }
    };

    Ok(((age * GENDERAGE_AGE_SCALE).max(0.0), gender))
}

/// Facial expression classifier.
pub struct ExpressionClassifier {
    session: Session,
}

impl ExpressionClassifier {
    pub fn load(model_path: &Path) -> Result<Self, AttributeError> {
        Ok(Self {
            session: load_session(model_path, "ferplus")?,
        })
    }

    /// Probability for each expression class.
    pub fn classify(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<ExpressionScores, AttributeError> {
        let crop = alignment::crop_around(image, face, FERPLUS_INPUT_SIZE, FERPLUS_MARGIN);
        let gray = DynamicImage::ImageRgb8(crop).into_luma8();

        let size = FERPLUS_INPUT_SIZE as usize;
        let mut input = Array4::<f32>::zeros((1, 1, size, size));
        for (x, y, pixel) in gray.enumerate_pixels() {
            input[[0, 0, y as usize, x as usize]] = pixel.0[0] as f32;
        }

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| AttributeError::InferenceFailed(format!("ferplus: {e}")))?;

        decode_expressions(logits)
    }
}

fn decode_expressions(logits: &[f32]) -> Result<ExpressionScores, AttributeError> {
    if logits.len() < FERPLUS_CLASSES.len() {
        return Err(AttributeError::InferenceFailed(format!(
            "ferplus: expected {} logits, got {}",
            FERPLUS_CLASSES.len(),
            logits.len()
        )));
    }
    let probs = softmax(&logits[..FERPLUS_CLASSES.len()]);
    Ok(FERPLUS_CLASSES.iter().copied().zip(probs).collect())
}

/// RGB image → unnormalized NCHW tensor.
fn rgb_tensor(image: &RgbImage) -> Array4<f32> {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let mut tensor = Array4::<f32>::zeros((1, 3, h, w));
    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel.0[c] as f32;
        }
    }
    tensor
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}
