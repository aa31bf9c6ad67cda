//! The face analysis service: detection plus per-face attributes.

use crate::attributes::{AttributeError, ExpressionClassifier, GenderAgeEstimator};
use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::Detection;
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("attribute error: {0}")]
    Attribute(#[from] AttributeError),
}

/// Anything that turns an image into face detections.
///
/// `detect_all` returns every face with whatever attributes the backend
/// supports; `detect_single` returns the most confident face only.
pub trait FaceAnalyzer {
    fn detect_all(&mut self, image: &RgbImage) -> Result<Vec<Detection>, AnalyzerError>;

    fn detect_single(&mut self, image: &RgbImage) -> Result<Option<Detection>, AnalyzerError> {
        let detections = self.detect_all(image)?;
        Ok(detections
            .into_iter()
            .max_by(|a, b| a.bbox.confidence.total_cmp(&b.bbox.confidence)))
    }
}

/// File names of the four ONNX networks inside the model directory.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub detector: PathBuf,
    pub recognizer: PathBuf,
    pub gender_age: PathBuf,
    pub expression: PathBuf,
}

impl ModelFiles {
    pub const DETECTOR: &'static str = "det_10g.onnx";
    pub const RECOGNIZER: &'static str = "w600k_r50.onnx";
    pub const GENDER_AGE: &'static str = "genderage.onnx";
    pub const EXPRESSION: &'static str = "emotion-ferplus-8.onnx";

    pub fn in_dir(model_dir: &Path) -> Self {
        Self {
            detector: model_dir.join(Self::DETECTOR),
            recognizer: model_dir.join(Self::RECOGNIZER),
            gender_age: model_dir.join(Self::GENDER_AGE),
            expression: model_dir.join(Self::EXPRESSION),
        }
    }

    /// (name, path) pairs in load order.
    pub fn entries(&self) -> [(&'static str, &Path); 4] {
        [
            ("detector", self.detector.as_path()),
            ("recognizer", self.recognizer.as_path()),
            ("gender_age", self.gender_age.as_path()),
            ("expression", self.expression.as_path()),
        ]
    }
}

/// ONNX Runtime implementation of [`FaceAnalyzer`].
pub struct OnnxAnalyzer {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    gender_age: GenderAgeEstimator,
    expression: ExpressionClassifier,
}

impl OnnxAnalyzer {
    /// Load all four networks. Any missing or invalid model fails the load.
    pub fn load(files: &ModelFiles) -> Result<Self, AnalyzerError> {
        Ok(Self {
            detector: FaceDetector::load(&files.detector)?,
            recognizer: FaceRecognizer::load(&files.recognizer)?,
            gender_age: GenderAgeEstimator::load(&files.gender_age)?,
            expression: ExpressionClassifier::load(&files.expression)?,
        })
    }
}

impl FaceAnalyzer for OnnxAnalyzer {
    fn detect_all(&mut self, image: &RgbImage) -> Result<Vec<Detection>, AnalyzerError> {
        let boxes = self.detector.detect(image)?;
        let mut detections = Vec::with_capacity(boxes.len());

        for bbox in boxes {
            let mut det = Detection::from_box(bbox);

            if det.bbox.landmarks.is_some() {
                det.descriptor = Some(self.recognizer.extract(image, &det.bbox)?);
            }
            let (age, gender) = self.gender_age.estimate(image, &det.bbox)?;
            det.age = Some(age);
            det.gender = Some(gender);
            det.expressions = Some(self.expression.classify(image, &det.bbox)?);

            detections.push(det);
        }

        tracing::trace!(faces = detections.len(), "analyzed image");
        Ok(detections)
    }
}
