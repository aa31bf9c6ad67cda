//! facecam-core: face analysis and the per-frame detection pipeline.
//!
//! Networks (SCRFD detection, ArcFace descriptors, age/gender, FER+
//! expressions) run through ONNX Runtime behind the [`FaceAnalyzer`] trait.
//! The pipeline smooths age/gender per slot, resolves identities against
//! known faces and draws an overlay.

pub mod alignment;
pub mod analyzer;
pub mod attributes;
pub mod detector;
pub mod font;
pub mod loader;
pub mod matcher;
pub mod overlay;
pub mod pipeline;
pub mod recognizer;
pub mod smoothing;
pub mod types;

pub use analyzer::{AnalyzerError, FaceAnalyzer, ModelFiles, OnnxAnalyzer};
pub use loader::{LoadStage, LoadedModels, LoaderError, ModelLoader};
pub use matcher::{IdentityMatcher, MatchResult, DEFAULT_DISTANCE_THRESHOLD};
pub use overlay::{Overlay, OverlayLabel};
pub use pipeline::{DetectionPipeline, SlotStrategy};
pub use smoothing::{SmoothingState, SMOOTHING_WINDOW};
pub use types::{
    BoundingBox, Descriptor, Detection, DisplayedFace, Expression, ExpressionScores, Gender,
    GenderEstimate, KnownIdentity, DESCRIPTOR_RADIUS, UNKNOWN_LABEL,
};

use std::path::PathBuf;

/// `$XDG_DATA_HOME/facecam`, falling back to `~/.local/share/facecam`.
pub fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facecam")
}

/// Default directory holding the ONNX networks.
pub fn default_model_dir() -> PathBuf {
    default_data_dir().join("models")
}

/// Default directory holding `<label>.jpg` reference faces.
pub fn default_known_dir() -> PathBuf {
    default_data_dir().join("known")
}
