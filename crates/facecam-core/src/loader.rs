//! One-time session setup: inference backend, networks, known identities.

use crate::analyzer::{AnalyzerError, FaceAnalyzer, ModelFiles, OnnxAnalyzer};
use crate::matcher::{IdentityMatcher, DEFAULT_DISTANCE_THRESHOLD};
use crate::pipeline::DetectionPipeline;
use crate::types::KnownIdentity;
use image::RgbImage;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("failed to load networks: {0}")]
    Analyzer(#[from] AnalyzerError),
    #[error("reference image not found: {0}")]
    ReferenceNotFound(PathBuf),
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("no face found in reference image for {0}")]
    NoFace(String),
    #[error("no descriptor produced for {0}")]
    NoDescriptor(String),
    #[error("failed to initialize ONNX Runtime: {0}")]
    Backend(#[source] ort::Error),
}

/// Progress reported while loading, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Backend,
    Networks,
    KnownFaces,
    Ready,
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoadStage::Backend => "Loading inference backend...",
            LoadStage::Networks => "Loading face models...",
            LoadStage::KnownFaces => "Loading known faces...",
            LoadStage::Ready => "Models ready",
        })
    }
}

/// Where reference images for known identities come from.
pub trait ReferenceSource {
    fn fetch(&self, label: &str) -> Result<RgbImage, LoaderError>;
}

/// Reference images stored as `<dir>/<label>.jpg`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, label: &str) -> PathBuf {
        self.dir.join(format!("{label}.jpg"))
    }
}

impl ReferenceSource for DirectorySource {
    fn fetch(&self, label: &str) -> Result<RgbImage, LoaderError> {
        let path = self.path_for(label);
        if !path.exists() {
            return Err(LoaderError::ReferenceNotFound(path));
        }
        let image = image::open(&path).map_err(|source| LoaderError::Decode {
            path: path.clone(),
            source,
        })?;
        Ok(image.into_rgb8())
    }
}

/// Compute one descriptor per label. Failures are logged and the label is
/// left out; the rest still load.
pub fn load_known_identities<A, S>(analyzer: &mut A, source: &S, labels: &[String]) -> Vec<KnownIdentity>
where
    A: FaceAnalyzer,
    S: ReferenceSource,
{
    let mut identities = Vec::with_capacity(labels.len());
    for label in labels {
        match reference_identity(analyzer, source, label) {
            Ok(identity) => {
                tracing::info!(label = %label, "registered known face");
                identities.push(identity);
            }
            Err(e) => tracing::warn!(label = %label, error = %e, "skipping known face"),
        }
    }
    identities
}

fn reference_identity<A, S>(analyzer: &mut A, source: &S, label: &str) -> Result<KnownIdentity, LoaderError>
where
    A: FaceAnalyzer,
    S: ReferenceSource,
{
    let image = source.fetch(label)?;
    let detection = analyzer
        .detect_single(&image)?
        .ok_or_else(|| LoaderError::NoFace(label.to_string()))?;
    let descriptor = detection
        .descriptor
        .ok_or_else(|| LoaderError::NoDescriptor(label.to_string()))?;

    Ok(KnownIdentity {
        label: label.to_string(),
        descriptors: vec![descriptor],
    })
}

/// Networks and identities ready for detection.
pub struct LoadedModels<A> {
    pub analyzer: A,
    pub matcher: IdentityMatcher,
}

impl<A: FaceAnalyzer> LoadedModels<A> {
    pub fn into_pipeline(self) -> DetectionPipeline<A> {
        DetectionPipeline::new(self.analyzer, self.matcher)
    }
}

/// Everything the loader needs to know.
#[derive(Debug, Clone)]
pub struct ModelLoader {
    pub files: ModelFiles,
    pub known_dir: PathBuf,
    pub labels: Vec<String>,
    pub threshold: f32,
}

impl ModelLoader {
    pub fn new(files: ModelFiles, known_dir: impl Into<PathBuf>, labels: Vec<String>) -> Self {
        Self {
            files,
            known_dir: known_dir.into(),
            labels,
            threshold: DEFAULT_DISTANCE_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Load backend, networks and known faces, in that order. Network
    /// failures are fatal; known-face failures only shrink the gallery.
    pub fn load(&self, mut progress: impl FnMut(LoadStage)) -> Result<LoadedModels<OnnxAnalyzer>, LoaderError> {
        progress(LoadStage::Backend);
        init_backend()?;

        progress(LoadStage::Networks);
        let mut analyzer = OnnxAnalyzer::load(&self.files)?;

        progress(LoadStage::KnownFaces);
        let source = DirectorySource::new(&self.known_dir);
        let identities = load_known_identities(&mut analyzer, &source, &self.labels);
        tracing::info!(
            known = identities.len(),
            requested = self.labels.len(),
            threshold = self.threshold,
            "identity matcher built"
        );
        let matcher = IdentityMatcher::new(identities, self.threshold);

        progress(LoadStage::Ready);
        Ok(LoadedModels { analyzer, matcher })
    }
}

/// Configure and create the process-wide ONNX Runtime environment.
/// Idempotent; a second call reuses the first configuration.
fn init_backend() -> Result<(), LoaderError> {
    if !ort::init().with_name("facecam").commit() {
        tracing::debug!("ONNX Runtime environment already configured");
    }
    ort::environment::get_environment().map_err(|e| {
        tracing::error!(error = %e, "failed to initialize ONNX Runtime");
        LoaderError::Backend(e)
    })?;
    tracing::debug!("ONNX Runtime environment initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, Descriptor, Detection};
    use std::collections::HashMap;

    /// Reference images keyed by label; each image's width encodes how many
    /// faces the fake analyzer reports (0 = none, 1 = one without descriptor,
    /// 2+ = one with descriptor).
    struct MemorySource(HashMap<String, RgbImage>);

    impl ReferenceSource for MemorySource {
        fn fetch(&self, label: &str) -> Result<RgbImage, LoaderError> {
            self.0
                .get(label)
                .cloned()
                .ok_or_else(|| LoaderError::ReferenceNotFound(PathBuf::from(format!("{label}.jpg"))))
        }
    }

    struct WidthAnalyzer;

    impl FaceAnalyzer for WidthAnalyzer {
        fn detect_all(&mut self, image: &RgbImage) -> Result<Vec<Detection>, AnalyzerError> {
            let mut det = Detection::from_box(BoundingBox {
                x: 0.0, y: 0.0, width: 1.0, height: 1.0,
                confidence: 0.9, landmarks: None,
            });
            Ok(match image.width() {
                0 => vec![],
                1 => vec![det],
                w => {
                    det.descriptor = Some(Descriptor::new(vec![w as f32]));
                    vec![det]
                }
            })
        }
    }

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_known_faces_register_descriptors() {
        let source = MemorySource(HashMap::from([
            ("christine".to_string(), RgbImage::new(2, 1)),
            ("James".to_string(), RgbImage::new(3, 1)),
        ]));
        let ids = load_known_identities(&mut WidthAnalyzer, &source, &labels(&["christine", "James"]));
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[1].label, "James");
        assert_eq!(ids[1].descriptors[0].values, vec![3.0]);
    }

    #[test]
    fn test_failed_known_faces_are_skipped() {
        let source = MemorySource(HashMap::from([
            ("noface".to_string(), RgbImage::new(0, 0)),
            ("nodesc".to_string(), RgbImage::new(1, 1)),
            ("ok".to_string(), RgbImage::new(2, 1)),
        ]));
        let ids = load_known_identities(
            &mut WidthAnalyzer,
            &source,
            &labels(&["missing", "noface", "nodesc", "ok"]),
        );
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].label, "ok");
    }

    #[test]
    fn test_reference_errors() {
        let source = MemorySource(HashMap::from([("noface".to_string(), RgbImage::new(0, 0))]));
        assert!(matches!(
            reference_identity(&mut WidthAnalyzer, &source, "missing"),
            Err(LoaderError::ReferenceNotFound(_))
        ));
        assert!(matches!(
            reference_identity(&mut WidthAnalyzer, &source, "noface"),
            Err(LoaderError::NoFace(_))
        ));
    }

    #[test]
    fn test_directory_source_paths() {
        let source = DirectorySource::new("/srv/known");
        assert_eq!(source.path_for("James"), PathBuf::from("/srv/known/James.jpg"));
        assert!(matches!(source.fetch("James"), Err(LoaderError::ReferenceNotFound(_))));
    }

    #[test]
    fn test_load_fails_without_networks() {
        let loader = ModelLoader::new(
            ModelFiles::in_dir(std::path::Path::new("/nonexistent")),
            "/nonexistent/known",
            labels(&["christine"]),
        );
        let mut stages = Vec::new();
        let result = loader.load(|stage| stages.push(stage));
        match result {
            Err(LoaderError::Analyzer(_)) => assert_eq!(stages, vec![LoadStage::Backend, LoadStage::Networks]),
            // No ONNX Runtime library on this host: loading stops before the networks.
            Err(LoaderError::Backend(_)) => assert_eq!(stages, vec![LoadStage::Backend]),
            other => panic!("unexpected load result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_backend_error_keeps_cause() {
        use std::error::Error as _;
        let err = LoaderError::Backend(ort::Error::new("libonnxruntime.so: cannot open shared object file"));
        assert!(err.to_string().starts_with("failed to initialize ONNX Runtime"));
        assert!(err.to_string().contains("libonnxruntime.so"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_loaded_models_into_pipeline() {
        let models = LoadedModels {
            analyzer: WidthAnalyzer,
            matcher: IdentityMatcher::empty(),
        };
        let pipeline = models.into_pipeline();
        assert!(pipeline.faces().is_empty());
    }
}
