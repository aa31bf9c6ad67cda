use anyhow::{Context, Result};
use facecam_core::{ModelFiles, SlotStrategy, DEFAULT_DISTANCE_THRESHOLD};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Front-end configuration: an optional TOML file overlaid by `FACECAM_*`
/// environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    pub capture_width: u32,
    pub capture_height: u32,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Directory containing `<label>.jpg` reference faces.
    pub known_dir: PathBuf,
    /// Labels of the known identities to register at startup.
    pub known_labels: Vec<String>,
    /// Euclidean distance below which a descriptor matches an identity.
    pub match_threshold: f32,
    /// Period of the live detection timer.
    pub detection_interval_ms: u64,
    pub slot_strategy: SlotStrategy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_device: "/dev/video0".to_string(),
            capture_width: 640,
            capture_height: 480,
            model_dir: facecam_core::default_model_dir(),
            known_dir: facecam_core::default_known_dir(),
            known_labels: vec!["christine".to_string(), "James".to_string()],
            match_threshold: DEFAULT_DISTANCE_THRESHOLD,
            detection_interval_ms: 300,
            slot_strategy: SlotStrategy::default(),
        }
    }
}

impl Config {
    /// Read `$FACECAM_CONFIG` if set, then apply environment overrides.
    pub fn load() -> Result<Self> {
        match std::env::var("FACECAM_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path)).map(Self::with_env),
            Err(_) => Ok(Self::from_env()),
        }
    }

    /// Defaults plus `FACECAM_*` environment variables, without a file.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply overrides from `lookup` (normally the process environment).
    /// Unparseable values are ignored and the current value kept.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(device) = lookup("FACECAM_CAMERA_DEVICE") {
            self.camera_device = device;
        }
        if let Some(dir) = lookup("FACECAM_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("FACECAM_KNOWN_DIR") {
            self.known_dir = PathBuf::from(dir);
        }
        if let Some(labels) = lookup("FACECAM_KNOWN_LABELS") {
            self.known_labels = labels
                .split(',')
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
        }
        self.capture_width = env_parse(&lookup, "FACECAM_CAPTURE_WIDTH", self.capture_width);
        self.capture_height = env_parse(&lookup, "FACECAM_CAPTURE_HEIGHT", self.capture_height);
        self.match_threshold = env_parse(&lookup, "FACECAM_MATCH_THRESHOLD", self.match_threshold);
        self.detection_interval_ms =
            env_parse(&lookup, "FACECAM_DETECTION_INTERVAL_MS", self.detection_interval_ms);
        if let Some(strategy) = lookup("FACECAM_SLOT_STRATEGY") {
            match strategy.as_str() {
                "positional" => self.slot_strategy = SlotStrategy::Positional,
                "overlap" => self.slot_strategy = SlotStrategy::Overlap,
                other => tracing::warn!(value = other, "ignoring unknown FACECAM_SLOT_STRATEGY"),
            }
        }
        self
    }

    pub fn model_files(&self) -> ModelFiles {
        ModelFiles::in_dir(&self.model_dir)
    }
}

fn env_parse<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
