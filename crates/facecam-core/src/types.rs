use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Label reported for a face whose descriptor matched no known identity.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Rescale the box (and its landmarks) by independent x/y factors.
    pub fn scaled(&self, sx: f32, sy: f32) -> BoundingBox {
        BoundingBox {
            x: self.x * sx,
            y: self.y * sy,
            width: self.width * sx,
            height: self.height * sy,
            confidence: self.confidence,
            landmarks: self
                .landmarks
                .map(|lms| lms.map(|(lx, ly)| (lx * sx, ly * sy))),
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Intersection-over-Union with another box, in [0, 1].
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter_w = (x2 - x1).max(0.0);
        let inter_h = (y2 - y1).max(0.0);
        let inter_area = inter_w * inter_h;

        let area_a = self.width * self.height;
        let area_b = other.width * other.height;
        let union_area = area_a + area_b - inter_area;

        if union_area > 0.0 {
            inter_area / union_area
        } else {
            0.0
        }
    }
}

/// Length of every descriptor produced by [`Descriptor::from_embedding`].
///
/// Two descriptors at cosine `c` lie `DESCRIPTOR_RADIUS * sqrt(2 - 2c)` apart.
/// The radius puts cosine 0.40, the usual ArcFace acceptance point, at
/// distance 0.5: `0.5 / sqrt(1.2)`.
pub const DESCRIPTOR_RADIUS: f32 = 0.456_435_5;

/// Face descriptor: the identity embedding produced by the recognition network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean distance between two descriptors.
    ///
    /// Descriptors of different lengths come from different networks and are
    /// never comparable; their distance is infinite.
    pub fn euclidean_distance(&self, other: &Descriptor) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Descriptor from a raw recognizer embedding: L2-normalized, then
    /// scaled to [`DESCRIPTOR_RADIUS`]. A zero embedding stays zero.
    pub fn from_embedding(raw: &[f32]) -> Self {
        let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            Self::new(raw.iter().map(|x| x / norm * DESCRIPTOR_RADIUS).collect())
        } else {
            Self::new(raw.to_vec())
        }
    }
}

/// Gender label. Variant order is lexical so that `Ord` doubles as the
/// tie-break order used by majority voting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Female,
    Male,
    /// The detection carried no gender estimate.
    Unknown,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Female => "female",
            Gender::Male => "male",
            Gender::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gender estimate for one detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenderEstimate {
    pub gender: Gender,
    /// Probability of `gender`, in [0, 1].
    pub probability: f32,
}

/// Facial expression classes. Declared in lexical order of their names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expression {
    Angry,
    Contempt,
    Disgusted,
    Fearful,
    Happy,
    Neutral,
    Sad,
    Surprised,
}

impl Expression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Expression::Angry => "angry",
            Expression::Contempt => "contempt",
            Expression::Disgusted => "disgusted",
            Expression::Fearful => "fearful",
            Expression::Happy => "happy",
            Expression::Neutral => "neutral",
            Expression::Sad => "sad",
            Expression::Surprised => "surprised",
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-expression probabilities for one detection.
pub type ExpressionScores = BTreeMap<Expression, f32>;

/// One face as reported by the analyzer for a single frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub descriptor: Option<Descriptor>,
    /// Estimated age in years.
    pub age: Option<f32>,
    pub gender: Option<GenderEstimate>,
    pub expressions: Option<ExpressionScores>,
}

impl Detection {
    /// A detection carrying only a box; attribute fields are filled in by the analyzer.
    pub fn from_box(bbox: BoundingBox) -> Self {
        Self {
            bbox,
            descriptor: None,
            age: None,
            gender: None,
            expressions: None,
        }
    }

    /// Map the detection from source pixels into display pixels.
    pub fn resized(&self, from: (u32, u32), to: (u32, u32)) -> Detection {
        let sx = if from.0 > 0 { to.0 as f32 / from.0 as f32 } else { 1.0 };
        let sy = if from.1 > 0 { to.1 as f32 / from.1 as f32 } else { 1.0 };
        Detection {
            bbox: self.bbox.scaled(sx, sy),
            ..self.clone()
        }
    }
}

/// A labelled identity with the descriptors computed from its reference image(s).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownIdentity {
    pub label: String,
    pub descriptors: Vec<Descriptor>,
}

/// A face as shown to the user after smoothing and identity resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayedFace {
    /// `face-<slot>`; only stable as long as the slot is.
    pub id: String,
    pub slot: usize,
    pub name: String,
    /// Mean of the slot's recent age samples.
    pub age: f32,
    pub gender: Gender,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_expression: Option<Expression>,
    pub bbox: BoundingBox,
}

impl DisplayedFace {
    /// Overlay caption: `"<name>, <age> yrs, <gender>[, <expression>]"`.
    pub fn caption(&self) -> String {
        let mut text = format!("{}, {:.0} yrs, {}", self.name, self.age, self.gender);
        if let Some(expr) = self.top_expression {
            text.push_str(", ");
            text.push_str(expr.as_str());
        }
        text
    }
}
