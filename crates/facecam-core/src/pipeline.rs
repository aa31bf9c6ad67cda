//! Per-frame detection pipeline: analyze, smooth, identify, draw.

use crate::analyzer::{AnalyzerError, FaceAnalyzer};
use crate::matcher::IdentityMatcher;
use crate::overlay::Overlay;
use crate::smoothing::{top_expression, SmoothingState};
use crate::types::{BoundingBox, Detection, DisplayedFace, UNKNOWN_LABEL};
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Minimum IoU for a detection to inherit a previous frame's slot.
const SLOT_OVERLAP_THRESHOLD: f32 = 0.3;

/// How detections are mapped to smoothing slots across frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStrategy {
    /// Slot = index of the detection in the frame. Histories follow list
    /// position, so they can jump between faces when the order changes.
    #[default]
    Positional,
    /// Greedy IoU association with the previous frame's boxes.
    Overlap,
}

pub struct DetectionPipeline<A> {
    analyzer: A,
    matcher: IdentityMatcher,
    smoothing: SmoothingState,
    overlay: Overlay,
    slot_strategy: SlotStrategy,
    previous: Vec<(usize, BoundingBox)>,
    faces: Vec<DisplayedFace>,
}

impl<A: FaceAnalyzer> DetectionPipeline<A> {
    pub fn new(analyzer: A, matcher: IdentityMatcher) -> Self {
        Self {
            analyzer,
            matcher,
            smoothing: SmoothingState::default(),
            overlay: Overlay::default(),
            slot_strategy: SlotStrategy::default(),
            previous: Vec::new(),
            faces: Vec::new(),
        }
    }

    pub fn with_slot_strategy(mut self, strategy: SlotStrategy) -> Self {
        self.slot_strategy = strategy;
        self
    }

    /// Run one detection cycle over `image` and return the new face list.
    /// A failed detection leaves the previous overlay and faces in place.
    pub fn process(&mut self, image: &RgbImage) -> Result<Vec<DisplayedFace>, AnalyzerError> {
        let detections = self.analyzer.detect_all(image)?;
        Ok(self.apply(image.dimensions(), detections))
    }

    /// Smooth, identify and draw a frame's detections.
    pub fn apply(&mut self, source: (u32, u32), detections: Vec<Detection>) -> Vec<DisplayedFace> {
        self.overlay.resize(source.0, source.1);
        let display = self.overlay.dimensions();
        let detections: Vec<Detection> = detections
            .iter()
            .map(|d| d.resized(source, display))
            .collect();

        self.overlay.clear();
        let slots = self.assign_slots(&detections);

        let mut faces = Vec::with_capacity(detections.len());
        for (det, &slot) in detections.iter().zip(slots.iter()) {
            let face = self.resolve(slot, det);
            self.overlay.draw_face(&face);
            faces.push(face);
        }

        if self.slot_strategy == SlotStrategy::Overlap {
            self.smoothing.retain_slots(&slots);
        }
        self.previous = slots
            .iter()
            .copied()
            .zip(detections.iter().map(|d| d.bbox.clone()))
            .collect();

        tracing::debug!(faces = faces.len(), "detection cycle complete");
        self.faces = faces.clone();
        faces
    }

    fn resolve(&mut self, slot: usize, det: &Detection) -> DisplayedFace {
        let smoothed = self
            .smoothing
            .observe(slot, det.age, det.gender.map(|g| g.gender));

        let name = match &det.descriptor {
            Some(descriptor) => self.matcher.find_best_match(descriptor).display_label().to_string(),
            None => UNKNOWN_LABEL.to_string(),
        };

        DisplayedFace {
            id: format!("face-{slot}"),
            slot,
            name,
            age: smoothed.age,
            gender: smoothed.gender,
            top_expression: det.expressions.as_ref().and_then(top_expression),
            bbox: det.bbox.clone(),
        }
    }

    fn assign_slots(&self, detections: &[Detection]) -> Vec<usize> {
        match self.slot_strategy {
            SlotStrategy::Positional => (0..detections.len()).collect(),
            SlotStrategy::Overlap => assign_by_overlap(&self.previous, detections),
        }
    }

    /// Faces from the most recent cycle.
    pub fn faces(&self) -> &[DisplayedFace] {
        &self.faces
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    pub fn matcher(&self) -> &IdentityMatcher {
        &self.matcher
    }

    pub fn smoothing(&self) -> &SmoothingState {
        &self.smoothing
    }

    /// Drop the displayed faces and the overlay drawing; histories survive.
    pub fn clear_display(&mut self) {
        self.faces.clear();
        self.overlay.clear();
    }

    /// Forget everything learned from previous frames.
    pub fn reset(&mut self) {
        self.smoothing.reset();
        self.previous.clear();
        self.clear_display();
    }
}

/// Greedy IoU association: best-overlapping pairs claim the previous slot
/// first; leftovers take the lowest slot not claimed this frame.
fn assign_by_overlap(previous: &[(usize, BoundingBox)], detections: &[Detection]) -> Vec<usize> {
    let mut pairs: Vec<(f32, usize, usize)> = Vec::new();
    for (det_idx, det) in detections.iter().enumerate() {
        for &(slot, ref prev) in previous {
            let iou = det.bbox.iou(prev);
            if iou >= SLOT_OVERLAP_THRESHOLD {
                pairs.push((iou, det_idx, slot));
            }
        }
    }
    pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut assigned: Vec<Option<usize>> = vec![None; detections.len()];
    let mut taken: Vec<usize> = Vec::new();
    for (_, det_idx, slot) in pairs {
        if assigned[det_idx].is_none() && !taken.contains(&slot) {
            assigned[det_idx] = Some(slot);
            taken.push(slot);
        }
    }

    assigned
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| {
                let free = (0..).find(|s| !taken.contains(s)).unwrap_or(0);
                taken.push(free);
                free
            })
        })
        .collect()
}
