//! Transparent overlay surface with face boxes and caption anchors.
//!
//! Boxes and captions are rasterized onto an RGBA canvas. Captions are also
//! kept as positioned text for front-ends that render their own.

use crate::font;
use crate::types::{BoundingBox, DisplayedFace};
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use serde::Serialize;

const BOX_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
const BOX_LINE_WIDTH: i32 = 2;
/// 7-px glyphs at scale 2, close to a 16 px font.
const CAPTION_SCALE: u32 = 2;
/// Captions sit above the box unless that would leave the canvas.
const CAPTION_MIN_Y: f32 = 20.0;

/// A caption positioned in overlay pixels; `y` is the text baseline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayLabel {
    pub text: String,
    pub x: f32,
    pub y: f32,
}

pub struct Overlay {
    canvas: RgbaImage,
    labels: Vec<OverlayLabel>,
}

impl Default for Overlay {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl Overlay {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: RgbaImage::new(width, height),
            labels: Vec::new(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    /// Match the source dimensions. Resizing discards the previous drawing.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.canvas.dimensions() != (width, height) {
            self.canvas = RgbaImage::new(width, height);
            self.labels.clear();
        }
    }

    pub fn clear(&mut self) {
        for pixel in self.canvas.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
        self.labels.clear();
    }

    /// True when nothing is drawn.
    pub fn is_blank(&self) -> bool {
        self.labels.is_empty() && self.canvas.pixels().all(|p| p.0[3] == 0)
    }

    pub fn labels(&self) -> &[OverlayLabel] {
        &self.labels
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    /// Draw the face's box and its caption.
    pub fn draw_face(&mut self, face: &DisplayedFace) {
        self.draw_box(&face.bbox);
        let y = if face.bbox.y > CAPTION_MIN_Y {
            face.bbox.y - 5.0
        } else {
            face.bbox.y + 15.0
        };
        let label = OverlayLabel {
            text: face.caption(),
            x: face.bbox.x,
            y,
        };
        font::draw_text(
            &mut self.canvas,
            label.x.round() as i32,
            label.y.round() as i32,
            &label.text,
            BOX_COLOR,
            CAPTION_SCALE,
        );
        self.labels.push(label);
    }

    fn draw_box(&mut self, bbox: &BoundingBox) {
        let (x, y) = (bbox.x.round() as i32, bbox.y.round() as i32);
        let (w, h) = (bbox.width.round() as i32, bbox.height.round() as i32);
        for inset in 0..BOX_LINE_WIDTH {
            let (iw, ih) = (w - 2 * inset, h - 2 * inset);
            if iw <= 0 || ih <= 0 {
                break;
            }
            let rect = Rect::at(x + inset, y + inset).of_size(iw as u32, ih as u32);
            draw_hollow_rect_mut(&mut self.canvas, rect, BOX_COLOR);
        }
    }

    /// Blend the overlay onto a copy of `base` (which should match its size).
    pub fn composite(&self, base: &RgbImage) -> RgbImage {
        let mut out = base.clone();
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            let Some(over) = self.canvas.get_pixel_checked(x, y) else {
                continue;
            };
            let alpha = over.0[3] as f32 / 255.0;
            if alpha == 0.0 {
                continue;
            }
            let mut rgb = [0u8; 3];
            for c in 0..3 {
                rgb[c] = (over.0[c] as f32 * alpha + pixel.0[c] as f32 * (1.0 - alpha)).round() as u8;
            }
            *pixel = Rgb(rgb);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Expression, Gender};

    fn face(x: f32, y: f32) -> DisplayedFace {
        DisplayedFace {
            id: "face-0".into(),
            slot: 0,
            name: "Unknown".into(),
            age: 30.0,
            gender: Gender::Male,
            top_expression: Some(Expression::Neutral),
            bbox: BoundingBox {
                x, y, width: 20.0, height: 20.0,
                confidence: 0.9, landmarks: None,
            },
        }
    }

    #[test]
    fn test_draw_face_marks_box_edges() {
        let mut overlay = Overlay::new(100, 100);
        overlay.draw_face(&face(30.0, 40.0));
        assert_eq!(*overlay.canvas().get_pixel(30, 40), BOX_COLOR);
        assert_eq!(*overlay.canvas().get_pixel(31, 41), BOX_COLOR);
        assert_eq!(overlay.canvas().get_pixel(40, 50).0[3], 0);
        assert_eq!(overlay.labels()[0].text, "Unknown, 30 yrs, male, neutral");
    }

    #[test]
    fn test_caption_anchor() {
        let mut overlay = Overlay::new(100, 100);
        overlay.draw_face(&face(10.0, 40.0));
        overlay.draw_face(&face(10.0, 10.0));
        assert_eq!(overlay.labels()[0].y, 35.0);
        assert_eq!(overlay.labels()[1].y, 25.0);
    }

    #[test]
    fn test_clear_and_resize() {
        let mut overlay = Overlay::new(100, 100);
        overlay.draw_face(&face(10.0, 10.0));
        assert!(!overlay.is_blank());
        overlay.clear();
        assert!(overlay.is_blank());

        overlay.draw_face(&face(10.0, 10.0));
        overlay.resize(64, 48);
        assert_eq!(overlay.dimensions(), (64, 48));
        assert!(overlay.is_blank());
    }

    #[test]
    fn test_box_partly_outside_canvas() {
        let mut overlay = Overlay::new(32, 32);
        overlay.draw_face(&face(25.0, -5.0));
        assert_eq!(overlay.labels().len(), 1);
    }

    #[test]
    fn test_composite() {
        let mut overlay = Overlay::new(50, 50);
        overlay.draw_face(&face(5.0, 5.0));
        let base = RgbImage::from_pixel(50, 50, Rgb([0, 0, 255]));
        let out = overlay.composite(&base);
        assert_eq!(out.get_pixel(5, 5).0, [255, 0, 0]);
        assert_eq!(out.get_pixel(15, 22).0, [0, 0, 255]);
    }

    fn caption_pixels(overlay: &Overlay, top: u32, bottom: u32, x0: u32, x1: u32) -> usize {
        (top..bottom)
            .flat_map(|y| (x0..x1).map(move |x| (x, y)))
            .filter(|&(x, y)| overlay.canvas().get_pixel(x, y).0[3] != 0)
            .count()
    }

    #[test]
    fn test_caption_rasterized_above_box() {
        let mut overlay = Overlay::new(300, 100);
        overlay.draw_face(&face(10.0, 40.0));
        // Baseline at y = 35, glyphs 14 px tall.
        assert!(caption_pixels(&overlay, 21, 35, 10, 200) > 0);
        assert_eq!(caption_pixels(&overlay, 0, 21, 0, 300), 0);
    }

    #[test]
    fn test_caption_rasterized_inside_box_near_top() {
        let mut overlay = Overlay::new(300, 100);
        overlay.draw_face(&face(10.0, 10.0));
        // Baseline at y = 25; columns right of the box hold only caption pixels.
        assert!(caption_pixels(&overlay, 12, 25, 31, 200) > 0);
    }
}
