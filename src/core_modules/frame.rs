// THEORY:
// The `frame` module holds the "dumb" data containers that flow between the
// analysis stages: the immutable input `Frame`, the `AnnotatedFrame` that each
// stage decorates, and the `BoundingBox` shared by candidates and detections.
//
// A `Frame` is never mutated once captured. Stages that want to draw do so on
// the `AnnotatedFrame`, which starts as a private copy of the input raster.
// Label text is carried alongside the pixels as `Overlay` records; turning it
// into glyphs is the presentation layer's job.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::sync::Arc;
use std::time::Instant;

pub const CANDIDATE_COLOR: Rgb<u8> = Rgb([255, 165, 0]);
pub const DETECTION_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const FIRE_STATUS_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const CLEAR_STATUS_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

const BOX_THICKNESS: u32 = 2;
const BORDER_THICKNESS: u32 = 4;

/// A single captured raster. Cheap to clone; the pixels are shared.
#[derive(Debug, Clone)]
pub struct Frame {
    pub frame_id: u64,
    pub captured_at: Instant,
    pub image: Arc<RgbImage>,
}

impl Frame {
    pub fn new(frame_id: u64, image: RgbImage) -> Self {
        Self {
            frame_id,
            captured_at: Instant::now(),
            image: Arc::new(image),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Axis-aligned box in pixel coordinates. `width` and `height` are inclusive extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Builds a box from corner coordinates, clamped to `(frame_width, frame_height)`.
    /// Returns `None` when nothing of the box lies inside the frame.
    pub fn from_corners(
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<Self> {
        let clamp = |v: f32, max: u32| -> u32 { v.max(0.0).min(max as f32) as u32 };
        let (left, right) = (x1.min(x2), x1.max(x2));
        let (top, bottom) = (y1.min(y2), y1.max(y2));
        let x0 = clamp(left, frame_width);
        let y0 = clamp(top, frame_height);
        let x1 = clamp(right, frame_width);
        let y1 = clamp(bottom, frame_height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Self::new(x0, y0, x1 - x0, y1 - y0))
    }

    /// Width over height; zero when the box has no height.
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            0.0
        } else {
            self.width as f64 / self.height as f64
        }
    }

    fn to_rect(self) -> Option<Rect> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        Some(Rect::at(self.x as i32, self.y as i32).of_size(self.width, self.height))
    }
}

/// A labelled box stamped onto an annotated frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub bbox: BoundingBox,
    pub label: String,
    pub color: Rgb<u8>,
}

/// A frame copy carrying everything the stages drew on it.
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    pub frame_id: u64,
    pub image: RgbImage,
    pub overlays: Vec<Overlay>,
    /// Status banner text, set once per tick by the fuser.
    pub status: Option<Overlay>,
}

impl AnnotatedFrame {
    pub fn from_frame(frame: &Frame) -> Self {
        Self {
            frame_id: frame.frame_id,
            image: frame.image.as_ref().clone(),
            overlays: Vec::new(),
            status: None,
        }
    }

    /// Draws a hollow box and records its label.
    pub fn draw_box(&mut self, bbox: BoundingBox, label: String, color: Rgb<u8>) {
        for inset in 0..BOX_THICKNESS {
            let shrunk = BoundingBox::new(
                bbox.x + inset,
                bbox.y + inset,
                bbox.width.saturating_sub(2 * inset),
                bbox.height.saturating_sub(2 * inset),
            );
            if let Some(rect) = shrunk.to_rect() {
                draw_hollow_rect_mut(&mut self.image, rect, color);
            }
        }
        self.overlays.push(Overlay { bbox, label, color });
    }

    /// Paints a solid border around the whole frame and sets the status label.
    pub fn stamp_status(&mut self, label: &str, color: Rgb<u8>) {
        let (width, height) = self.image.dimensions();
        let frame_box = BoundingBox::new(0, 0, width, height);
        for inset in 0..BORDER_THICKNESS.min(width / 2).min(height / 2) {
            let ring = BoundingBox::new(
                inset,
                inset,
                width - 2 * inset,
                height - 2 * inset,
            );
            if let Some(rect) = ring.to_rect() {
                draw_hollow_rect_mut(&mut self.image, rect, color);
            }
        }
        self.status = Some(Overlay {
            bbox: frame_box,
            label: label.to_string(),
            color,
        });
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.overlays.iter().map(|o| o.label.as_str())
    }
}
