// THEORY:
// The `candidate_extractor` is the engine of the spatial grouping stage. It takes
// the combined color-motion mask of one frame and finds the connected regions
// that look like a flame.
//
// Algorithm steps:
// 1.  **Contour Tracing**: only the outermost borders of the mask are traced.
//     Holes and anything nested inside a region are part of that region.
// 2.  **Area Filter**: the polygon area enclosed by each border is compared to a
//     minimum. Small specks are sensor noise, not fire.
// 3.  **Shape Filter**: the bounding box aspect ratio (width / height) must sit
//     strictly inside an open interval. Flames run from tall-and-thin to roughly
//     square; very thin slivers and flat bands are rejected.
// 4.  **Stateless Utility**: like the segmenter, the extractor has no memory. Its
//     candidates are valid for the current frame only.

use crate::core_modules::frame::{AnnotatedFrame, BoundingBox, CANDIDATE_COLOR};
use image::GrayImage;
use imageproc::contours::{BorderType, find_contours};
use imageproc::point::Point;

pub const CANDIDATE_LABEL: &str = "Fire (Color+Motion)";

/// Why a region was or was not accepted as a flame candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateVerdict {
    Accepted,
    TooSmall,
    BadAspectRatio,
}

/// A connected region of the combined mask for the current frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRegion {
    pub bbox: BoundingBox,
    /// Polygon area enclosed by the outer border, in px².
    pub area: f64,
    /// `bbox.width / bbox.height`.
    pub aspect_ratio: f64,
    pub verdict: CandidateVerdict,
}

impl CandidateRegion {
    pub fn is_accepted(&self) -> bool {
        self.verdict == CandidateVerdict::Accepted
    }
}

/// Area and shape limits for flame candidates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateRules {
    pub min_area: f64,
    /// Open interval `(low, high)` of accepted aspect ratios.
    pub aspect_ratio_bounds: (f64, f64),
}

/// Result of scanning one mask.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateReport {
    pub candidates: Vec<CandidateRegion>,
    pub color_motion_fire: bool,
}

impl CandidateReport {
    pub fn accepted(&self) -> impl Iterator<Item = &CandidateRegion> {
        self.candidates.iter().filter(|c| c.is_accepted())
    }

    /// Draws every accepted region with its label.
    pub fn annotate(&self, annotated: &mut AnnotatedFrame) {
        for candidate in self.accepted() {
            annotated.draw_box(candidate.bbox, CANDIDATE_LABEL.to_string(), CANDIDATE_COLOR);
        }
    }
}

pub mod candidate_extractor {
    use super::*; // Make structs from parent module available.

    /// Traces the outer borders of `mask` and scores each as a flame candidate.
    pub fn extract(mask: &GrayImage, rules: &CandidateRules) -> CandidateReport {
        // Border following misreads regions touching the image edge, so trace a
        // copy framed by one background pixel and shift the points back.
        let contours = find_contours::<i32>(&pad_with_background(mask));

        let mut candidates = Vec::new();
        for contour in contours
            .iter()
            .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        {
            if contour.points.is_empty() {
                continue;
            }
            let points: Vec<Point<i32>> = contour
                .points
                .iter()
                .map(|p| Point::new(p.x - 1, p.y - 1))
                .collect();
            candidates.push(score_region(&points, rules));
        }

        let color_motion_fire = candidates.iter().any(|c| c.is_accepted());
        CandidateReport {
            candidates,
            color_motion_fire,
        }
    }

    fn score_region(points: &[Point<i32>], rules: &CandidateRules) -> CandidateRegion {
        let area = polygon_area(points);
        let bbox = bounding_box(points);
        let aspect_ratio = bbox.aspect_ratio();
        let (low, high) = rules.aspect_ratio_bounds;

        let verdict = if area <= rules.min_area {
            CandidateVerdict::TooSmall
        } else if aspect_ratio > low && aspect_ratio < high {
            CandidateVerdict::Accepted
        } else {
            CandidateVerdict::BadAspectRatio
        };

        CandidateRegion {
            bbox,
            area,
            aspect_ratio,
            verdict,
        }
    }

    /// `mask` surrounded by a one pixel wide background frame.
    pub fn pad_with_background(mask: &GrayImage) -> GrayImage {
        let mut padded = GrayImage::new(mask.width() + 2, mask.height() + 2);
        for (x, y, pixel) in mask.enumerate_pixels() {
            padded.put_pixel(x + 1, y + 1, *pixel);
        }
        padded
    }

    /// Shoelace area of a closed border.
    pub fn polygon_area(points: &[Point<i32>]) -> f64 {
        if points.len() < 3 {
            return 0.0;
        }
        let mut twice_area: i64 = 0;
        for (i, p) in points.iter().enumerate() {
            let q = &points[(i + 1) % points.len()];
            twice_area += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
        }
        twice_area.abs() as f64 / 2.0
    }

    /// Inclusive pixel extent of a border.
    pub fn bounding_box(points: &[Point<i32>]) -> BoundingBox {
        let mut min_x = i32::MAX;
        let mut min_y = i32::MAX;
        let mut max_x = i32::MIN;
        let mut max_y = i32::MIN;
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        BoundingBox::new(
            min_x.max(0) as u32,
            min_y.max(0) as u32,
            (max_x - min_x + 1) as u32,
            (max_y - min_y + 1) as u32,
        )
    }
}
