// THEORY:
// The `segmenter` is the first analysis stage. It turns a raw frame into binary
// masks (0 or 255 per pixel) answering two questions: "is this pixel
// fire-colored?" and "did this pixel change since the previous frame?".
//
// 1.  **Color**: every pixel is converted to 8-bit HSV and tested against each
//     configured `ColorRange`; the union of those tests is the raw color mask.
// 2.  **Cleanup**: a 3x3 opening removes isolated speckle, then a 3x3 closing
//     fills pinholes inside flame bodies.
// 3.  **Motion**: with a previous frame available, the per-channel absolute
//     difference is reduced to gray and thresholded. The combined mask keeps
//     only fire-colored pixels that also moved. On the first frame of a session
//     there is nothing to compare against and the color mask is used as-is.
//
// The segmenter is stateless. The caller owns the previous frame, so calling
// `segment` twice with the same inputs always yields the same masks.

use crate::config::ColorRange;
use crate::core_modules::frame::Frame;
use crate::core_modules::hsv_pixel::pixel::Pixel;
use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, open};
use tracing::warn;

pub const MASK_ON: u8 = 255;
pub const MASK_OFF: u8 = 0;

/// Radius of the square structuring element (1 => 3x3).
const MORPHOLOGY_RADIUS: u8 = 1;

/// The masks produced for a single frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    /// Fire-colored pixels after opening and closing.
    pub fire_color: GrayImage,
    /// Moving pixels, absent on the first frame of a session.
    pub motion: Option<GrayImage>,
    /// `fire_color AND motion`, or `fire_color` when there is no motion reference.
    pub combined: GrayImage,
}

/// Stateless color-motion segmenter.
#[derive(Debug, Clone)]
pub struct Segmenter {
    color_ranges: Vec<ColorRange>,
    motion_threshold: u8,
}

impl Segmenter {
    pub fn new(color_ranges: Vec<ColorRange>, motion_threshold: u8) -> Self {
        Self {
            color_ranges,
            motion_threshold,
        }
    }

    pub fn segment(&self, frame: &Frame, previous: Option<&Frame>) -> Segmentation {
        let fire_color = self.fire_color_mask(frame);

        let motion = match previous {
            Some(prev) if prev.dimensions() == frame.dimensions() => {
                Some(self.motion_mask(frame, prev))
            }
            Some(prev) => {
                warn!(
                    "Previous frame {} is {:?} but frame {} is {:?}; skipping motion",
                    prev.frame_id,
                    prev.dimensions(),
                    frame.frame_id,
                    frame.dimensions()
                );
                None
            }
            None => None,
        };

        let combined = match &motion {
            Some(motion) => intersect(&fire_color, motion),
            None => fire_color.clone(),
        };

        Segmentation {
            fire_color,
            motion,
            combined,
        }
    }

    /// Union of every configured color band, cleaned by open then close.
    pub fn fire_color_mask(&self, frame: &Frame) -> GrayImage {
        let (width, height) = frame.dimensions();
        let mut raw = GrayImage::new(width, height);
        for (x, y, rgb) in frame.image.enumerate_pixels() {
            let hsv = Pixel::from(*rgb).hsv();
            if self.color_ranges.iter().any(|range| range.contains(hsv)) {
                raw.put_pixel(x, y, Luma([MASK_ON]));
            }
        }

        let opened = open(&raw, Norm::LInf, MORPHOLOGY_RADIUS);
        close(&opened, Norm::LInf, MORPHOLOGY_RADIUS)
    }

    /// Pixels whose gray-level difference to `previous` exceeds the motion threshold.
    pub fn motion_mask(&self, frame: &Frame, previous: &Frame) -> GrayImage {
        let (width, height) = frame.dimensions();
        let mut mask = GrayImage::new(width, height);
        for ((x, y, current), before) in frame
            .image
            .enumerate_pixels()
            .zip(previous.image.pixels())
        {
            let diff = Pixel::from(*current).abs_diff(&Pixel::from(*before));
            if diff.gray() > self.motion_threshold {
                mask.put_pixel(x, y, Luma([MASK_ON]));
            }
        }
        mask
    }
}

/// Pixel-wise AND of two equally sized masks.
pub fn intersect(a: &GrayImage, b: &GrayImage) -> GrayImage {
    let mut out = GrayImage::new(a.width(), a.height());
    for ((o, pa), pb) in out.pixels_mut().zip(a.pixels()).zip(b.pixels()) {
        if pa.0[0] != MASK_OFF && pb.0[0] != MASK_OFF {
            *o = Luma([MASK_ON]);
        }
    }
    out
}

pub fn count_set(mask: &GrayImage) -> usize {
    mask.pixels().filter(|p| p.0[0] != MASK_OFF).count()
}
