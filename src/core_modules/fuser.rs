// THEORY:
// The fuser joins the two independent fire signals into one per-frame decision.
// Either signal alone is enough: the color heuristic misses flames outside its
// hue bands, and the detector cross-check misses flames the detector never boxed,
// so demanding agreement would turn each blind spot into a missed fire.

use crate::core_modules::frame::{AnnotatedFrame, CLEAR_STATUS_COLOR, FIRE_STATUS_COLOR};

pub const FIRE_STATUS_LABEL: &str = "Fire Detected!";
pub const CLEAR_STATUS_LABEL: &str = "No Fire";

/// Logical OR of the color-motion and detector signals.
#[inline]
pub fn decide(color_motion_fire: bool, yolo_fire: bool) -> bool {
    color_motion_fire || yolo_fire
}

/// Stamps the status label and border color matching `fire_detected`.
pub fn stamp_status(annotated: &mut AnnotatedFrame, fire_detected: bool) {
    if fire_detected {
        annotated.stamp_status(FIRE_STATUS_LABEL, FIRE_STATUS_COLOR);
    } else {
        annotated.stamp_status(CLEAR_STATUS_LABEL, CLEAR_STATUS_COLOR);
    }
}
