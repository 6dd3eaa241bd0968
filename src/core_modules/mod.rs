// Per-frame stages, from raw pixels up to the notification gate.

pub mod candidate_extractor;
pub mod debouncer;
pub mod detector_filter;
pub mod frame;
pub mod fuser;
pub mod hsv_pixel;
pub mod notifier_gate;
pub mod segmenter;
