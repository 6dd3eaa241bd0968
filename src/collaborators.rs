//! Seams to the world outside the core: the object detector, the notification
//! transport and the frame source. The pipeline only ever talks to these traits.

use crate::core_modules::frame::{AnnotatedFrame, BoundingBox, Frame};
use crate::error::{DetectorError, FireError, NotifyError};
use image::RgbImage;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// One box reported by an object detector, in frame pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionBox {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Parameters handed to the detector on every call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceRequest {
    pub confidence_threshold: f32,
    /// Square resolution the detector should run at; boxes still come back in frame coordinates.
    pub inference_size: u32,
}

/// A general-purpose object detector.
pub trait Detector: Send {
    fn infer(
        &mut self,
        frame: &Frame,
        request: &InferenceRequest,
    ) -> Result<Vec<DetectionBox>, DetectorError>;
}

/// Outbound notification transport. Throttling is the caller's job.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send {
    fn notify(&self, frame: &AnnotatedFrame) -> Result<(), NotifyError>;
}

/// Audible alarm. `sound` must return at once; playback runs in the background.
pub trait Alarm: Send {
    fn is_playing(&self) -> bool;
    fn sound(&self);
}

/// What the pipeline did with the alarm on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmOutcome {
    Started,
    /// A previous alarm is still playing; nothing new was started.
    AlreadyPlaying,
}

/// Pull-style frame supply. `Ok(None)` means the source is exhausted.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, FireError>;
}

/// Detector that never sees anything, leaving the color-motion signal alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDetector;

impl Detector for NoDetector {
    fn infer(
        &mut self,
        _frame: &Frame,
        _request: &InferenceRequest,
    ) -> Result<Vec<DetectionBox>, DetectorError> {
        Ok(Vec::new())
    }
}

/// Notifier that only writes the alert to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, frame: &AnnotatedFrame) -> Result<(), NotifyError> {
        info!(
            "FIRE ALERT: frame {} ({} marked regions)",
            frame.frame_id,
            frame.overlays.len()
        );
        Ok(())
    }
}

/// Alarm that only writes to the log. It never stays playing.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlarm;

impl Alarm for LogAlarm {
    fn is_playing(&self) -> bool {
        false
    }

    fn sound(&self) {
        warn!("FIRE ALARM");
    }
}

/// Alarm that runs an external player (e.g. `aplay alarm.wav`) on its own thread.
#[derive(Debug, Clone)]
pub struct CommandAlarm {
    program: String,
    args: Vec<String>,
    playing: Arc<AtomicBool>,
}

impl CommandAlarm {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            playing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Splits a command line on whitespace. `None` for an empty line.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

impl Alarm for CommandAlarm {
    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    fn sound(&self) {
        if self
            .playing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let playing = Arc::clone(&self.playing);
        let program = self.program.clone();
        let args = self.args.clone();
        std::thread::spawn(move || {
            match Command::new(&program).args(&args).status() {
                Ok(status) if status.success() => debug!("Alarm player {} finished", program),
                Ok(status) => warn!("Alarm player {} exited with {}", program, status),
                Err(err) => warn!("Failed to play alarm with {}: {}", program, err),
            }
            playing.store(false, Ordering::Release);
        });
    }
}

/// Notifier that saves the annotated frame as a JPEG snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotNotifier {
    directory: PathBuf,
}

impl SnapshotNotifier {
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, FireError> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl Notifier for SnapshotNotifier {
    fn notify(&self, frame: &AnnotatedFrame) -> Result<(), NotifyError> {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f");
        let path = self
            .directory
            .join(format!("fire_{}_{:06}.jpg", stamp, frame.frame_id));
        frame
            .image
            .save(&path)
            .map_err(|e| NotifyError::Delivery(format!("{}: {}", path.display(), e)))?;
        info!("Fire snapshot written to {}", path.display());
        Ok(())
    }
}

/// Frames from a directory of PNG/JPEG files, in file name order.
#[derive(Debug)]
pub struct ImageDirSource {
    files: VecDeque<PathBuf>,
    next_id: u64,
}

impl ImageDirSource {
    pub fn open(directory: &Path) -> Result<Self, FireError> {
        let entries = std::fs::read_dir(directory).map_err(|e| {
            FireError::SourceUnavailable(format!("{}: {}", directory.display(), e))
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_image_file(path))
            .collect();
        files.sort();

        if files.is_empty() {
            warn!("No image files found in {}", directory.display());
        }
        debug!("Frame source {} holds {} frames", directory.display(), files.len());

        Ok(Self {
            files: files.into(),
            next_id: 0,
        })
    }

    pub fn remaining(&self) -> usize {
        self.files.len()
    }
}

impl FrameSource for ImageDirSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, FireError> {
        let Some(path) = self.files.pop_front() else {
            return Ok(None);
        };
        let image = image::open(&path)
            .map_err(|e| FireError::SourceUnavailable(format!("{}: {}", path.display(), e)))?
            .to_rgb8();
        let frame = Frame::new(self.next_id, image);
        self.next_id += 1;
        Ok(Some(frame))
    }
}

/// In-memory frame source.
#[derive(Debug, Default)]
pub struct MemorySource {
    images: VecDeque<RgbImage>,
    next_id: u64,
}

impl MemorySource {
    pub fn new(images: Vec<RgbImage>) -> Self {
        Self {
            images: images.into(),
            next_id: 0,
        }
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Option<Frame>, FireError> {
        Ok(self.images.pop_front().map(|image| {
            let frame = Frame::new(self.next_id, image);
            self.next_id += 1;
            frame
        }))
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_source_numbers_frames() {
        let mut source = MemorySource::new(vec![RgbImage::new(4, 4), RgbImage::new(4, 4)]);
        assert_eq!(source.next_frame().unwrap().unwrap().frame_id, 0);
        assert_eq!(source.next_frame().unwrap().unwrap().frame_id, 1);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn no_detector_reports_nothing() {
        let frame = Frame::new(0, RgbImage::new(4, 4));
        let request = InferenceRequest {
            confidence_threshold: 0.3,
            inference_size: 256,
        };
        assert!(NoDetector.infer(&frame, &request).unwrap().is_empty());
    }

    fn wait_until_quiet(alarm: &CommandAlarm) -> bool {
        for _ in 0..100 {
            if !alarm.is_playing() {
                return true;
            }
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
        false
    }

    #[test]
    fn command_alarm_is_not_restarted_while_playing() {
        let alarm = CommandAlarm::new("sleep", vec!["1".to_string()]);
        alarm.sound();
        assert!(alarm.is_playing());

        // A second start while the first player runs is ignored.
        alarm.sound();
        assert!(alarm.is_playing());
        assert!(wait_until_quiet(&alarm));
    }

    #[test]
    fn command_alarm_recovers_from_missing_player() {
        let alarm = CommandAlarm::new("/nonexistent/alarm-player", Vec::new());
        alarm.sound();
        assert!(wait_until_quiet(&alarm));
    }

    #[test]
    fn command_line_parsing() {
        let alarm = CommandAlarm::from_command_line("aplay -q assets/alarm.wav").unwrap();
        assert_eq!(alarm.program, "aplay");
        assert_eq!(alarm.args, vec!["-q", "assets/alarm.wav"]);
        assert!(CommandAlarm::from_command_line("   ").is_none());
    }

    #[test]
    fn image_extensions() {
        assert!(is_image_file(Path::new("a/frame_001.PNG")));
        assert!(is_image_file(Path::new("frame.jpeg")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("frame")));
    }
}
