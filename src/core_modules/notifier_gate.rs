// THEORY:
// The notifier gate throttles outbound notifications to one per cooldown window.
// It does not look at the debouncer: every positive decision may
// attempt a notification, and only the cooldown clock decides whether the
// attempt reaches the notification collaborator.
//
// The clock only advances on a successful delivery. A failed attempt is logged
// and swallowed, so the very next positive tick retries.

use crate::collaborators::Notifier;
use crate::core_modules::frame::AnnotatedFrame;
use crate::error::NotifyError;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Result of a single notification attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum NotifyOutcome {
    /// The collaborator accepted the notification; the cooldown restarted.
    Sent,
    /// Suppressed because the last successful notification is too recent.
    CoolingDown { remaining: Duration },
    /// The collaborator failed; the cooldown clock was left untouched.
    Failed(NotifyError),
}

impl NotifyOutcome {
    pub fn notified(&self) -> bool {
        matches!(self, NotifyOutcome::Sent)
    }
}

/// Cooldown-limited front door to a notification collaborator.
#[derive(Debug, Clone)]
pub struct NotifierGate {
    cooldown: Duration,
    last_notified: Option<Instant>,
}

impl NotifierGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_notified: None,
        }
    }

    /// Delegates to `notifier` unless the cooldown since the last success is still running.
    pub fn maybe_notify(
        &mut self,
        now: Instant,
        notifier: &dyn Notifier,
        frame: &AnnotatedFrame,
    ) -> NotifyOutcome {
        if let Some(last) = self.last_notified {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.cooldown {
                return NotifyOutcome::CoolingDown {
                    remaining: self.cooldown - elapsed,
                };
            }
        }

        match notifier.notify(frame) {
            Ok(()) => {
                self.last_notified = Some(now);
                info!("Fire notification sent for frame {}", frame.frame_id);
                NotifyOutcome::Sent
            }
            Err(err) => {
                warn!(
                    "Fire notification for frame {} failed, will retry: {}",
                    frame.frame_id, err
                );
                NotifyOutcome::Failed(err)
            }
        }
    }

    pub fn last_notified(&self) -> Option<Instant> {
        self.last_notified
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Changes the cooldown between ticks. The last delivery time is kept.
    pub fn set_cooldown(&mut self, cooldown: Duration) {
        self.cooldown = cooldown;
    }
}
