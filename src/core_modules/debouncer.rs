// THEORY:
// The `debouncer` adds memory to the per-frame decisions. A single frame is a
// noisy witness: a reflection can look like a flame for one tick, and a real
// flame can vanish behind smoke or a passer-by for a few. The debouncer turns
// that flicker into a stable, externally visible alert.
//
// Key principles:
// 1.  **Two Counters**: it counts consecutive positive and consecutive negative
//     ticks. Observing one kind of tick resets the other counter.
// 2.  **Asymmetric Hysteresis**: the alert latches after `fire_threshold`
//     positives but only releases after `clear_threshold` negatives, and the
//     clear threshold is always the larger of the two. Latch fast, release slow.
// 3.  **Lifecycle**: Off -> PendingFire -> Armed -> PendingClear -> Off. The
//     pending phases are visible to presentation, but only Off and Armed are
//     alert states. There is no terminal phase.
// 4.  **Single Owner**: the counters belong to whoever feeds the ticks. Readers
//     only ever see published snapshots, never the debouncer itself.

use std::fmt;

/// Externally visible alert state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlertState {
    #[default]
    Off,
    Armed,
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertState::Off => write!(f, "OFF"),
            AlertState::Armed => write!(f, "ARMED"),
        }
    }
}

/// Fine-grained debounce phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DebouncePhase {
    /// Alert inactive, no positive streak.
    #[default]
    Off,
    /// Alert inactive, positive streak below the fire threshold.
    PendingFire,
    /// Alert active, no negative streak.
    Armed,
    /// Alert active, negative streak below the clear threshold.
    PendingClear,
}

impl DebouncePhase {
    pub fn alert_state(&self) -> AlertState {
        match self {
            DebouncePhase::Off | DebouncePhase::PendingFire => AlertState::Off,
            DebouncePhase::Armed | DebouncePhase::PendingClear => AlertState::Armed,
        }
    }
}

impl fmt::Display for DebouncePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DebouncePhase::Off => "OFF",
            DebouncePhase::PendingFire => "PENDING_FIRE",
            DebouncePhase::Armed => "ARMED",
            DebouncePhase::PendingClear => "PENDING_CLEAR",
        };
        write!(f, "{}", name)
    }
}

/// An alert edge, reported on the tick it happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertTransition {
    Raised,
    Cleared,
}

/// What one tick did to the debouncer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceOutcome {
    pub alert: AlertState,
    pub phase: DebouncePhase,
    pub transition: Option<AlertTransition>,
}

/// Hysteresis state machine over per-frame fire decisions.
#[derive(Debug, Clone)]
pub struct AlertDebouncer {
    fire_threshold: u32,
    clear_threshold: u32,
    consecutive_fire_count: u32,
    consecutive_clear_count: u32,
    phase: DebouncePhase,
}

impl AlertDebouncer {
    /// Thresholds are expected to be validated by `FireConfig::validate`.
    pub fn new(fire_threshold: u32, clear_threshold: u32) -> Self {
        Self {
            fire_threshold: fire_threshold.max(1),
            clear_threshold: clear_threshold.max(1),
            consecutive_fire_count: 0,
            consecutive_clear_count: 0,
            phase: DebouncePhase::Off,
        }
    }

    /// Feeds one decision and advances the state machine.
    pub fn update(&mut self, fire_detected: bool) -> DebounceOutcome {
        let before = self.phase.alert_state();

        if fire_detected {
            self.consecutive_fire_count = self.consecutive_fire_count.saturating_add(1);
            self.consecutive_clear_count = 0;
        } else {
            self.consecutive_clear_count = self.consecutive_clear_count.saturating_add(1);
            self.consecutive_fire_count = 0;
        }

        self.phase = match (before, fire_detected) {
            (AlertState::Off, true) if self.consecutive_fire_count >= self.fire_threshold => {
                DebouncePhase::Armed
            }
            (AlertState::Off, true) => DebouncePhase::PendingFire,
            (AlertState::Off, false) => DebouncePhase::Off,
            (AlertState::Armed, true) => DebouncePhase::Armed,
            (AlertState::Armed, false) if self.consecutive_clear_count >= self.clear_threshold => {
                DebouncePhase::Off
            }
            (AlertState::Armed, false) => DebouncePhase::PendingClear,
        };

        let after = self.phase.alert_state();
        let transition = match (before, after) {
            (AlertState::Off, AlertState::Armed) => Some(AlertTransition::Raised),
            (AlertState::Armed, AlertState::Off) => Some(AlertTransition::Cleared),
            _ => None,
        };

        DebounceOutcome {
            alert: after,
            phase: self.phase,
            transition,
        }
    }

    /// Applies new thresholds between ticks. Streak counters carry over.
    pub fn set_thresholds(&mut self, fire_threshold: u32, clear_threshold: u32) {
        self.fire_threshold = fire_threshold.max(1);
        self.clear_threshold = clear_threshold.max(1);
    }

    pub fn alert_state(&self) -> AlertState {
        self.phase.alert_state()
    }

    /// True while the current positive streak is at or past the fire threshold.
    pub fn fire_streak_reached(&self) -> bool {
        self.consecutive_fire_count >= self.fire_threshold
    }

    pub fn phase(&self) -> DebouncePhase {
        self.phase
    }

    pub fn consecutive_fire_count(&self) -> u32 {
        self.consecutive_fire_count
    }

    pub fn consecutive_clear_count(&self) -> u32 {
        self.consecutive_clear_count
    }
}
