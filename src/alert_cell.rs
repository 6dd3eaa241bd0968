// THEORY:
// The alert cell is the only place where frame processing and presentation
// meet. The frame-processing path is the single writer; any number of readers
// (a UI refresh loop, an alarm player, a status endpoint) hold a subscription.
//
// Every publish replaces the whole snapshot at once, so a reader sees either the
// previous tick or the current one, never a mix. The debounce counters are not
// part of the snapshot; nothing outside the pipeline can touch them.

use crate::core_modules::debouncer::{AlertState, DebouncePhase};
use std::time::Instant;
use tokio::sync::watch;

/// Published view of the alert after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlertSnapshot {
    /// Last processed frame, `None` before the first tick.
    pub frame_id: Option<u64>,
    pub alert: AlertState,
    pub phase: DebouncePhase,
    pub fire_detected: bool,
    /// Time of the last successful notification.
    pub last_notified: Option<Instant>,
}

/// Single-writer side of the cell.
#[derive(Debug)]
pub struct AlertCell {
    sender: watch::Sender<AlertSnapshot>,
}

impl AlertCell {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(AlertSnapshot::default());
        Self { sender }
    }

    /// Atomically replaces the snapshot and wakes every reader.
    pub fn publish(&self, snapshot: AlertSnapshot) {
        self.sender.send_replace(snapshot);
    }

    /// Latest snapshot, copied out.
    pub fn current(&self) -> AlertSnapshot {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> AlertReader {
        AlertReader {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for AlertCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only handle on the alert cell.
#[derive(Debug, Clone)]
pub struct AlertReader {
    receiver: watch::Receiver<AlertSnapshot>,
}

impl AlertReader {
    pub fn current(&self) -> AlertSnapshot {
        *self.receiver.borrow()
    }

    /// Waits for the next publish. Returns `None` once the writer is gone.
    pub async fn changed(&mut self) -> Option<AlertSnapshot> {
        self.receiver.changed().await.ok()?;
        Some(*self.receiver.borrow_and_update())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_see_the_latest_publish() {
        let cell = AlertCell::new();
        let reader = cell.subscribe();
        assert_eq!(reader.current(), AlertSnapshot::default());

        let snapshot = AlertSnapshot {
            frame_id: Some(4),
            alert: AlertState::Armed,
            phase: DebouncePhase::Armed,
            fire_detected: true,
            last_notified: None,
        };
        cell.publish(snapshot);
        assert_eq!(reader.current(), snapshot);
        assert_eq!(cell.current(), snapshot);
    }

    #[test]
    fn publish_without_readers_is_kept() {
        let cell = AlertCell::new();
        cell.publish(AlertSnapshot {
            frame_id: Some(1),
            ..AlertSnapshot::default()
        });
        assert_eq!(cell.subscribe().current().frame_id, Some(1));
    }

    #[tokio::test]
    async fn changed_wakes_on_publish_and_ends_with_writer() {
        let cell = AlertCell::new();
        let mut reader = cell.subscribe();
        cell.publish(AlertSnapshot {
            frame_id: Some(9),
            ..AlertSnapshot::default()
        });
        assert_eq!(reader.changed().await.unwrap().frame_id, Some(9));

        drop(cell);
        assert!(reader.changed().await.is_none());
    }
}
