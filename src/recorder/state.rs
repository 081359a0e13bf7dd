//! Recorder lifecycle state
//!
//! `Idle -> Starting -> Recording -> Stopping -> Idle`. Callers on any thread move the
//! state with compare-and-set so that duplicate starts and stops are detected before
//! anything is posted to the worker.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

/// Current state of the recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum RecorderState {
    /// No recording in progress
    #[default]
    Idle = 0,
    /// Start accepted, encoders and container being set up
    Starting = 1,
    /// Frames and audio are being encoded
    Recording = 2,
    /// Flushing encoders and closing the container
    Stopping = 3,
}

impl RecorderState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RecorderState::Starting,
            2 => RecorderState::Recording,
            3 => RecorderState::Stopping,
            _ => RecorderState::Idle,
        }
    }

    /// Whether frames submitted now will be accepted
    pub fn accepts_frames(self) -> bool {
        matches!(self, RecorderState::Starting | RecorderState::Recording)
    }
}

/// Atomic holder for [`RecorderState`]
#[derive(Debug, Default)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(RecorderState::Idle as u8))
    }

    pub(crate) fn get(&self) -> RecorderState {
        RecorderState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn set(&self, state: RecorderState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Move to `to` if the current state is one of `from`.
    ///
    /// Returns the previous state on success, the observed state on failure.
    pub(crate) fn transition(
        &self,
        from: &[RecorderState],
        to: RecorderState,
    ) -> Result<RecorderState, RecorderState> {
        let mut current = self.get();
        loop {
            if !from.contains(&current) {
                return Err(current);
            }
            match self.0.compare_exchange(
                current as u8,
                to as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(current),
                Err(actual) => current = RecorderState::from_u8(actual),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_transition_from_allowed_state() {
        let cell = StateCell::new();
        assert_eq!(
            cell.transition(&[RecorderState::Idle], RecorderState::Starting),
            Ok(RecorderState::Idle)
        );
        assert_eq!(cell.get(), RecorderState::Starting);
    }

    #[test]
    fn test_transition_rejected_leaves_state() {
        let cell = StateCell::new();
        cell.set(RecorderState::Recording);

        assert_eq!(
            cell.transition(&[RecorderState::Idle], RecorderState::Starting),
            Err(RecorderState::Recording)
        );
        assert_eq!(cell.get(), RecorderState::Recording);
    }

    #[test]
    fn test_only_one_concurrent_transition_wins() {
        let cell = Arc::new(StateCell::new());
        cell.set(RecorderState::Recording);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cell = Arc::clone(&cell);
                std::thread::spawn(move || {
                    cell.transition(
                        &[RecorderState::Starting, RecorderState::Recording],
                        RecorderState::Stopping,
                    )
                    .is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(cell.get(), RecorderState::Stopping);
    }

    #[test]
    fn test_accepts_frames() {
        assert!(RecorderState::Starting.accepts_frames());
        assert!(RecorderState::Recording.accepts_frames());
        assert!(!RecorderState::Idle.accepts_frames());
        assert!(!RecorderState::Stopping.accepts_frames());
    }
}
