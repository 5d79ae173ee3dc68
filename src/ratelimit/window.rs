//! Reservation window backing the sliding-window admission decision.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Length of the sliding window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// FIFO queue of reserved admission slots.
///
/// Entries are kept in insertion order and only ever leave from the front.
/// An entry records the time a slot was scheduled to be consumed, which may
/// lie in the future at the moment it is appended.
#[derive(Debug, Default)]
pub struct ReservationWindow {
    slots: VecDeque<Instant>,
}

impl ReservationWindow {
    /// Create an empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop front entries older than [`WINDOW`] relative to `now`.
    ///
    /// Returns the number of entries removed. Entries still in the future
    /// have an age of zero.
    pub fn prune(&mut self, now: Instant) -> usize {
        let mut removed = 0;

        while let Some(front) = self.slots.front() {
            if now.saturating_duration_since(*front) > WINDOW {
                self.slots.pop_front();
                removed += 1;
            } else {
                break;
            }
        }

        removed
    }

    /// Append a reservation at `at`.
    pub fn push(&mut self, at: Instant) {
        self.slots.push_back(at);
    }

    /// The oldest reservation, if any.
    pub fn front(&self) -> Option<Instant> {
        self.slots.front().copied()
    }

    /// Number of reservations currently held.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the window holds no reservations.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterate over reservations, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Instant> {
        self.slots.iter()
    }
}
