//! Latest-state cell shared between the dispatch thread and UI consumers.
//!
//! The dispatcher overwrites the cell after every processed report; readers
//! see whichever state was published last. There is no queue: states
//! published between two reads are simply never observed.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, PoisonError, RwLock,
    },
    time::{Duration, Instant},
};

use crate::pad::ControllerState;

#[derive(Debug, Default)]
struct Slot {
    state: RwLock<Arc<ControllerState>>,
    generation: AtomicU64,
}

/// Single-slot, last-write-wins holder of the most recent [`ControllerState`].
#[derive(Debug, Clone, Default)]
pub struct StateCell {
    slot: Arc<Slot>,
}

impl StateCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the published state. Holds the lock only for a pointer swap.
    pub fn publish(&self, state: ControllerState) {
        let next = Arc::new(state);
        *self
            .slot
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner) = next;
        self.slot.generation.fetch_add(1, Ordering::Release);
    }

    pub fn latest(&self) -> Arc<ControllerState> {
        self.slot
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of publishes so far.
    pub fn generation(&self) -> u64 {
        self.slot.generation.load(Ordering::Acquire)
    }

    pub fn watch(&self, refresh: Duration) -> StateWatcher {
        StateWatcher {
            cell: self.clone(),
            refresh,
            seen: None,
            next_frame: Instant::now(),
        }
    }
}

/// Reads a [`StateCell`] at a bounded rate, independent of how fast reports
/// arrive.
#[derive(Debug)]
pub struct StateWatcher {
    cell: StateCell,
    refresh: Duration,
    seen: Option<u64>,
    next_frame: Instant,
}

impl StateWatcher {
    /// The latest state if something was published since the last call that
    /// returned `Some`.
    pub fn changed(&mut self) -> Option<Arc<ControllerState>> {
        let generation = self.cell.generation();
        if self.seen == Some(generation) {
            return None;
        }
        self.seen = Some(generation);
        Some(self.cell.latest())
    }

    /// Sleep until the next frame boundary, then behave like [`Self::changed`].
    pub fn next_frame(&mut self) -> Option<Arc<ControllerState>> {
        let now = Instant::now();
        if self.next_frame > now {
            std::thread::sleep(self.next_frame - now);
        }
        self.next_frame = self
            .next_frame
            .checked_add(self.refresh)
            .unwrap_or_else(Instant::now)
            .max(Instant::now());
        self.changed()
    }
}
