//! Whiteboard slot pool and event source interfaces
//!
//! The whiteboard is the double-buffered event store that isolates
//! concurrently processed events from each other: every in-flight event owns
//! exactly one slot from a fixed-size pool, and the free-slot count is what
//! bounds cross-event concurrency in the
//! [`SchedulingDriver`](crate::driver::SchedulingDriver).
//!
//! Slot lifecycle per event:
//!
//! ```text
//! allocate_slot(event) ──► select_slot ──► ... event executes ...
//!        ▲                                        │
//!        │                 clear_slot ◄───────────┘
//!        └──────────────── free_slot
//! ```
//!
//! [`InMemoryWhiteboard`] is the built-in pool; framework event stores plug
//! in behind the [`Whiteboard`] trait. [`EventSource`] abstracts where event
//! root addresses come from.

use parking_lot::Mutex;
use std::ops::Range;

/// Root address of one event as handed out by an [`EventSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventAddress {
    /// Monotonic event id
    pub event_id: u64,
}

/// Supplies events to the scheduling driver. Exhaustion (`None`) is a normal
/// termination signal, not an error.
pub trait EventSource: Send {
    /// Next event root address, or `None` when the source is exhausted.
    fn next_event(&mut self) -> Option<EventAddress>;
}

/// Event source yielding a fixed range of sequential event ids.
#[derive(Debug)]
pub struct SequentialEventSource {
    range: Range<u64>,
}

impl SequentialEventSource {
    /// A source producing event ids `0..count`.
    pub fn new(count: u64) -> Self {
        Self { range: 0..count }
    }
}

impl EventSource for SequentialEventSource {
    fn next_event(&mut self) -> Option<EventAddress> {
        self.range.next().map(|event_id| EventAddress { event_id })
    }
}

/// Fixed-size pool of per-event data slots.
///
/// The driver is the only caller; implementations must be thread-safe since
/// `clear_slot`/`free_slot` run on event-task threads while `allocate_slot`
/// runs on the submission loop.
pub trait Whiteboard: Send + Sync {
    /// Claim a free slot for an event. Returns `None` when the pool is full.
    fn allocate_slot(&self, event_id: u64) -> Option<usize>;

    /// Point the store at a slot before the event starts executing.
    fn select_slot(&self, slot: usize);

    /// Drop all event data held in a slot.
    fn clear_slot(&self, slot: usize);

    /// Return a cleared slot to the free pool.
    fn free_slot(&self, slot: usize);

    /// Number of currently free slots.
    fn free_slot_count(&self) -> usize;

    /// Total slot count of the pool.
    fn capacity(&self) -> usize;
}

#[derive(Debug, Clone, Copy, Default)]
struct SlotState {
    in_use: bool,
    event_id: Option<u64>,
}

/// In-memory [`Whiteboard`] implementation.
#[derive(Debug)]
pub struct InMemoryWhiteboard {
    slots: Mutex<Vec<SlotState>>,
}

impl InMemoryWhiteboard {
    /// Create a pool with `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(vec![SlotState::default(); capacity]),
        }
    }

    /// Event currently occupying a slot, if any. Diagnostic accessor.
    pub fn occupant(&self, slot: usize) -> Option<u64> {
        self.slots.lock()[slot].event_id
    }
}

impl Whiteboard for InMemoryWhiteboard {
    fn allocate_slot(&self, event_id: u64) -> Option<usize> {
        let mut slots = self.slots.lock();
        let slot = slots.iter().position(|s| !s.in_use)?;
        slots[slot] = SlotState {
            in_use: true,
            event_id: Some(event_id),
        };
        Some(slot)
    }

    fn select_slot(&self, slot: usize) {
        let slots = self.slots.lock();
        debug_assert!(slot < slots.len());
        tracing::trace!(slot, event = ?slots[slot].event_id, "slot selected");
    }

    fn clear_slot(&self, slot: usize) {
        self.slots.lock()[slot].event_id = None;
    }

    fn free_slot(&self, slot: usize) {
        self.slots.lock()[slot].in_use = false;
    }

    fn free_slot_count(&self) -> usize {
        self.slots.lock().iter().filter(|s| !s.in_use).count()
    }

    fn capacity(&self) -> usize {
        self.slots.lock().len()
    }
}
