//! Buffered simulation events.
//!
//! Events are emitted while a frame runs and collected in an [`EventLog`].
//! The caller drains the log after each frame; presentation layers use the
//! records for transient notifications and score popups.
//!
//! The log is a bounded ring: once `capacity` records are buffered, each new
//! record evicts the oldest one. Event kinds can be suppressed via
//! [`EventLog::suppress`], which prevents any recording for that kind.
//! Suppressed and evicted events are still counted.

use std::collections::VecDeque;

use crate::id::{GridPos, Value};
use crate::structure::{DropReason, Operation, StructureError};
use crate::upgrade::{UpgradeError, UpgradeKind};

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// Something observable that happened during a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // -- Production --
    TokenProduced {
        pos: GridPos,
        value: Value,
    },

    // -- Consumption --
    WellScored {
        pos: GridPos,
        value: Value,
        award: i64,
    },
    TokenDiscarded {
        pos: GridPos,
        value: Value,
        required: Value,
    },

    // -- Modules --
    OperationDropped {
        pos: GridPos,
        operation: Operation,
        lhs: Value,
        rhs: Value,
        reason: DropReason,
    },
    SplitterDropped {
        pos: GridPos,
        value: Value,
    },

    // -- Upgrades --
    UpgradeApplied {
        kind: UpgradeKind,
        uses_used: u32,
        cost: i64,
    },
    ActionRetried {
        kind: UpgradeKind,
        tries: u32,
        reason: UpgradeError,
    },
    ActionDropped {
        kind: UpgradeKind,
        tries: u32,
    },

    // -- Objectives --
    WellUnlocked {
        pos: GridPos,
        consuming_number: Value,
    },

    // -- Faults --
    StructureFaulted {
        pos: GridPos,
        error: StructureError,
    },
}

/// Discriminant tag for event types, used for suppression and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TokenProduced,
    WellScored,
    TokenDiscarded,
    OperationDropped,
    SplitterDropped,
    UpgradeApplied,
    ActionRetried,
    ActionDropped,
    WellUnlocked,
    StructureFaulted,
}

const EVENT_KIND_COUNT: usize = 10;

impl Event {
    /// Get the discriminant kind for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::TokenProduced { .. } => EventKind::TokenProduced,
            Event::WellScored { .. } => EventKind::WellScored,
            Event::TokenDiscarded { .. } => EventKind::TokenDiscarded,
            Event::OperationDropped { .. } => EventKind::OperationDropped,
            Event::SplitterDropped { .. } => EventKind::SplitterDropped,
            Event::UpgradeApplied { .. } => EventKind::UpgradeApplied,
            Event::ActionRetried { .. } => EventKind::ActionRetried,
            Event::ActionDropped { .. } => EventKind::ActionDropped,
            Event::WellUnlocked { .. } => EventKind::WellUnlocked,
            Event::StructureFaulted { .. } => EventKind::StructureFaulted,
        }
    }
}

impl EventKind {
    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// An event stamped with the frame it was emitted in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub frame: u64,
    pub event: Event,
}

/// Records kept when no capacity is configured.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Bounded buffer of events for the current and past undrained frames.
#[derive(Debug)]
pub struct EventLog {
    records: VecDeque<EventRecord>,
    capacity: usize,
    frame: u64,
    suppressed: [bool; EVENT_KIND_COUNT],
    emitted: [u64; EVENT_KIND_COUNT],
    evicted: u64,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log holding at most `capacity` records. Zero is clamped to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity.min(DEFAULT_EVENT_CAPACITY)),
            capacity,
            frame: 0,
            suppressed: [false; EVENT_KIND_COUNT],
            emitted: [0; EVENT_KIND_COUNT],
            evicted: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Set the frame number stamped onto subsequent events.
    pub fn begin_frame(&mut self, frame: u64) {
        self.frame = frame;
    }

    pub fn emit(&mut self, event: Event) {
        let idx = event.kind().index();
        self.emitted[idx] += 1;
        if self.suppressed[idx] {
            return;
        }
        if self.records.len() == self.capacity {
            self.records.pop_front();
            self.evicted += 1;
        }
        self.records.push_back(EventRecord {
            frame: self.frame,
            event,
        });
    }

    /// Stop recording events of the given kind.
    pub fn suppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = true;
    }

    pub fn is_suppressed(&self, kind: EventKind) -> bool {
        self.suppressed[kind.index()]
    }

    /// Remove and return every buffered record, oldest first.
    pub fn drain(&mut self) -> Vec<EventRecord> {
        self.records.drain(..).collect()
    }

    /// Records pushed out by newer ones before they were drained.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.records.iter().map(|r| &r.event)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total events of this kind ever emitted, including suppressed ones.
    pub fn total_emitted(&self, kind: EventKind) -> u64 {
        self.emitted[kind.index()]
    }

    /// Count of buffered records of the given kind.
    pub fn count(&self, kind: EventKind) -> usize {
        self.records.iter().filter(|r| r.event.kind() == kind).count()
    }
}
