//! # Note Sequencing Module
//!
//! Owns the recent-note history consumed by position selection and the
//! append-only log of accepted notes.
//!
//! The log can be read from other threads through `EventLogReader`. The
//! engine only ever appends, so a reader that remembers how far it has read
//! never sees an event change or disappear under it.

use std::sync::{Arc, PoisonError, RwLock};

use crate::NoteEvent;
use crate::fretboard::Position;

/// Bounded FIFO of the most recently accepted positions, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryWindow {
    capacity: usize,
    positions: Vec<Position>,
}

impl HistoryWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            positions: Vec::with_capacity(capacity + 1),
        }
    }

    /// Appends a position, evicting the oldest one when full.
    pub fn push(&mut self, position: Position) {
        self.positions.push(position);
        if self.positions.len() > self.capacity {
            let excess = self.positions.len() - self.capacity;
            self.positions.drain(..excess);
        }
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<&Position> {
        self.positions.last()
    }

    /// Oldest first.
    pub fn as_slice(&self) -> &[Position] {
        &self.positions
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> + '_ {
        self.positions.iter()
    }

    pub fn to_vec(&self) -> Vec<Position> {
        self.positions.clone()
    }
}

/// Append-only event log shared with readers.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Arc<RwLock<Vec<NoteEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn append(&self, event: NoteEvent) {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub fn len(&self) -> usize {
        self.events.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every event so far.
    pub fn snapshot(&self) -> Vec<NoteEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// A reader positioned at the start of the log.
    pub fn reader(&self) -> EventLogReader {
        EventLogReader {
            events: Arc::clone(&self.events),
            cursor: 0,
        }
    }
}

/// Read-only cursor over an `EventLog`.
#[derive(Debug, Clone)]
pub struct EventLogReader {
    events: Arc<RwLock<Vec<NoteEvent>>>,
    cursor: usize,
}

impl EventLogReader {
    /// Events appended since the previous call.
    pub fn read_new(&mut self) -> Vec<NoteEvent> {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        let fresh = events[self.cursor..].to_vec();
        self.cursor = events.len();
        fresh
    }

    /// Every event up to the length recorded at the time of the call.
    pub fn snapshot(&self) -> Vec<NoteEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn position(&self) -> usize {
        self.cursor
    }
}

/// Records accepted notes into the history window and the event log.
#[derive(Debug)]
pub struct NoteSequencer {
    history: HistoryWindow,
    log: EventLog,
}

impl NoteSequencer {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            history: HistoryWindow::new(history_capacity),
            log: EventLog::new(),
        }
    }

    /// Records an accepted note.
    ///
    /// With `reset_history` set the window is emptied first, so the new note
    /// becomes the only context for the next selection.
    pub fn record(&mut self, event: NoteEvent, reset_history: bool) {
        if reset_history {
            log::debug!(
                target: "engine",
                "pause detected, dropping {} positions of context",
                self.history.len()
            );
            self.history.clear();
        }
        self.history.push(event.position);
        self.log.append(event);
    }

    pub fn history(&self) -> &HistoryWindow {
        &self.history
    }

    /// History as a slice, oldest first.
    pub fn history_slice(&self) -> &[Position] {
        self.history.as_slice()
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// Starts a fresh session. Existing readers keep the old log.
    pub fn reset(&mut self) {
        self.history.clear();
        self.log = EventLog::new();
    }
}
