//! # Note Debouncing Module
//!
//! Decides whether a selected position starts a new note or is the tail of
//! the one already sounding. The detector reports a pitch on every frame
//! while a string rings, so without this gate a single pluck would be
//! written out dozens of times.

use crate::fretboard::Position;

/// Debouncer state for one capture session.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DebounceState {
    pub active_position: Option<Position>,
    pub last_accept_time: Option<f64>,
    pub last_signal_peak: f32,
}

/// Coarse view of `DebounceState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebouncePhase {
    Idle,
    Tracking,
}

/// Why a candidate was accepted as a new note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Nothing was sounding.
    FirstNote,
    /// A different position than the active one.
    NewPosition,
    /// The same position re-picked after the repeat threshold.
    Repeat,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteDebouncer {
    repeat_threshold_s: f64,
    peak_epsilon: f32,
    state: DebounceState,
}

impl NoteDebouncer {
    pub fn new(repeat_threshold_s: f64, peak_epsilon: f32) -> Self {
        Self {
            repeat_threshold_s,
            peak_epsilon,
            state: DebounceState::default(),
        }
    }

    pub fn state(&self) -> &DebounceState {
        &self.state
    }

    pub fn phase(&self) -> DebouncePhase {
        match self.state.active_position {
            Some(_) => DebouncePhase::Tracking,
            None => DebouncePhase::Idle,
        }
    }

    /// Decides whether `candidate` is a new note. Does not change state.
    ///
    /// A repeat of the active position only fires when the repeat threshold
    /// has elapsed and the frame peak is within epsilon of the last recorded
    /// peak. Any larger peak difference reads as the same note still ringing.
    pub fn evaluate(&self, candidate: Position, now: f64, peak: f32) -> Option<Trigger> {
        let Some(active) = self.state.active_position else {
            return Some(Trigger::FirstNote);
        };
        if active != candidate {
            return Some(Trigger::NewPosition);
        }

        let elapsed = self
            .state
            .last_accept_time
            .map_or(f64::INFINITY, |last| now - last);
        let similar_peak = (self.state.last_signal_peak - peak).abs() <= self.peak_epsilon;
        if elapsed > self.repeat_threshold_s && similar_peak {
            Some(Trigger::Repeat)
        } else {
            None
        }
    }

    /// Records an accepted note.
    pub fn commit(&mut self, position: Position, now: f64, peak: f32) {
        self.state = DebounceState {
            active_position: Some(position),
            last_accept_time: Some(now),
            last_signal_peak: peak,
        };
    }

    /// `evaluate`, then `commit` on acceptance.
    pub fn accept(&mut self, candidate: Position, now: f64, peak: f32) -> Option<Trigger> {
        let trigger = self.evaluate(candidate, now, peak)?;
        self.commit(candidate, now, peak);
        Some(trigger)
    }

    pub fn reset(&mut self) {
        self.state = DebounceState::default();
    }
}
