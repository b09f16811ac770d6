//! # Detection Engine Module
//!
//! Runs one frame at a time through the whole pipeline:
//! confidence gate, fret mapping, position selection, debouncing and
//! sequencing. All mutable state lives in `EngineState`, owned by the engine.
//!
//! Per-frame work is synchronous and never blocks, so it can run on the
//! thread that receives audio frames.

use crate::config::{ConfigError, EngineConfig};
use crate::debounce::{DebounceState, NoteDebouncer, Trigger};
use crate::fretboard::{Position, is_pitched, map_frequency_to_positions};
use crate::selector::{SelectionPolicy, select_position};
use crate::sequencer::{EventLog, EventLogReader, HistoryWindow, NoteSequencer};
use crate::{FrameInput, NoteEvent};

/// What happened to a single frame. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// Silence or confidence at or below the floor.
    NoSignal,
    /// A pitch that no position on the neck produces.
    NoFretMatch,
    /// Candidates existed but all failed the cost or string-jump checks.
    Rejected,
    /// The selected position is the note already sounding.
    Sustained,
    Accepted(NoteEvent),
}

impl FrameOutcome {
    pub fn event(&self) -> Option<&NoteEvent> {
        match self {
            FrameOutcome::Accepted(event) => Some(event),
            _ => None,
        }
    }
}

/// Every piece of mutable session state.
#[derive(Debug)]
pub struct EngineState {
    pub debouncer: NoteDebouncer,
    pub sequencer: NoteSequencer,
    /// Timestamp that relative start times are measured from.
    pub origin: Option<f64>,
}

impl EngineState {
    fn new(config: &EngineConfig) -> Self {
        Self {
            debouncer: NoteDebouncer::new(config.repeat_threshold_s, config.repeat_peak_epsilon),
            sequencer: NoteSequencer::new(config.history_capacity),
            origin: None,
        }
    }
}

/// Note detection and fret assignment for one instrument.
#[derive(Debug)]
pub struct TabEngine {
    config: EngineConfig,
    policy: SelectionPolicy,
    state: EngineState,
}

impl TabEngine {
    /// Builds an engine after validating `config`.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let policy = SelectionPolicy {
            pause_threshold_s: config.pause_threshold_s,
            max_movement_cost: config.max_movement_cost,
            string_jump_threshold: config.string_jump_threshold,
        };
        let state = EngineState::new(&config);
        Ok(Self {
            config,
            policy,
            state,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Clears all session state and measures start times from `origin`.
    pub fn start_session(&mut self, origin: f64) {
        self.state.debouncer.reset();
        self.state.sequencer.reset();
        self.state.origin = Some(origin);
        log::info!(target: "engine", "session started at t={:.3}", origin);
    }

    /// Processes one frame.
    ///
    /// If no session was started explicitly, the first frame's timestamp
    /// becomes the origin.
    pub fn process_frame(&mut self, frame: &FrameInput) -> FrameOutcome {
        let origin = *self.state.origin.get_or_insert(frame.timestamp);

        if !(frame.confidence > self.config.confidence_floor)
            || !is_pitched(frame.frequency, self.config.silence_floor_hz)
        {
            return FrameOutcome::NoSignal;
        }

        let candidates = map_frequency_to_positions(
            frame.frequency,
            &self.config.tuning,
            self.config.tolerance_hz,
            self.config.max_fret,
            self.config.silence_floor_hz,
        );
        if candidates.is_empty() {
            log::trace!(target: "engine", "{:.2} Hz matches no fret", frame.frequency);
            return FrameOutcome::NoFretMatch;
        }

        let selection = select_position(
            &candidates,
            self.state.sequencer.history_slice(),
            frame.timestamp,
            self.state.debouncer.state().last_accept_time,
            &self.policy,
        );
        let Some(position) = selection.chosen else {
            log::trace!(target: "engine", "no playable position among {:?}", candidates);
            return FrameOutcome::Rejected;
        };

        let Some(trigger) =
            self.state
                .debouncer
                .accept(position, frame.timestamp, frame.peak_amplitude)
        else {
            return FrameOutcome::Sustained;
        };

        let event = NoteEvent {
            start_time: frame.timestamp - origin,
            position,
        };
        self.state.sequencer.record(event, selection.reset_history);
        log::debug!(
            target: "engine",
            "pitch {:.2} Hz -> {} fret {} at {:.2}s ({})",
            frame.frequency,
            self.config
                .tuning
                .string_name(position.string_index)
                .unwrap_or("?"),
            position.fret,
            event.start_time,
            match trigger {
                Trigger::FirstNote => "first",
                Trigger::NewPosition => "new position",
                Trigger::Repeat => "repeat",
            }
        );
        FrameOutcome::Accepted(event)
    }

    /// Runs a batch of frames and returns the events they produced.
    pub fn process_frames<'a>(
        &mut self,
        frames: impl IntoIterator<Item = &'a FrameInput>,
    ) -> Vec<NoteEvent> {
        frames
            .into_iter()
            .filter_map(|frame| self.process_frame(frame).event().copied())
            .collect()
    }

    pub fn history(&self) -> &HistoryWindow {
        self.state.sequencer.history()
    }

    pub fn debounce_state(&self) -> &DebounceState {
        self.state.debouncer.state()
    }

    pub fn active_position(&self) -> Option<Position> {
        self.state.debouncer.state().active_position
    }

    pub fn log(&self) -> &EventLog {
        self.state.sequencer.log()
    }

    /// Copy of every event accepted this session.
    pub fn events(&self) -> Vec<NoteEvent> {
        self.state.sequencer.log().snapshot()
    }

    pub fn log_reader(&self) -> EventLogReader {
        self.state.sequencer.log().reader()
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }
}
