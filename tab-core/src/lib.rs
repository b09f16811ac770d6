// tab-core/src/lib.rs

//! The core logic for live guitar tablature transcription.
//! This crate turns a stream of detected pitches into discrete
//! (string, fret) note events. It is completely headless: pitch
//! estimation and rendering live outside of it.

pub mod capture;
pub mod config;
pub mod debounce;
pub mod engine;
pub mod fretboard;
pub mod selector;
pub mod sequencer;
pub mod tab_file;

use serde::{Deserialize, Serialize};

pub use config::{ConfigError, EngineConfig};
pub use engine::{FrameOutcome, TabEngine};
pub use fretboard::{Position, Tuning};

/// One frame as reported by the pitch oracle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameInput {
    /// Detected fundamental in Hz, 0.0 when nothing was detected.
    pub frequency: f32,
    /// Oracle-defined reliability score; compared against the configured floor only.
    pub confidence: f32,
    /// Largest absolute sample value in the frame.
    pub peak_amplitude: f32,
    /// Monotonic time in seconds.
    pub timestamp: f64,
}

/// An accepted note. Never modified once emitted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    /// Seconds since the start of the session.
    pub start_time: f64,
    pub position: Position,
}
