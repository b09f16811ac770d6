//! # Configuration Module
//!
//! Engine parameters with their defaults, validation and TOML overrides.
//! Defaults come from the embedded `config.toml`; a user file only needs the
//! keys it changes.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::fretboard::{MAX_SUPPORTED_FRET, Tuning};

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

/// Every way a configuration can fail to produce an engine.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("tuning must contain at least one string")]
    EmptyTuning,
    #[error("tuning has {strings} strings but {names} string names")]
    StringNameCount { strings: usize, names: usize },
    #[error("open frequency of string {index} must be positive, got {frequency}")]
    NonPositiveFrequency { index: usize, frequency: f32 },
    #[error("open frequencies must be strictly increasing (string {index})")]
    TuningNotIncreasing { index: usize },
    #[error("duplicate string name {0:?}")]
    DuplicateStringName(String),
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },
    #[error("{name} must not be negative, got {value}")]
    Negative { name: &'static str, value: f64 },
    #[error("{name} must be a finite number")]
    NotFinite { name: &'static str },
    #[error("max_fret {max_fret} is above the supported limit of {limit}")]
    MaxFretTooHigh { max_fret: u32, limit: u32 },
    #[error("history capacity must be at least 1")]
    ZeroHistoryCapacity,
    #[error("string jump threshold must be at least 1")]
    ZeroStringJumpThreshold,
    #[error("could not read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Complete, validated parameter set for a `TabEngine`.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub tuning: Tuning,
    /// Maximum deviation (exclusive) between a fret's pitch and the detected one.
    pub tolerance_hz: f32,
    pub max_fret: u32,
    /// Frequencies at or below this count as silence.
    pub silence_floor_hz: f32,
    /// Frames must have a confidence strictly above this to be considered.
    pub confidence_floor: f32,
    /// Minimum time before an identical position may fire again.
    pub repeat_threshold_s: f64,
    /// Maximum peak difference for an identical position to re-fire.
    pub repeat_peak_epsilon: f32,
    /// Silence longer than this discards the recent-note context.
    pub pause_threshold_s: f64,
    pub max_movement_cost: f32,
    pub history_capacity: usize,
    /// Selections this many strings (or more) away from the last note are vetoed.
    pub string_jump_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tuning: Tuning::standard(),
            tolerance_hz: 3.0,
            max_fret: 20,
            silence_floor_hz: 0.0,
            confidence_floor: -0.7,
            repeat_threshold_s: 0.7,
            repeat_peak_epsilon: 0.01,
            pause_threshold_s: 3.0,
            max_movement_cost: 8.0,
            history_capacity: 3,
            string_jump_threshold: 3,
        }
    }
}

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    instrument: InstrumentSection,
    #[serde(default)]
    detection: DetectionSection,
    #[serde(default)]
    debounce: DebounceSection,
    #[serde(default)]
    selection: SelectionSection,
}

#[derive(Deserialize, Default)]
struct InstrumentSection {
    tuning: Option<Vec<f32>>,
    string_names: Option<Vec<String>>,
    max_fret: Option<u32>,
}

#[derive(Deserialize, Default)]
struct DetectionSection {
    tolerance_hz: Option<f32>,
    silence_floor_hz: Option<f32>,
    confidence_floor: Option<f32>,
}

#[derive(Deserialize, Default)]
struct DebounceSection {
    repeat_threshold_s: Option<f64>,
    repeat_peak_epsilon: Option<f32>,
}

#[derive(Deserialize, Default)]
struct SelectionSection {
    pause_threshold_s: Option<f64>,
    max_movement_cost: Option<f32>,
    history_capacity: Option<usize>,
    string_jump_threshold: Option<usize>,
}

impl EngineConfig {
    /// Parses the embedded defaults, then applies `contents` on top.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let base: ConfigFile = toml::from_str(DEFAULT_CONFIG)?;
        let user: ConfigFile = toml::from_str(contents)?;
        Self::from_file(merge(base, user))
    }

    /// Loads overrides from a TOML file on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&contents)?;
        log::info!(target: "config", "loaded engine config from {}", path.display());
        Ok(config)
    }

    fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let fallback = Self::default();
        let (frequencies, names) = match (file.instrument.tuning, file.instrument.string_names) {
            (Some(frequencies), Some(names)) => (frequencies, names),
            (Some(frequencies), None) => {
                let names = fallback_names(frequencies.len());
                (frequencies, names)
            }
            (None, Some(names)) => (fallback.tuning.frequencies().collect(), names),
            (None, None) => (
                fallback.tuning.frequencies().collect(),
                fallback.tuning.strings().iter().map(|s| s.name.clone()).collect(),
            ),
        };

        let config = Self {
            tuning: Tuning::new(&frequencies, &names)?,
            tolerance_hz: file.detection.tolerance_hz.unwrap_or(fallback.tolerance_hz),
            max_fret: file.instrument.max_fret.unwrap_or(fallback.max_fret),
            silence_floor_hz: file
                .detection
                .silence_floor_hz
                .unwrap_or(fallback.silence_floor_hz),
            confidence_floor: file
                .detection
                .confidence_floor
                .unwrap_or(fallback.confidence_floor),
            repeat_threshold_s: file
                .debounce
                .repeat_threshold_s
                .unwrap_or(fallback.repeat_threshold_s),
            repeat_peak_epsilon: file
                .debounce
                .repeat_peak_epsilon
                .unwrap_or(fallback.repeat_peak_epsilon),
            pause_threshold_s: file
                .selection
                .pause_threshold_s
                .unwrap_or(fallback.pause_threshold_s),
            max_movement_cost: file
                .selection
                .max_movement_cost
                .unwrap_or(fallback.max_movement_cost),
            history_capacity: file
                .selection
                .history_capacity
                .unwrap_or(fallback.history_capacity),
            string_jump_threshold: file
                .selection
                .string_jump_threshold
                .unwrap_or(fallback.string_jump_threshold),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks every numeric parameter. The tuning validates itself on construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tuning.is_empty() {
            return Err(ConfigError::EmptyTuning);
        }
        positive("tolerance_hz", self.tolerance_hz as f64)?;
        if self.max_fret > MAX_SUPPORTED_FRET {
            return Err(ConfigError::MaxFretTooHigh {
                max_fret: self.max_fret,
                limit: MAX_SUPPORTED_FRET,
            });
        }
        positive("max_movement_cost", self.max_movement_cost as f64)?;
        non_negative("silence_floor_hz", self.silence_floor_hz as f64)?;
        non_negative("repeat_threshold_s", self.repeat_threshold_s)?;
        non_negative("repeat_peak_epsilon", self.repeat_peak_epsilon as f64)?;
        non_negative("pause_threshold_s", self.pause_threshold_s)?;
        if !self.confidence_floor.is_finite() {
            return Err(ConfigError::NotFinite {
                name: "confidence_floor",
            });
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::ZeroHistoryCapacity);
        }
        if self.string_jump_threshold == 0 {
            return Err(ConfigError::ZeroStringJumpThreshold);
        }
        Ok(())
    }

    pub fn with_tuning(mut self, tuning: Tuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn with_tolerance_hz(mut self, tolerance_hz: f32) -> Self {
        self.tolerance_hz = tolerance_hz;
        self
    }

    pub fn with_max_fret(mut self, max_fret: u32) -> Self {
        self.max_fret = max_fret;
        self
    }

    pub fn with_confidence_floor(mut self, confidence_floor: f32) -> Self {
        self.confidence_floor = confidence_floor;
        self
    }

    pub fn with_repeat_threshold(mut self, seconds: f64) -> Self {
        self.repeat_threshold_s = seconds;
        self
    }

    pub fn with_pause_threshold(mut self, seconds: f64) -> Self {
        self.pause_threshold_s = seconds;
        self
    }

    pub fn with_max_movement_cost(mut self, cost: f32) -> Self {
        self.max_movement_cost = cost;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn with_string_jump_threshold(mut self, strings: usize) -> Self {
        self.string_jump_threshold = strings;
        self
    }
}

fn merge(mut base: ConfigFile, user: ConfigFile) -> ConfigFile {
    // A user tuning without names must not inherit six default names.
    if user.instrument.tuning.is_some() {
        base.instrument.string_names = None;
    }
    base.instrument.tuning = user.instrument.tuning.or(base.instrument.tuning);
    base.instrument.string_names = user.instrument.string_names.or(base.instrument.string_names);
    base.instrument.max_fret = user.instrument.max_fret.or(base.instrument.max_fret);

    base.detection.tolerance_hz = user.detection.tolerance_hz.or(base.detection.tolerance_hz);
    base.detection.silence_floor_hz = user
        .detection
        .silence_floor_hz
        .or(base.detection.silence_floor_hz);
    base.detection.confidence_floor = user
        .detection
        .confidence_floor
        .or(base.detection.confidence_floor);

    base.debounce.repeat_threshold_s = user
        .debounce
        .repeat_threshold_s
        .or(base.debounce.repeat_threshold_s);
    base.debounce.repeat_peak_epsilon = user
        .debounce
        .repeat_peak_epsilon
        .or(base.debounce.repeat_peak_epsilon);

    base.selection.pause_threshold_s = user
        .selection
        .pause_threshold_s
        .or(base.selection.pause_threshold_s);
    base.selection.max_movement_cost = user
        .selection
        .max_movement_cost
        .or(base.selection.max_movement_cost);
    base.selection.history_capacity = user
        .selection
        .history_capacity
        .or(base.selection.history_capacity);
    base.selection.string_jump_threshold = user
        .selection
        .string_jump_threshold
        .or(base.selection.string_jump_threshold);
    base
}

/// Names for a user tuning given without names: the standard symbols when the
/// string count matches, otherwise "1".."N".
fn fallback_names(count: usize) -> Vec<String> {
    let standard = Tuning::standard();
    if count == standard.len() {
        standard.strings().iter().map(|s| s.name.clone()).collect()
    } else {
        (1..=count).map(|i| i.to_string()).collect()
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { name, value })
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { name, value })
    }
}
