//! # Fretboard Module
//!
//! This module describes the instrument: its tuning (open-string pitches and
//! string names) and the playable positions on its neck. It also provides the
//! frequency-to-position mapping used at the front of the detection pipeline.
//!
//! ## Features
//! - Standard six-string guitar tuning (E2 A2 D3 G3 B3 E4)
//! - Arbitrary N-string tunings with validation
//! - Equal temperament fret frequencies
//! - Deterministic frequency to (string, fret) candidate lookup

use once_cell::sync::Lazy;

use crate::config::ConfigError;

/// Open-string frequencies of a standard-tuned guitar, low to high.
pub const STANDARD_FREQUENCIES: [f32; 6] = [82.41, 110.00, 146.83, 196.00, 246.94, 329.63];

/// Single-symbol string names matching `STANDARD_FREQUENCIES`.
pub const STANDARD_NAMES: [&str; 6] = ["E", "A", "D", "G", "B", "e"];

/// Highest fret a configuration may ask the mapper to scan.
pub const MAX_SUPPORTED_FRET: u32 = 36;

/// Statically built standard tuning.
///
/// Built once on first use; the values are known to be valid so
/// construction goes through the unchecked path.
pub static STANDARD_TUNING: Lazy<Tuning> = Lazy::new(|| Tuning {
    strings: STANDARD_FREQUENCIES
        .iter()
        .zip(STANDARD_NAMES.iter())
        .map(|(&frequency, &name)| OpenString {
            name: name.to_string(),
            frequency,
        })
        .collect(),
});

/// One string of the instrument at fret 0.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenString {
    /// Symbol used in the tab interchange file (e.g. "E", "e").
    pub name: String,
    /// Open pitch in Hz
    pub frequency: f32,
}

/// Ordered set of open strings, lowest pitch first.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuning {
    strings: Vec<OpenString>,
}

impl Tuning {
    /// Builds a tuning from open frequencies and their names.
    ///
    /// # Errors
    /// * `ConfigError::EmptyTuning` - no strings given
    /// * `ConfigError::StringNameCount` - names and frequencies differ in length
    /// * `ConfigError::NonPositiveFrequency` - an open pitch is zero, negative or not finite
    /// * `ConfigError::TuningNotIncreasing` - open pitches are not strictly increasing
    /// * `ConfigError::DuplicateStringName` - two strings share a name
    pub fn new(frequencies: &[f32], names: &[String]) -> Result<Self, ConfigError> {
        if frequencies.is_empty() {
            return Err(ConfigError::EmptyTuning);
        }
        if frequencies.len() != names.len() {
            return Err(ConfigError::StringNameCount {
                strings: frequencies.len(),
                names: names.len(),
            });
        }
        for (index, &frequency) in frequencies.iter().enumerate() {
            if !frequency.is_finite() || frequency <= 0.0 {
                return Err(ConfigError::NonPositiveFrequency { index, frequency });
            }
            if index > 0 && frequency <= frequencies[index - 1] {
                return Err(ConfigError::TuningNotIncreasing { index });
            }
        }
        for (index, name) in names.iter().enumerate() {
            if names[..index].contains(name) {
                return Err(ConfigError::DuplicateStringName(name.clone()));
            }
        }

        Ok(Self {
            strings: frequencies
                .iter()
                .zip(names)
                .map(|(&frequency, name)| OpenString {
                    name: name.clone(),
                    frequency,
                })
                .collect(),
        })
    }

    /// Standard EADGBe guitar tuning.
    pub fn standard() -> Self {
        STANDARD_TUNING.clone()
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn strings(&self) -> &[OpenString] {
        &self.strings
    }

    /// Open frequencies, low to high.
    pub fn frequencies(&self) -> impl Iterator<Item = f32> + '_ {
        self.strings.iter().map(|s| s.frequency)
    }

    /// Name of a string by index, if it exists.
    pub fn string_name(&self, string_index: usize) -> Option<&str> {
        self.strings.get(string_index).map(|s| s.name.as_str())
    }

    /// Looks a string index up by its name. Names are case sensitive ("E" vs "e").
    pub fn string_index(&self, name: &str) -> Option<usize> {
        self.strings.iter().position(|s| s.name == name)
    }
}

impl Default for Tuning {
    fn default() -> Self {
        Self::standard()
    }
}

/// One playable location on the neck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    /// 0 is the lowest-pitched string
    pub string_index: usize,
    pub fret: u32,
}

impl Position {
    pub fn new(string_index: usize, fret: u32) -> Self {
        Self { string_index, fret }
    }

    /// Absolute difference in string index.
    pub fn string_distance(&self, other: &Position) -> usize {
        self.string_index.abs_diff(other.string_index)
    }

    /// Euclidean distance on the (string, fret) grid.
    pub fn distance(&self, other: &Position) -> f32 {
        let strings = self.string_distance(other) as f32;
        let frets = self.fret.abs_diff(other.fret) as f32;
        (strings * strings + frets * frets).sqrt()
    }
}

/// Frequency of a fret on a string with the given open pitch.
///
/// Equal temperament: each fret raises the pitch by one semitone (2^(1/12)).
pub fn fret_frequency(open_frequency: f32, fret: u32) -> f32 {
    open_frequency * 2.0_f32.powf(fret as f32 / 12.0)
}

/// True when `frequency` carries a pitch worth mapping.
///
/// NaN, infinities and anything at or below `silence_floor_hz` are silence.
pub fn is_pitched(frequency: f32, silence_floor_hz: f32) -> bool {
    frequency.is_finite() && frequency > silence_floor_hz
}

/// Maps a detected frequency to every position that produces it.
///
/// For each string the frets `0..=max_fret` are scanned upward and the first
/// fret within `tolerance_hz` is taken; later frets on that string are not
/// considered. Pitch rises with every fret, so the scan on a string stops as
/// soon as a fret sounds at or above `frequency + tolerance_hz`. Candidates come back ordered by string index, which is the
/// order later tie-breaks rely on.
///
/// # Arguments
/// * `frequency` - Detected fundamental in Hz
/// * `tuning` - Open strings of the instrument
/// * `tolerance_hz` - Maximum absolute deviation (exclusive)
/// * `max_fret` - Highest fret to consider (inclusive)
/// * `silence_floor_hz` - Frequencies at or below this are treated as "no pitch"
///
/// # Returns
/// * Candidate positions; empty for silence or an unrecognized frequency
pub fn map_frequency_to_positions(
    frequency: f32,
    tuning: &Tuning,
    tolerance_hz: f32,
    max_fret: u32,
    silence_floor_hz: f32,
) -> Vec<Position> {
    if !is_pitched(frequency, silence_floor_hz) {
        return Vec::new();
    }
    let upper = frequency + tolerance_hz;

    tuning
        .frequencies()
        .enumerate()
        .filter_map(|(string_index, open)| {
            (0..=max_fret)
                .map(|fret| (fret, fret_frequency(open, fret)))
                .take_while(|&(_, pitch)| pitch < upper)
                .find(|&(_, pitch)| (pitch - frequency).abs() < tolerance_hz)
                .map(|(fret, _)| Position::new(string_index, fret))
        })
        .collect()
}
