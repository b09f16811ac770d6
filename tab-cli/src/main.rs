//! # tab-cli - Offline front end for the tablature engine
//!
//! Replays a recorded stream of pitch-oracle frames through the engine and
//! writes the tab interchange file, or looks up which note is sounding at a
//! given time in an existing tab file.
//!
//! ## Usage
//! ```text
//! tab-cli replay <frames.jsonl> [--out output_tab.txt] [--config engine.toml] [--json] [-v]
//! tab-cli cursor <tab file> <seconds> [--config engine.toml] [-v]
//! ```
//!
//! Each line of a frames file is one JSON object:
//! `{"frequency": 82.41, "confidence": -0.5, "peak_amplitude": 0.3, "timestamp": 0.0}`

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tab_core::tab_file::{self, TabFileWriter};
use tab_core::{EngineConfig, FrameInput, FrameOutcome, TabEngine};

const DEFAULT_OUTPUT: &str = "output_tab.txt";

/// Per-outcome frame counts for one replay.
#[derive(Debug, Default, Serialize)]
struct ReplaySummary {
    frames: usize,
    notes: usize,
    no_signal: usize,
    no_fret_match: usize,
    rejected: usize,
    sustained: usize,
}

impl ReplaySummary {
    fn count(&mut self, outcome: &FrameOutcome) {
        self.frames += 1;
        match outcome {
            FrameOutcome::NoSignal => self.no_signal += 1,
            FrameOutcome::NoFretMatch => self.no_fret_match += 1,
            FrameOutcome::Rejected => self.rejected += 1,
            FrameOutcome::Sustained => self.sustained += 1,
            FrameOutcome::Accepted(_) => self.notes += 1,
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
    log::info!("tab-cli starting");
}

/// Value following `flag`, if present.
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// Arguments that are neither flags nor flag values.
fn positionals(args: &[String]) -> Vec<&str> {
    const VALUE_FLAGS: [&str; 2] = ["--out", "--config"];
    let mut result = Vec::new();
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
        } else if VALUE_FLAGS.contains(&arg.as_str()) {
            skip_next = true;
        } else if !arg.starts_with('-') {
            result.push(arg.as_str());
        }
    }
    result
}

fn load_config(args: &[String]) -> Result<EngineConfig> {
    match flag_value(args, "--config") {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading config {path}")),
        None => Ok(EngineConfig::default()),
    }
}

fn replay(frames_path: &Path, out_path: &Path, config: EngineConfig) -> Result<ReplaySummary> {
    let tuning = config.tuning.clone();
    let mut engine = TabEngine::new(config).context("invalid engine configuration")?;
    let mut writer = TabFileWriter::create(out_path, tuning)
        .with_context(|| format!("creating {}", out_path.display()))?;

    let file = File::open(frames_path)
        .with_context(|| format!("opening {}", frames_path.display()))?;
    let mut summary = ReplaySummary::default();

    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("reading {}", frames_path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: FrameInput = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: malformed frame", frames_path.display(), number + 1))?;

        let outcome = engine.process_frame(&frame);
        summary.count(&outcome);
        if let Some(event) = outcome.event() {
            writer
                .append(event)
                .with_context(|| format!("writing {}", out_path.display()))?;
        }
    }

    Ok(summary)
}

fn cursor(tab_path: &Path, elapsed: f64, config: &EngineConfig) -> Result<()> {
    let events = tab_file::read_tab_file(tab_path, &config.tuning, config.max_fret)
        .with_context(|| format!("reading {}", tab_path.display()))?;
    let starts: Vec<f64> = events.iter().map(|e| e.start_time).collect();

    match tab_file::note_index_at(&starts, elapsed) {
        Some(index) => {
            let event = &events[index];
            let name = config
                .tuning
                .string_name(event.position.string_index)
                .unwrap_or("?");
            println!(
                "note {} of {}: {} fret {} (started {:.2}s)",
                index + 1,
                events.len(),
                name,
                event.position.fret,
                event.start_time
            );
        }
        None => println!("no note sounding at {elapsed:.2}s"),
    }
    Ok(())
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    init_logging(verbose);

    let positional = positionals(&args);
    let config = load_config(&args)?;

    match positional.as_slice() {
        ["replay", frames] => {
            let out = PathBuf::from(flag_value(&args, "--out").unwrap_or(DEFAULT_OUTPUT));
            let summary = replay(Path::new(frames), &out, config)?;
            if args.iter().any(|a| a == "--json") {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "{} notes from {} frames written to {}",
                    summary.notes,
                    summary.frames,
                    out.display()
                );
            }
        }
        ["cursor", tab, seconds] => {
            let elapsed: f64 = seconds
                .parse()
                .with_context(|| format!("invalid time {seconds:?}"))?;
            cursor(Path::new(tab), elapsed, &config)?;
        }
        _ => bail!(
            "usage: tab-cli replay <frames.jsonl> [--out FILE] [--config FILE] [--json] [-v]\n       tab-cli cursor <tab file> <seconds> [--config FILE] [-v]"
        ),
    }
    Ok(())
}
