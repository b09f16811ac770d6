//! End-to-end behaviour of the detection engine on scripted frame sequences.

use tab_core::fretboard::{Position, fret_frequency};
use tab_core::tab_file::format_event;
use tab_core::{EngineConfig, FrameInput, FrameOutcome, TabEngine, Tuning};

const LOW_E: f32 = 82.41;

fn frame(t: f64, frequency: f32, peak: f32) -> FrameInput {
    FrameInput {
        frequency,
        confidence: -0.5,
        peak_amplitude: peak,
        timestamp: t,
    }
}

fn silence(t: f64) -> FrameInput {
    FrameInput {
        frequency: 0.0,
        confidence: -0.95,
        peak_amplitude: 0.001,
        timestamp: t,
    }
}

fn engine() -> TabEngine {
    TabEngine::new(EngineConfig::default()).unwrap()
}

#[test]
fn duplicate_frames_collapse_into_one_note() {
    let mut engine = engine();
    let frames = [
        frame(0.0, LOW_E, 0.3),
        frame(0.1, LOW_E, 0.3),
        frame(2.0, fret_frequency(110.0, 2), 0.4),
    ];
    let events = engine.process_frames(&frames);

    let tuning = Tuning::standard();
    let lines: String = events
        .iter()
        .map(|e| format_event(e, &tuning).unwrap())
        .collect();
    assert_eq!(lines, "0.00,E,0\n2.00,A,2\n");
}

#[test]
fn same_input_gives_identical_output() {
    let frames: Vec<FrameInput> = (0..200)
        .map(|i| {
            let t = i as f64 * 0.023;
            let fret = (i / 20) % 5;
            if i % 20 > 15 {
                silence(t)
            } else {
                frame(t, fret_frequency(146.83, fret), 0.2 + (i % 7) as f32 * 0.01)
            }
        })
        .collect();

    let first = engine().process_frames(&frames);
    let second = engine().process_frames(&frames);
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn long_pause_leaves_only_the_new_note_in_history() {
    let mut engine = engine();
    engine.process_frame(&frame(0.0, LOW_E, 0.3));
    engine.process_frame(&frame(0.8, fret_frequency(LOW_E, 3), 0.3));
    assert_eq!(engine.history().len(), 2);

    for i in 1..40 {
        assert_eq!(engine.process_frame(&silence(0.8 + i as f64 * 0.1)), FrameOutcome::NoSignal);
    }
    assert_eq!(engine.history().len(), 2);

    let outcome = engine.process_frame(&frame(5.0, 110.0, 0.3));
    assert!(outcome.event().is_some());
    assert_eq!(engine.history().to_vec(), vec![Position::new(1, 0)]);
}

#[test]
fn repicked_note_with_similar_peak_fires_again() {
    let mut engine = engine();
    engine.process_frame(&frame(0.0, LOW_E, 0.5));
    let outcome = engine.process_frame(&frame(1.0, LOW_E, 0.505));
    assert!(matches!(outcome, FrameOutcome::Accepted(_)));
    assert_eq!(engine.events().len(), 2);
}

#[test]
fn held_note_with_different_peak_does_not_fire() {
    let mut engine = engine();
    engine.process_frame(&frame(0.0, LOW_E, 0.5));
    let outcome = engine.process_frame(&frame(1.0, LOW_E, 0.6));
    assert_eq!(outcome, FrameOutcome::Sustained);
    assert_eq!(engine.events().len(), 1);
}

#[test]
fn cheapest_position_four_strings_away_is_rejected() {
    let mut engine = engine();
    engine.process_frame(&frame(0.0, LOW_E, 0.3));
    // Open B is the cheapest fingering for 246.94 Hz but sits four strings up.
    let outcome = engine.process_frame(&frame(0.5, 246.94, 0.3));
    assert_eq!(outcome, FrameOutcome::Rejected);
    assert_eq!(engine.history().to_vec(), vec![Position::new(0, 0)]);
}

#[test]
fn looser_jump_threshold_accepts_the_same_move() {
    let config = EngineConfig::default().with_string_jump_threshold(5);
    let mut engine = TabEngine::new(config).unwrap();
    engine.process_frame(&frame(0.0, LOW_E, 0.3));
    let outcome = engine.process_frame(&frame(0.5, 246.94, 0.3));
    assert_eq!(outcome.event().map(|e| e.position), Some(Position::new(4, 0)));
}

#[test]
fn log_reader_follows_the_session() {
    let mut engine = engine();
    let mut reader = engine.log_reader();
    engine.process_frame(&frame(0.0, LOW_E, 0.3));
    assert_eq!(reader.read_new().len(), 1);
    engine.process_frame(&frame(0.4, 110.0, 0.3));
    let fresh = reader.read_new();
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].position, Position::new(1, 0));
}
