//! # Position Selection Module
//!
//! Picks the most playable position among the candidates for one pitch.
//! Selection runs in two independent steps:
//! 1. Cost ranking: recency-weighted distance to the recent notes plus a
//!    small bias toward low frets, filtered by a cost ceiling.
//! 2. Jump veto: the winner is discarded if it lies too many strings away
//!    from the most recent note.
//!
//! Nothing here mutates state. A pause is reported back through
//! `Selection::reset_history` so the sequencer can act on it.

use crate::fretboard::Position;

/// Per-fret penalty that breaks ties toward the nut.
pub const LOW_FRET_BIAS: f32 = 0.1;

/// Thresholds consumed by `select_position`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionPolicy {
    pub pause_threshold_s: f64,
    pub max_movement_cost: f32,
    pub string_jump_threshold: usize,
}

/// Result of one selection pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    pub chosen: Option<Position>,
    /// The context was stale; history must be cleared before the next note is recorded.
    pub reset_history: bool,
}

/// Recency-weighted movement cost of playing `candidate` after `history`.
///
/// `history` is ordered oldest first. The most recent note weighs 1, the one
/// before it 1/2, then 1/3 and so on.
pub fn movement_cost(candidate: &Position, history: &[Position]) -> f32 {
    let movement: f32 = history
        .iter()
        .rev()
        .enumerate()
        .map(|(rank, previous)| candidate.distance(previous) / (rank + 1) as f32)
        .sum();
    movement + LOW_FRET_BIAS * candidate.fret as f32
}

/// Step 1: the cheapest candidate at or under `ceiling`, if any.
///
/// Candidates are scanned in the order given; on equal cost the earlier one
/// is kept, so the result is deterministic for the mapper's ordering.
pub fn rank_candidates(
    candidates: &[Position],
    history: &[Position],
    ceiling: Option<f32>,
) -> Option<(Position, f32)> {
    let mut best: Option<(Position, f32)> = None;
    for candidate in candidates {
        let cost = movement_cost(candidate, history);
        if ceiling.is_some_and(|max| cost > max) {
            continue;
        }
        match best {
            Some((_, best_cost)) if cost >= best_cost => {}
            _ => best = Some((*candidate, cost)),
        }
    }
    best
}

/// Step 2: true if `chosen` jumps `threshold` strings or more from `last`.
pub fn vetoes_string_jump(chosen: &Position, last: &Position, threshold: usize) -> bool {
    chosen.string_distance(last) >= threshold
}

/// Chooses a position for the current frame.
///
/// When the time since the last accepted note exceeds the pause threshold (or
/// nothing has been accepted yet) the history is treated as empty: candidates
/// are ranked on fret bias alone, the cost ceiling is lifted and
/// `reset_history` is raised. Otherwise candidates over the ceiling are
/// dropped and the cheapest survivor is subject to the string-jump veto.
///
/// # Arguments
/// * `candidates` - Output of the frequency mapper, in its order
/// * `history` - Recently accepted positions, oldest first
/// * `now` - Timestamp of the current frame in seconds
/// * `last_accept_time` - Timestamp of the last accepted note, if any
/// * `policy` - Pause, cost and jump thresholds
pub fn select_position(
    candidates: &[Position],
    history: &[Position],
    now: f64,
    last_accept_time: Option<f64>,
    policy: &SelectionPolicy,
) -> Selection {
    let stale = last_accept_time.is_none_or(|last| now - last > policy.pause_threshold_s);
    if stale {
        let chosen = rank_candidates(candidates, &[], None).map(|(position, _)| position);
        return Selection {
            chosen,
            reset_history: !history.is_empty() && chosen.is_some(),
        };
    }

    let ranked = rank_candidates(candidates, history, Some(policy.max_movement_cost));
    let chosen = match (ranked, history.last()) {
        (Some((position, _)), Some(last))
            if vetoes_string_jump(&position, last, policy.string_jump_threshold) =>
        {
            log::trace!(
                target: "engine",
                "vetoed {:?}: {} strings from {:?}",
                position,
                position.string_distance(last),
                last
            );
            None
        }
        (ranked, _) => ranked.map(|(position, _)| position),
    };

    Selection {
        chosen,
        reset_history: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> SelectionPolicy {
        SelectionPolicy {
            pause_threshold_s: 3.0,
            max_movement_cost: 8.0,
            string_jump_threshold: 3,
        }
    }

    fn pos(string_index: usize, fret: u32) -> Position {
        Position::new(string_index, fret)
    }

    #[test]
    fn cost_weights_recent_notes_more() {
        // Oldest first: (0,0) is two notes back, (1,0) is the latest.
        let history = [pos(0, 0), pos(1, 0)];
        let candidate = pos(1, 4);
        // latest: sqrt(0 + 16) = 4 * 1; older: sqrt(1 + 16) * 1/2; bias 0.4
        let expected = 4.0 + 17.0_f32.sqrt() / 2.0 + 0.4;
        assert!((movement_cost(&candidate, &history) - expected).abs() < 1e-5);
    }

    #[test]
    fn empty_history_prefers_lowest_fret() {
        let candidates = [pos(0, 17), pos(1, 12), pos(2, 7), pos(3, 2)];
        let selection = select_position(&candidates, &[], 0.0, None, &policy());
        assert_eq!(selection.chosen, Some(pos(3, 2)));
        assert!(!selection.reset_history);
    }

    #[test]
    fn nearby_position_beats_lower_fret() {
        let history = [pos(1, 10)];
        let candidates = [pos(1, 12), pos(2, 7), pos(3, 2)];
        let selection = select_position(&candidates, &history, 1.0, Some(0.5), &policy());
        assert_eq!(selection.chosen, Some(pos(1, 12)));
    }

    #[test]
    fn candidates_over_the_ceiling_are_dropped() {
        let history = [pos(0, 0)];
        // sqrt(4 + 144) + 1.2 is well over 8.
        let candidates = [pos(2, 12)];
        let selection = select_position(&candidates, &history, 1.0, Some(0.5), &policy());
        assert_eq!(selection.chosen, None);
        assert!(!selection.reset_history);
    }

    #[test]
    fn cost_equal_to_the_ceiling_is_kept() {
        let policy = SelectionPolicy {
            pause_threshold_s: 3.0,
            max_movement_cost: 4.0,
            string_jump_threshold: 5,
        };
        // Four strings across at fret 0 costs exactly 4.0.
        let history = [pos(0, 0)];
        let candidates = [pos(4, 0)];
        assert_eq!(movement_cost(&candidates[0], &history), 4.0);
        let selection = select_position(&candidates, &history, 1.0, Some(0.5), &policy);
        assert_eq!(selection.chosen, Some(pos(4, 0)));

        let tighter = SelectionPolicy {
            max_movement_cost: 3.99,
            ..policy
        };
        let selection = select_position(&candidates, &history, 1.0, Some(0.5), &tighter);
        assert_eq!(selection.chosen, None);
    }

    #[test]
    fn far_string_jump_is_vetoed_even_when_cheapest() {
        let history = [pos(0, 5)];
        // Cost sqrt(16) + 0.5 = 4.5, under the ceiling, but four strings away.
        let candidates = [pos(4, 5)];
        assert!(rank_candidates(&candidates, &history, Some(8.0)).is_some());
        let selection = select_position(&candidates, &history, 1.0, Some(0.5), &policy());
        assert_eq!(selection.chosen, None);
    }

    #[test]
    fn jump_just_below_threshold_is_allowed() {
        let history = [pos(0, 5)];
        let candidates = [pos(2, 5)];
        let selection = select_position(&candidates, &history, 1.0, Some(0.5), &policy());
        assert_eq!(selection.chosen, Some(pos(2, 5)));
    }

    #[test]
    fn pause_lifts_ceiling_and_requests_reset() {
        let history = [pos(0, 0)];
        let candidates = [pos(4, 12), pos(5, 7)];
        let selection = select_position(&candidates, &history, 10.0, Some(5.0), &policy());
        assert_eq!(selection.chosen, Some(pos(5, 7)));
        assert!(selection.reset_history);
    }

    #[test]
    fn pause_skips_the_jump_veto() {
        let history = [pos(0, 0)];
        let candidates = [pos(5, 0)];
        let selection = select_position(&candidates, &history, 4.0, Some(0.0), &policy());
        assert_eq!(selection.chosen, Some(pos(5, 0)));
        assert!(selection.reset_history);
    }

    #[test]
    fn exactly_at_pause_threshold_is_not_stale() {
        let history = [pos(0, 0)];
        let candidates = [pos(5, 0)];
        let selection = select_position(&candidates, &history, 3.0, Some(0.0), &policy());
        assert_eq!(selection.chosen, None);
        assert!(!selection.reset_history);
    }

    #[test]
    fn ties_go_to_the_first_candidate() {
        // Both are distance 1 from (1,0) with fret 0.
        let history = [pos(1, 0)];
        let candidates = [pos(0, 0), pos(2, 0)];
        let selection = select_position(&candidates, &history, 1.0, Some(0.5), &policy());
        assert_eq!(selection.chosen, Some(pos(0, 0)));
    }

    #[test]
    fn no_candidates_means_no_selection() {
        let selection = select_position(&[], &[pos(0, 0)], 1.0, Some(0.5), &policy());
        assert_eq!(selection, Selection { chosen: None, reset_history: false });
    }
}
