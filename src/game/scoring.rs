//! Scoring and placement math

use indexmap::IndexMap;
use uuid::Uuid;

use super::r#match::PlayerState;

/// Characters per word, for words-per-minute purposes
pub const CHARS_PER_WORD: f64 = 5.0;

/// Words-per-minute over the typing window; 0 when the window is empty
pub fn words_per_minute(cursor: usize, started_at_ms: u64, ended_at_ms: u64) -> f64 {
    if ended_at_ms <= started_at_ms {
        return 0.0;
    }
    let minutes = (ended_at_ms - started_at_ms) as f64 / 60_000.0;
    (cursor as f64 / CHARS_PER_WORD) / minutes
}

/// Keystroke accuracy; 0 when nothing was typed
pub fn accuracy(correct: u32, incorrect: u32) -> f64 {
    let total = correct + incorrect;
    if total == 0 {
        return 0.0;
    }
    f64::from(correct) / f64::from(total)
}

/// Assign placements 1..N by total points descending.
///
/// The sort is stable, so tied players keep roster (join) order.
pub fn assign_placements(roster: &mut IndexMap<Uuid, PlayerState>) {
    let mut ranked: Vec<(Uuid, f64)> = roster
        .iter()
        .map(|(id, player)| (*id, player.points))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    for (i, (id, _)) in ranked.iter().enumerate() {
        if let Some(player) = roster.get_mut(id) {
            player.placement = (i + 1) as u32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: Uuid, points: f64) -> PlayerState {
        let mut p = PlayerState::new(id, format!("p{}", id.as_fields().0), false, None);
        p.points = points;
        p
    }

    #[test]
    fn wpm_counts_five_chars_as_a_word() {
        // 25 chars in 60s = 5 words per minute
        let wpm = words_per_minute(25, 0, 60_000);
        assert!((wpm - 5.0).abs() < 1e-9);
    }

    #[test]
    fn wpm_is_zero_for_an_empty_window() {
        assert_eq!(words_per_minute(25, 1000, 1000), 0.0);
        assert_eq!(words_per_minute(25, 2000, 1000), 0.0);
    }

    #[test]
    fn accuracy_is_zero_when_nothing_was_typed() {
        assert_eq!(accuracy(0, 0), 0.0);
        assert!((accuracy(3, 1) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn placements_are_a_bijection_ordered_by_points() {
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let mut roster = IndexMap::new();
        roster.insert(ids[0], player(ids[0], 10.0));
        roster.insert(ids[1], player(ids[1], 40.0));
        roster.insert(ids[2], player(ids[2], 20.0));
        roster.insert(ids[3], player(ids[3], 30.0));

        assign_placements(&mut roster);

        assert_eq!(roster[&ids[1]].placement, 1);
        assert_eq!(roster[&ids[3]].placement, 2);
        assert_eq!(roster[&ids[2]].placement, 3);
        assert_eq!(roster[&ids[0]].placement, 4);

        let mut placements: Vec<u32> = roster.values().map(|p| p.placement).collect();
        placements.sort_unstable();
        assert_eq!(placements, vec![1, 2, 3, 4]);
    }

    #[test]
    fn ties_break_by_roster_join_order() {
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let mut roster = IndexMap::new();
        roster.insert(ids[0], player(ids[0], 25.0));
        roster.insert(ids[1], player(ids[1], 25.0));
        roster.insert(ids[2], player(ids[2], 25.0));

        assign_placements(&mut roster);

        assert_eq!(roster[&ids[0]].placement, 1);
        assert_eq!(roster[&ids[1]].placement, 2);
        assert_eq!(roster[&ids[2]].placement, 3);
    }
}
