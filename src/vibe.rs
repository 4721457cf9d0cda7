//! # Vibe Learning
//!
//! Learns which moods and styles the listener actually plays during a period and
//! adds the most frequent ones to the period's base vibe.
//!
//! Every play contributes once per distinct tag (tags are compared
//! case-insensitively), so a track played five times in the window counts five
//! times, but a track tagged both `Chill` and `chill` counts once per play.

use crate::config::VibeLearningConfig;
use crate::track::{normalize_tag, HistoryEvent};
use log::debug;
use std::collections::{HashMap, HashSet};

/// Moods and styles learned from history
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LearnedVibe {
    pub moods: Vec<String>,
    pub styles: Vec<String>,
}

impl LearnedVibe {
    pub fn is_empty(&self) -> bool {
        self.moods.is_empty() && self.styles.is_empty()
    }
}

/// Tag tally per normalized tag. The displayed spelling comes from the first
/// play carrying the tag; within one play, the first tag in iteration order
/// wins (track tags iterate sorted, so "Chill" beats "chill").
#[derive(Debug, Default)]
struct TagTally {
    counts: HashMap<String, (String, usize)>,
}

impl TagTally {
    fn add_play<'a>(&mut self, tags: impl IntoIterator<Item = &'a String>) {
        let mut seen = HashSet::new();
        for tag in tags {
            let key = normalize_tag(tag);
            if key.is_empty() || !seen.insert(key.clone()) {
                continue;
            }
            self.counts
                .entry(key)
                .or_insert_with(|| (tag.trim().to_string(), 0))
                .1 += 1;
        }
    }

    /// Most frequent tags with at least `min_occurrences`, ties broken alphabetically
    fn top(self, limit: usize, min_occurrences: usize) -> Vec<String> {
        let mut ranked: Vec<(String, String, usize)> = self
            .counts
            .into_iter()
            .filter(|(_, (_, count))| *count >= min_occurrences)
            .map(|(key, (spelling, count))| (key, spelling, count))
            .collect();

        ranked.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
        ranked
            .into_iter()
            .take(limit)
            .map(|(_, spelling, _)| spelling)
            .collect()
    }
}

/// Learn moods and styles from `plays`, which must already be restricted to
/// the period's hours and the lookback window.
///
/// Returns nothing when learning is disabled.
pub fn learn_vibe<'a, I>(plays: I, config: &VibeLearningConfig) -> LearnedVibe
where
    I: IntoIterator<Item = &'a HistoryEvent>,
{
    if !config.enabled {
        return LearnedVibe::default();
    }

    let mut moods = TagTally::default();
    let mut styles = TagTally::default();
    let mut play_count = 0usize;

    for event in plays {
        moods.add_play(&event.track.moods);
        styles.add_play(&event.track.genres);
        play_count += 1;
    }

    let learned = LearnedVibe {
        moods: moods.top(config.top_n_moods, config.min_occurrences),
        styles: styles.top(config.top_m_styles, config.min_occurrences),
    };
    debug!(
        "Learned from {play_count} plays: moods {:?}, styles {:?}",
        learned.moods, learned.styles
    );
    learned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::track;

    fn config(top_n: usize, top_m: usize, min: usize) -> VibeLearningConfig {
        VibeLearningConfig {
            enabled: true,
            lookback_days: 30,
            top_n_moods: top_n,
            top_m_styles: top_m,
            min_occurrences: min,
        }
    }

    fn plays_at(moods: &[&str], genres: &[&str], hours: &[u32]) -> Vec<HistoryEvent> {
        let track = track("a", "X", moods, genres);
        hours
            .iter()
            .enumerate()
            .map(|(day, hour)| HistoryEvent {
                track: track.clone(),
                played_at: format!("2026-10-{:02}T{:02}:00:00Z", day + 1, hour).parse().unwrap(),
            })
            .collect()
    }

    #[test]
    fn test_repeated_plays_of_one_track_are_learned() {
        let plays = plays_at(&["Energetic"], &[], &[7, 7, 7, 8, 9]);
        let learned = learn_vibe(&plays, &config(3, 2, 2));

        assert_eq!(learned.moods, vec!["Energetic"]);
    }

    #[test]
    fn test_tags_below_minimum_are_never_returned() {
        let mut plays = plays_at(&["Calm"], &["Ambient"], &[7, 8, 9]);
        plays.extend(plays_at(&["Tense"], &["Drone"], &[10]));

        let learned = learn_vibe(&plays, &config(5, 5, 2));
        assert_eq!(learned.moods, vec!["Calm"]);
        assert_eq!(learned.styles, vec!["Ambient"]);
    }

    #[test]
    fn test_case_variants_count_once_per_play() {
        let plays = plays_at(&["Chill", "chill", "CHILL "], &[], &[7]);
        let learned = learn_vibe(&plays, &config(3, 3, 2));
        assert!(learned.moods.is_empty(), "One play must not count as three");
    }

    #[test]
    fn test_spelling_comes_from_the_first_play() {
        let mut plays = plays_at(&["dreamy"], &[], &[7]);
        plays.extend(plays_at(&["Dreamy", "DREAMY"], &[], &[7, 8]));
        assert_eq!(learn_vibe(&plays, &config(3, 3, 1)).moods, vec!["dreamy"]);

        let single = plays_at(&["dreamy", "Dreamy"], &[], &[7]);
        assert_eq!(learn_vibe(&single, &config(3, 3, 1)).moods, vec!["Dreamy"], "Sorted tag order within a play");
    }

    #[test]
    fn test_top_n_limits_and_orders_by_frequency() {
        let mut plays = plays_at(&["Warm"], &[], &[7, 7, 7]);
        plays.extend(plays_at(&["Bright"], &[], &[8, 8, 8, 8]));
        plays.extend(plays_at(&["Airy"], &[], &[9, 9, 9]));

        let learned = learn_vibe(&plays, &config(2, 2, 1));
        assert_eq!(learned.moods, vec!["Bright", "Airy"], "Ties resolve alphabetically");
    }

    #[test]
    fn test_disabled_learning_returns_nothing() {
        let plays = plays_at(&["Energetic"], &["House"], &[7, 7, 7]);
        let mut disabled = config(3, 3, 1);
        disabled.enabled = false;

        assert!(learn_vibe(&plays, &disabled).is_empty());
    }
}
