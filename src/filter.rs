//! Rating, recency and skip-count rules applied to every candidate collection.
//!
//! Two modes exist because unrated tracks mean different things depending on
//! where they came from:
//!
//! - [`FilterMode::Discovery`] keeps unrated tracks, otherwise nothing new
//!   would ever get a chance to be rated.
//! - [`FilterMode::Historical`] drops unrated tracks once a minimum rating is
//!   set; a favourite has to be a rated favourite.

use crate::config::FilterConfig;
use crate::track::Track;
use chrono::{DateTime, Duration, Utc};
use log::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Discovery,
    Historical,
}

/// Filter rules bound to a point in time
#[derive(Debug, Clone)]
pub struct TrackFilter {
    min_rating_stars: f64,
    exclude_played_days: u32,
    max_skip_count: u32,
    now: DateTime<Utc>,
}

impl TrackFilter {
    pub fn new(config: &FilterConfig, now: DateTime<Utc>) -> Self {
        Self {
            min_rating_stars: config.min_rating_stars,
            exclude_played_days: config.exclude_played_days,
            max_skip_count: config.max_skip_count,
            now,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Whether a single track survives all rules in `mode`
    pub fn accepts(&self, track: &Track, mode: FilterMode) -> bool {
        let passed = self.passes_rating(track, mode)
            && self.passes_recency(track)
            && track.skip_count <= self.max_skip_count;

        if !passed {
            trace!("Filtered out ({mode:?}): {track}");
        }
        passed
    }

    /// Surviving tracks in their original order
    pub fn apply<I>(&self, tracks: I, mode: FilterMode) -> Vec<Track>
    where
        I: IntoIterator<Item = Track>,
    {
        tracks
            .into_iter()
            .filter(|track| self.accepts(track, mode))
            .collect()
    }

    fn passes_rating(&self, track: &Track, mode: FilterMode) -> bool {
        if self.min_rating_stars <= 0.0 {
            return true;
        }
        match (track.rating, mode) {
            (Some(stars), _) => stars >= self.min_rating_stars,
            (None, FilterMode::Discovery) => true,
            (None, FilterMode::Historical) => false,
        }
    }

    fn passes_recency(&self, track: &Track) -> bool {
        if self.exclude_played_days == 0 {
            return true;
        }
        let cutoff = self.now - Duration::days(i64::from(self.exclude_played_days));
        match track.last_played_at {
            Some(played) => played < cutoff,
            None => true,
        }
    }
}
