//! Play history for the active period.
//!
//! History is fetched once per run, for the longest lookback any consumer
//! needs, and restricted to plays whose local hour falls inside the active
//! period. The vibe learner and the familiar anchor selector then narrow it to
//! their own lookback windows.

use crate::catalog::PlayHistory;
use crate::config::Config;
use crate::period::ActivePeriod;
use crate::track::{CandidatePool, HistoryEvent, Track};
use chrono::{DateTime, Duration, Timelike, Utc};
use chrono_tz::Tz;
use log::{debug, info, warn};
use std::collections::BTreeSet;

/// Plays that happened during the active period's hours
#[derive(Debug, Clone, Default)]
pub struct PeriodHistory {
    events: Vec<HistoryEvent>,
}

impl PeriodHistory {
    /// Fetch history covering every enabled consumer's lookback.
    ///
    /// A failed fetch is logged and treated as an empty history.
    pub fn fetch<H: PlayHistory + ?Sized>(
        source: &H,
        config: &Config,
        active: &ActivePeriod,
        tz: Tz,
        now: DateTime<Utc>,
    ) -> Self {
        let lookback = [
            (config.vibe_learning.enabled, config.vibe_learning.lookback_days),
            (config.history.enabled, config.history.lookback_days),
        ]
        .iter()
        .filter(|(enabled, _)| *enabled)
        .map(|(_, days)| *days)
        .max();

        let Some(days) = lookback else {
            debug!("Vibe learning and history integration disabled, skipping history fetch");
            return Self::default();
        };

        let since = now - Duration::days(i64::from(days));
        match source.play_history(since, config.history.max_results) {
            Ok(events) => {
                let fetched = events.len();
                let history = Self::from_events(events, &active.active_hours, tz);
                info!(
                    "History: {} of {fetched} plays in the last {days} days fall in '{}' hours",
                    history.len(),
                    active.name()
                );
                history
            }
            Err(e) => {
                warn!("Play history unavailable, continuing without it: {e:#}");
                Self::default()
            }
        }
    }

    /// Keep events whose local hour (in `tz`) is one of `hours`
    pub fn from_events(events: Vec<HistoryEvent>, hours: &BTreeSet<u32>, tz: Tz) -> Self {
        let events = events
            .into_iter()
            .filter(|event| hours.contains(&event.played_at.with_timezone(&tz).hour()))
            .collect();
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Plays at or after `since`
    pub fn plays_since(&self, since: DateTime<Utc>) -> Vec<&HistoryEvent> {
        self.events.iter().filter(|e| e.played_at >= since).collect()
    }

    /// Distinct tracks played at or after `since`, keeping the newest snapshot of each
    pub fn tracks_since(&self, since: DateTime<Utc>) -> Vec<Track> {
        let mut plays = self.plays_since(since);
        plays.sort_by(|a, b| b.played_at.cmp(&a.played_at));
        plays
            .into_iter()
            .map(|e| e.track.clone())
            .collect::<CandidatePool>()
            .into_vec()
    }
}
