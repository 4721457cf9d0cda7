//! # Period Resolution
//!
//! A day is split into named periods, each starting at a whole hour and running
//! until the next period starts. The last period wraps past midnight into the
//! first one, so a schedule always covers all 24 hours.
//!
//! ```
//! use daylist::period::{PeriodDefinition, Schedule, VibeCriteria};
//!
//! let schedule = Schedule::new(vec![
//!     PeriodDefinition::new("Morning", 7, VibeCriteria::default()),
//!     PeriodDefinition::new("Midday", 12, VibeCriteria::default()),
//! ])?;
//!
//! let active = schedule.resolve(9);
//! assert_eq!(active.name(), "Morning");
//! assert_eq!(active.active_hours.iter().copied().collect::<Vec<_>>(), vec![7, 8, 9, 10, 11]);
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::track::normalize_tag;
use anyhow::{bail, Result};
use chrono::{DateTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Name of the period used when no schedule is configured
pub const DEFAULT_PERIOD_NAME: &str = "Default";

/// Target moods and styles for a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VibeCriteria {
    #[serde(default)]
    pub moods: Vec<String>,
    #[serde(default)]
    pub styles: Vec<String>,
}

impl VibeCriteria {
    pub fn new<M, S>(moods: M, styles: S) -> Self
    where
        M: IntoIterator,
        M::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        Self {
            moods: moods.into_iter().map(Into::into).collect(),
            styles: styles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.moods.is_empty() && self.styles.is_empty()
    }

    /// Copy of `self` with the extra terms appended, skipping anything already
    /// present in any letter case.
    #[must_use]
    pub fn augmented(&self, moods: &[String], styles: &[String]) -> Self {
        Self {
            moods: union_tags(&self.moods, moods),
            styles: union_tags(&self.styles, styles),
        }
    }
}

fn union_tags(base: &[String], extra: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = base.iter().map(|t| normalize_tag(t)).collect();
    let mut merged = base.to_vec();
    for tag in extra {
        if seen.insert(normalize_tag(tag)) {
            merged.push(tag.clone());
        }
    }
    merged
}

/// A named daily time window and its base vibe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodDefinition {
    pub name: String,
    pub start_hour: u32,
    #[serde(flatten)]
    pub base: VibeCriteria,
}

impl PeriodDefinition {
    pub fn new(name: impl Into<String>, start_hour: u32, base: VibeCriteria) -> Self {
        Self {
            name: name.into(),
            start_hour,
            base,
        }
    }
}

/// The period in effect right now and the hours it covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivePeriod {
    pub definition: PeriodDefinition,
    pub active_hours: BTreeSet<u32>,
}

impl ActivePeriod {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn covers(&self, hour: u32) -> bool {
        self.active_hours.contains(&hour)
    }
}

/// Validated day schedule, sorted by start hour
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    periods: Vec<PeriodDefinition>,
}

impl Schedule {
    /// # Errors
    ///
    /// Rejects hours outside 0-23, duplicate names and two periods starting at
    /// the same hour.
    pub fn new(mut periods: Vec<PeriodDefinition>) -> Result<Self> {
        let mut names = HashSet::new();
        let mut hours = HashSet::new();

        for period in &periods {
            if period.name.trim().is_empty() {
                bail!("Period names cannot be empty");
            }
            if period.start_hour > 23 {
                bail!(
                    "Period '{}' starts at hour {}, expected 0-23",
                    period.name,
                    period.start_hour
                );
            }
            if !names.insert(period.name.clone()) {
                bail!("Period '{}' is defined more than once", period.name);
            }
            if !hours.insert(period.start_hour) {
                bail!(
                    "Period '{}' starts at hour {} which is already taken",
                    period.name,
                    period.start_hour
                );
            }
        }

        periods.sort_by_key(|p| p.start_hour);
        Ok(Self { periods })
    }

    pub fn periods(&self) -> &[PeriodDefinition] {
        &self.periods
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&PeriodDefinition> {
        self.periods.iter().find(|p| p.name == name)
    }

    /// Resolve the period active at `hour` (0-23)
    pub fn resolve(&self, hour: u32) -> ActivePeriod {
        let hour = hour % 24;

        if self.periods.is_empty() {
            return ActivePeriod {
                definition: PeriodDefinition::new(DEFAULT_PERIOD_NAME, 0, VibeCriteria::default()),
                active_hours: (0..24).collect(),
            };
        }

        // Last period whose start is not after `hour`; before the first start
        // we are still inside yesterday's last period.
        let index = self
            .periods
            .iter()
            .rposition(|p| p.start_hour <= hour)
            .unwrap_or(self.periods.len() - 1);

        ActivePeriod {
            definition: self.periods[index].clone(),
            active_hours: self.hours_of(index),
        }
    }

    /// Resolve the period active at a zoned timestamp
    pub fn resolve_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> ActivePeriod {
        self.resolve(now.hour())
    }

    fn hours_of(&self, index: usize) -> BTreeSet<u32> {
        let start = self.periods[index].start_hour;
        let end = self.periods[(index + 1) % self.periods.len()].start_hour;

        if end > start {
            (start..end).collect()
        } else {
            // Wraps past midnight, or a single period covering the whole day
            (start..24).chain(0..end).collect()
        }
    }
}

lazy_static::lazy_static! {
    /// Built-in day schedule used when the configuration does not provide one
    pub static ref DEFAULT_PERIODS: Vec<PeriodDefinition> = vec![
        PeriodDefinition::new("Late Night", 0, VibeCriteria::new(["Brooding", "Atmospheric", "Nocturnal"], ["Ambient", "Downtempo"])),
        PeriodDefinition::new("Early Morning", 5, VibeCriteria::new(["Calm", "Peaceful", "Gentle"], ["Acoustic", "Folk"])),
        PeriodDefinition::new("Morning", 8, VibeCriteria::new(["Upbeat", "Cheerful", "Energetic"], ["Indie Pop", "Soul"])),
        PeriodDefinition::new("Midday", 12, VibeCriteria::new(["Confident", "Lively"], ["Pop", "Funk"])),
        PeriodDefinition::new("Afternoon", 15, VibeCriteria::new(["Laid-Back", "Warm"], ["Indie Rock", "Alternative"])),
        PeriodDefinition::new("Evening", 18, VibeCriteria::new(["Romantic", "Smooth", "Sophisticated"], ["Jazz", "R&B"])),
        PeriodDefinition::new("Night", 21, VibeCriteria::new(["Hypnotic", "Dreamy"], ["Electronic", "Trip Hop"])),
    ];
}
