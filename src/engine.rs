//! # Flow Engine
//!
//! Sequences one flow generation:
//!
//! ```text
//! period ─► history ─► vibe learning ─► anchors (vibe + familiar)
//!        ─► skeleton ─► bridging / sonic sort ─► expansion + padding
//!        ─► final dedup and cap ─► playlist store
//! ```
//!
//! Generation never fails once the configuration is valid: collaborator errors
//! degrade the affected stage to an empty result and the run continues with
//! whatever the other stages produced.

use crate::anchors::{FamiliarAnchorSelector, VibeAnchorSelector};
use crate::catalog::{PlayHistory, PlaylistStore, TrackSource};
use crate::compose::{FlowComposer, Pacer};
use crate::config::Config;
use crate::expand::FillStage;
use crate::filter::TrackFilter;
use crate::history::PeriodHistory;
use crate::period::{ActivePeriod, Schedule, VibeCriteria};
use crate::skeleton::build_skeleton;
use crate::track::{CandidatePool, Track};
use crate::vibe::{learn_vibe, LearnedVibe};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::time::Duration as StdDuration;

/// Stage-by-stage track counts of one generation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlowStats {
    pub history_plays: usize,
    pub familiar_anchors: usize,
    pub vibe_anchors: usize,
    pub skeleton: usize,
    pub composed: usize,
    pub from_expansion: usize,
    pub from_padding: usize,
}

/// A generated flow, ready to be stored
#[derive(Debug, Clone, Serialize)]
pub struct FlowPlaylist {
    pub name: String,
    pub period: String,
    pub criteria: VibeCriteria,
    pub learned_moods: Vec<String>,
    pub learned_styles: Vec<String>,
    pub generated_at: DateTime<Utc>,
    pub timezone: String,
    pub tracks: Vec<Track>,
    pub stats: FlowStats,
}

impl FlowPlaylist {
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Human readable playlist description
    pub fn description(&self) -> String {
        let mut text = format!("{} flow", self.period);
        if !self.criteria.moods.is_empty() {
            text.push_str(&format!(" | moods: {}", self.criteria.moods.join(", ")));
        }
        if !self.criteria.styles.is_empty() {
            text.push_str(&format!(" | styles: {}", self.criteria.styles.join(", ")));
        }
        let local = self
            .timezone
            .parse::<Tz>()
            .map(|tz| self.generated_at.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|_| self.generated_at.format("%Y-%m-%d %H:%M UTC").to_string());
        text.push_str(&format!(" | updated {local} ({})", self.timezone));
        text
    }
}

/// Builds flows from a validated configuration
pub struct FlowGenerator<'a> {
    config: &'a Config,
    schedule: Schedule,
    tz: Tz,
    rng: StdRng,
}

impl<'a> FlowGenerator<'a> {
    /// # Errors
    ///
    /// Fails when the configuration does not validate.
    pub fn new(config: &'a Config) -> Result<Self> {
        config.validate().context("Invalid configuration")?;
        Ok(Self {
            config,
            schedule: config.schedule()?,
            tz: config.time_zone()?,
            rng: StdRng::from_entropy(),
        })
    }

    /// Use a fixed seed for reproducible runs
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn time_zone(&self) -> Tz {
        self.tz
    }

    /// Period in effect at `now`, in the configured timezone
    pub fn active_period(&self, now: DateTime<Utc>) -> ActivePeriod {
        self.schedule.resolve_at(&now.with_timezone(&self.tz))
    }

    /// Generate the flow for `now`
    pub fn generate<S>(&mut self, source: &S, now: DateTime<Utc>) -> FlowPlaylist
    where
        S: TrackSource + PlayHistory + ?Sized,
    {
        let config = self.config;
        let active = self.active_period(now);
        info!(
            "Generating '{}' for period '{}' ({} local)",
            config.playlist_name,
            active.name(),
            now.with_timezone(&self.tz).format("%H:%M")
        );

        let filter = TrackFilter::new(&config.filters, now);
        let history = PeriodHistory::fetch(source, config, &active, self.tz, now);

        let learned = if config.vibe_learning.enabled {
            let since = now - Duration::days(i64::from(config.vibe_learning.lookback_days));
            learn_vibe(history.plays_since(since), &config.vibe_learning)
        } else {
            LearnedVibe::default()
        };
        let criteria = active.definition.base.augmented(&learned.moods, &learned.styles);
        info!("Vibe: moods {:?}, styles {:?}", criteria.moods, criteria.styles);

        let vibe = VibeAnchorSelector::new(source, &config.libraries, &filter).select(
            &criteria,
            config.vibe_anchor_count,
            config.search_limit,
            &mut self.rng,
        );

        let history_since = now - Duration::days(i64::from(config.history.lookback_days));
        let familiar = FamiliarAnchorSelector::new(&config.history, &filter).select(
            history.tracks_since(history_since),
            &criteria,
            config.history.target_count,
            &mut self.rng,
        );

        let skeleton = build_skeleton(&familiar, &vibe);
        let mut stats = FlowStats {
            history_plays: history.len(),
            familiar_anchors: familiar.len(),
            vibe_anchors: vibe.len(),
            skeleton: skeleton.len(),
            ..FlowStats::default()
        };

        let pacer = Pacer::new(StdDuration::from_millis(config.similarity_delay_ms));
        let composed = FlowComposer::new(source, config, &filter, &pacer).compose(skeleton, &mut self.rng);
        stats.composed = composed.len();

        let target = config.playlist_target_size;
        let filled = FillStage::new(source, config, &filter, &pacer).fill(composed, &criteria, target, &mut self.rng);
        stats.from_expansion = filled.from_expansion;
        stats.from_padding = filled.from_padding;

        let mut tracks: CandidatePool = filled.tracks.into_iter().collect();
        tracks.truncate(target);
        info!("Flow for '{}' has {} of {target} tracks", active.name(), tracks.len());

        FlowPlaylist {
            name: config.playlist_name.clone(),
            period: active.name().to_string(),
            criteria,
            learned_moods: learned.moods,
            learned_styles: learned.styles,
            generated_at: now,
            timezone: self.tz.name().to_string(),
            tracks: tracks.into_vec(),
            stats,
        }
    }
}

/// Result of handing a track list to the playlist store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Publication {
    Created { tracks: usize },
    Replaced { tracks: usize },
    /// Nothing to store; the existing playlist was left untouched
    Skipped,
}

/// Replace the contents of playlist `name` with `tracks`.
///
/// An empty `tracks` leaves any existing playlist untouched. A failed
/// description update is logged but does not fail the publication.
///
/// # Errors
///
/// Fails when the playlist cannot be looked up, created or refilled.
pub fn publish<P: PlaylistStore + ?Sized>(
    store: &P,
    name: &str,
    tracks: &[Track],
    description: &str,
) -> Result<Publication> {
    if tracks.is_empty() {
        warn!("No tracks generated for '{name}', keeping the existing playlist");
        return Ok(Publication::Skipped);
    }

    let existing = store
        .get_playlist(name)
        .with_context(|| format!("Failed to look up playlist '{name}'"))?;

    let (playlist, publication) = match existing {
        Some(playlist) => {
            store
                .replace_items(&playlist, tracks)
                .with_context(|| format!("Failed to replace tracks of playlist '{name}'"))?;
            (playlist, Publication::Replaced { tracks: tracks.len() })
        }
        None => {
            let playlist = store
                .create_playlist(name, tracks)
                .with_context(|| format!("Failed to create playlist '{name}'"))?;
            (playlist, Publication::Created { tracks: tracks.len() })
        }
    };

    if let Err(e) = store.set_description(&playlist, description) {
        warn!("Could not update description of '{name}': {e:#}");
    }

    info!("Stored {} tracks in '{name}'", tracks.len());
    Ok(publication)
}
