//! # Expansion and Padding
//!
//! Fills the composed flow up to the target size in three passes:
//!
//! 1. **Sonic expansion**: neighbours of a random sample of placed tracks,
//!    filling at most `ceil(remaining × mix_ratio)` slots. While that quota is
//!    open, each round seeds the next from the tracks it just added, and stops
//!    once a round adds nothing.
//! 2. **Discovery padding**: a wider search for the period's vibe.
//! 3. **Leftovers**: expansion candidates that were not reached in pass 1.
//!
//! Every pass skips ids already placed and respects the per-artist cap, which
//! is counted over everything this stage adds (anchors and bridges are not
//! counted). The result may stay short of the target.

use crate::anchors::VibeAnchorSelector;
use crate::catalog::TrackSource;
use crate::compose::Pacer;
use crate::config::Config;
use crate::filter::{FilterMode, TrackFilter};
use crate::period::VibeCriteria;
use crate::track::{CandidatePool, Track};
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;

/// Limits how many tracks per artist a fill stage may add
#[derive(Debug, Clone)]
pub struct ArtistCap {
    limit: usize,
    counts: HashMap<String, usize>,
}

impl ArtistCap {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            counts: HashMap::new(),
        }
    }

    pub fn admits(&self, track: &Track) -> bool {
        self.counts.get(&track.artist_key()).copied().unwrap_or(0) < self.limit
    }

    pub fn record(&mut self, track: &Track) {
        *self.counts.entry(track.artist_key()).or_insert(0) += 1;
    }
}

/// What the fill stage produced
#[derive(Debug, Clone, Default)]
pub struct Filled {
    pub tracks: Vec<Track>,
    pub from_expansion: usize,
    pub from_padding: usize,
}

pub struct FillStage<'a, S: ?Sized> {
    source: &'a S,
    config: &'a Config,
    filter: &'a TrackFilter,
    pacer: &'a Pacer,
}

impl<'a, S: TrackSource + ?Sized> FillStage<'a, S> {
    pub fn new(source: &'a S, config: &'a Config, filter: &'a TrackFilter, pacer: &'a Pacer) -> Self {
        Self {
            source,
            config,
            filter,
            pacer,
        }
    }

    /// Fill `flow` towards `target` tracks
    pub fn fill<R: Rng + ?Sized>(
        &self,
        flow: Vec<Track>,
        criteria: &VibeCriteria,
        target: usize,
        rng: &mut R,
    ) -> Filled {
        let mut placed: CandidatePool = flow.into_iter().collect();
        let mut cap = ArtistCap::new(self.config.max_tracks_per_artist);
        let mut filled = Filled::default();

        if placed.len() >= target {
            filled.tracks = placed.into_vec();
            return filled;
        }

        let expansion = &self.config.sonic_expansion;
        let mut leftovers = Vec::new();
        if expansion.enabled && !placed.is_empty() {
            let remaining = target - placed.len();
            let mut quota = (remaining as f64 * expansion.mix_ratio).ceil() as usize;
            let mut seeds = placed.as_slice().to_vec();
            let mut round = 1;
            loop {
                let candidates = self.expansion_candidates(&seeds, rng);
                let before = placed.len();
                let (added, rest) = offer(&mut placed, &mut cap, candidates, quota);
                filled.from_expansion += added;
                leftovers.extend(rest);
                quota -= added;
                if quota == 0 || added == 0 {
                    break;
                }
                debug!("Expansion round {round} added {added} tracks, {quota} slots left for expansion");
                seeds = placed.as_slice()[before..].to_vec();
                round += 1;
            }
        }

        if placed.len() < target && !criteria.is_empty() {
            let selector = VibeAnchorSelector::new(self.source, &self.config.libraries, self.filter);
            let mut padding = selector
                .candidates(criteria, self.config.padding_search_limit, rng)
                .into_vec();
            padding.shuffle(rng);
            let quota = target - placed.len();
            let (added, _) = offer(&mut placed, &mut cap, padding, quota);
            filled.from_padding += added;
        }

        if placed.len() < target && !leftovers.is_empty() {
            let quota = target - placed.len();
            let (added, _) = offer(&mut placed, &mut cap, leftovers, quota);
            debug!("Leftover expansion candidates added {added} tracks");
            filled.from_expansion += added;
        }

        info!(
            "Fill stage: {} from sonic expansion, {} from discovery padding, {} of {target} total",
            filled.from_expansion,
            filled.from_padding,
            placed.len()
        );
        filled.tracks = placed.into_vec();
        filled
    }

    /// Shuffled, filtered neighbours of up to `seed_count` random placed tracks
    pub fn expansion_candidates<R: Rng + ?Sized>(&self, placed: &[Track], rng: &mut R) -> Vec<Track> {
        let expansion = &self.config.sonic_expansion;
        let seeds: Vec<&Track> = placed.choose_multiple(rng, expansion.seed_count).collect();

        let mut pool = CandidatePool::new();
        for seed in &seeds {
            self.pacer.wait();
            match self
                .source
                .similar_tracks(&seed.id, expansion.per_seed_count, expansion.max_distance)
            {
                Ok(tracks) => pool.extend(tracks),
                Err(e) => warn!("Expansion lookup for '{seed}' failed, skipping seed: {e:#}"),
            }
        }

        let found = pool.len();
        pool.retain(|track| self.filter.accepts(track, FilterMode::Discovery));
        pool.shuffle(rng);
        debug!(
            "Expansion: {} of {found} neighbours from {} seeds survived filtering",
            pool.len(),
            seeds.len()
        );
        pool.into_vec()
    }
}

/// Add candidates until `quota` is reached. Returns how many were added and
/// the candidates never examined.
fn offer(
    placed: &mut CandidatePool,
    cap: &mut ArtistCap,
    candidates: Vec<Track>,
    quota: usize,
) -> (usize, Vec<Track>) {
    let mut added = 0;
    let mut candidates = candidates.into_iter();

    while added < quota {
        let Some(track) = candidates.next() else {
            break;
        };
        if placed.contains(&track.id) || !cap.admits(&track) {
            continue;
        }
        cap.record(&track);
        placed.insert(track);
        added += 1;
    }

    (added, candidates.collect())
}
