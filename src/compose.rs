//! # Flow Composition
//!
//! Turns the anchor skeleton into an ordered listening sequence.
//!
//! ## Bridging ("sonic adventure")
//!
//! For each pair of consecutive anchors the catalog is asked for a similarity
//! path between them, and the tracks on that path are placed in between:
//!
//! ```text
//! A ──► [a1 a2] ──► B ──► [b1] ──► C
//! ```
//!
//! ## Greedy sonic sort
//!
//! Without bridges the anchors are reordered by nearest neighbour: start from
//! a random track, then always continue with the unplaced track that ranks
//! highest in the current track's similarity list. Tracks missing from that
//! list rank last, so they are deferred, never dropped.
//!
//! Ranking goes through [`SimilarityRanker`]; [`CatalogRanker`] memoizes one
//! neighbour lookup per track, so a sort of `n` tracks costs at most `n` calls
//! instead of `n²`.

use crate::catalog::TrackSource;
use crate::config::Config;
use crate::filter::{FilterMode, TrackFilter};
use crate::track::{CandidatePool, Track, TrackId};
use log::{debug, info, warn};
use rand::Rng;
use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::thread;
use std::time::{Duration, Instant};

/// Spaces out consecutive similarity requests
#[derive(Debug)]
pub struct Pacer {
    delay: Duration,
    last: Cell<Option<Instant>>,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last: Cell::new(None),
        }
    }

    /// Block until at least `delay` has passed since the previous call
    pub fn wait(&self) {
        if let Some(last) = self.last.get() {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                thread::sleep(self.delay - elapsed);
            }
        }
        self.last.set(Some(Instant::now()));
    }
}

/// Similarity score used by the greedy sort: lower rank is closer
pub trait SimilarityRanker {
    /// Position of `candidate` in `from`'s similarity list, `None` if absent
    fn rank(&mut self, from: &Track, candidate: &Track) -> Option<usize>;
}

/// Ranks by position in the catalog's top-similar list, one lookup per seed
pub struct CatalogRanker<'a, S: ?Sized> {
    source: &'a S,
    limit: usize,
    max_distance: f64,
    pacer: &'a Pacer,
    cache: HashMap<TrackId, HashMap<TrackId, usize>>,
}

impl<'a, S: TrackSource + ?Sized> CatalogRanker<'a, S> {
    pub fn new(source: &'a S, limit: usize, max_distance: f64, pacer: &'a Pacer) -> Self {
        Self {
            source,
            limit,
            max_distance,
            pacer,
            cache: HashMap::new(),
        }
    }

    /// Number of distinct seeds looked up so far
    pub fn lookups(&self) -> usize {
        self.cache.len()
    }

    fn neighbours(&mut self, seed: &TrackId) -> &HashMap<TrackId, usize> {
        if !self.cache.contains_key(seed) {
            self.pacer.wait();
            let ranks = match self.source.similar_tracks(seed, self.limit, self.max_distance) {
                Ok(tracks) => {
                    // Keep the first occurrence: lists can repeat a track
                    let mut ranks = HashMap::new();
                    for (rank, track) in tracks.into_iter().enumerate() {
                        ranks.entry(track.id).or_insert(rank);
                    }
                    ranks
                }
                Err(e) => {
                    warn!("Similarity lookup for {seed} failed, its neighbours rank last: {e:#}");
                    HashMap::new()
                }
            };
            self.cache.insert(seed.clone(), ranks);
        }
        &self.cache[seed]
    }
}

impl<S: TrackSource + ?Sized> SimilarityRanker for CatalogRanker<'_, S> {
    fn rank(&mut self, from: &Track, candidate: &Track) -> Option<usize> {
        self.neighbours(&from.id).get(&candidate.id).copied()
    }
}

/// Reorder `tracks` by greedy nearest neighbour. Output is a permutation of input.
pub fn greedy_sort<K, R>(mut tracks: Vec<Track>, ranker: &mut K, rng: &mut R) -> Vec<Track>
where
    K: SimilarityRanker + ?Sized,
    R: Rng + ?Sized,
{
    if tracks.len() < 2 {
        return tracks;
    }

    let start = rng.gen_range(0..tracks.len());
    let mut ordered = Vec::with_capacity(tracks.len());
    ordered.push(tracks.swap_remove(start));

    while !tracks.is_empty() {
        let current = &ordered[ordered.len() - 1];
        let (best, _) = tracks
            .iter()
            .enumerate()
            .map(|(index, candidate)| (index, ranker.rank(current, candidate).unwrap_or(usize::MAX)))
            .min_by_key(|(index, rank)| (*rank, *index))
            .unwrap_or((0, usize::MAX));
        ordered.push(tracks.remove(best));
    }

    ordered
}

/// Bridges anchors or, failing that, sorts them
pub struct FlowComposer<'a, S: ?Sized> {
    source: &'a S,
    config: &'a Config,
    filter: &'a TrackFilter,
    pacer: &'a Pacer,
}

impl<'a, S: TrackSource + ?Sized> FlowComposer<'a, S> {
    pub fn new(source: &'a S, config: &'a Config, filter: &'a TrackFilter, pacer: &'a Pacer) -> Self {
        Self {
            source,
            config,
            filter,
            pacer,
        }
    }

    /// Ordered flow for `skeleton`.
    ///
    /// Bridging is used when enabled; if it is disabled, or no bridge could be
    /// found for any pair, the anchors are ordered by [`Self::arrange`].
    pub fn compose<R: Rng + ?Sized>(&self, skeleton: Vec<Track>, rng: &mut R) -> Vec<Track> {
        if self.config.sonic_adventure.enabled && skeleton.len() >= 2 {
            let (flow, bridged) = self.bridge(&skeleton);
            if bridged > 0 {
                info!("Bridged {} anchors with {bridged} tracks", skeleton.len());
                return flow;
            }
            info!("No bridges found, falling back to anchor ordering");
        }
        self.arrange(skeleton, rng)
    }

    /// Anchors with similarity-path tracks between each consecutive pair.
    /// Returns the sequence and how many bridge tracks were added.
    pub fn bridge(&self, skeleton: &[Track]) -> (Vec<Track>, usize) {
        let anchors: HashSet<&TrackId> = skeleton.iter().map(|t| &t.id).collect();
        let mut placed = CandidatePool::new();
        let mut bridged = 0;

        for pair in skeleton.windows(2) {
            let (from, to) = (&pair[0], &pair[1]);
            placed.insert(from.clone());

            self.pacer.wait();
            let path = match self.source.similarity_path(&from.id, &to.id) {
                Ok(path) => path,
                Err(e) => {
                    warn!("No bridge from '{from}' to '{to}': {e:#}");
                    continue;
                }
            };

            let offered = path.len();
            let mut added = 0;
            for track in self.filter.apply(path, FilterMode::Discovery) {
                if !anchors.contains(&track.id) && placed.insert(track) {
                    added += 1;
                }
            }
            debug!("Bridge '{from}' -> '{to}': {added} of {offered} path tracks placed");
            bridged += added;
        }

        if let Some(last) = skeleton.last() {
            placed.insert(last.clone());
        }
        (placed.into_vec(), bridged)
    }

    /// Skeleton order, greedily re-sorted by similarity when sonic sort is enabled
    pub fn arrange<R: Rng + ?Sized>(&self, skeleton: Vec<Track>, rng: &mut R) -> Vec<Track> {
        let sort = &self.config.sonic_sort;
        if !sort.enabled || skeleton.len() < 2 {
            return skeleton;
        }

        let mut ranker = CatalogRanker::new(self.source, sort.similarity_limit, sort.max_distance, self.pacer);
        let sorted = greedy_sort(skeleton, &mut ranker, rng);
        debug!("Sonic sort ordered {} tracks with {} lookups", sorted.len(), ranker.lookups());
        sorted
    }
}
