//! # Track Model
//!
//! Immutable catalog snapshots and the small value types that travel through
//! every stage of flow generation.
//!
//! - [`Track`] - a catalog item as it looked when it was fetched
//! - [`HistoryEvent`] - one play of a track, as reported by the play history
//! - [`TrackQuery`] - validated search filter handed to the catalog
//! - [`CandidatePool`] - insertion-ordered, id-deduplicated track collection
//!
//! Two tracks with the same [`TrackId`] are the same track. Equality and hashing
//! only look at the id, so a stale snapshot and a fresh one never both end up
//! in a pool.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Stable catalog identifier of a track
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Snapshot of a catalog item at fetch time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub moods: BTreeSet<String>,
    #[serde(default)]
    pub genres: BTreeSet<String>,
    /// Star rating on a 0-5 scale, `None` when the listener never rated it
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub play_count: u32,
    #[serde(default)]
    pub skip_count: u32,
    #[serde(default)]
    pub last_played_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub library: String,
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Track {}

impl Hash for Track {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Track {
    /// Minimal unrated, never played track. Mostly useful for building fixtures.
    pub fn new(id: impl Into<String>, title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            id: TrackId::new(id),
            title: title.into(),
            artist: artist.into(),
            moods: BTreeSet::new(),
            genres: BTreeSet::new(),
            rating: None,
            play_count: 0,
            skip_count: 0,
            last_played_at: None,
            library: String::new(),
        }
    }

    /// Convert a rating on the catalog's 0-10 scale to stars.
    ///
    /// Negative source values mean "unrated" in most media servers.
    #[must_use]
    pub fn stars_from_source(source: Option<f64>) -> Option<f64> {
        source
            .filter(|value| *value >= 0.0)
            .map(|value| (value / 2.0).min(5.0))
    }

    /// True when the track shares at least one mood with `targets`.
    /// An empty target set matches everything.
    pub fn matches_any_mood(&self, targets: &[String]) -> bool {
        targets.is_empty() || intersects(&self.moods, targets)
    }

    /// True when the track shares at least one genre with `targets`.
    /// An empty target set matches everything.
    pub fn matches_any_genre(&self, targets: &[String]) -> bool {
        targets.is_empty() || intersects(&self.genres, targets)
    }

    /// Lower-cased artist name, used for per-artist caps
    pub fn artist_key(&self) -> String {
        self.artist.trim().to_lowercase()
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

fn intersects(tags: &BTreeSet<String>, targets: &[String]) -> bool {
    let tags: HashSet<String> = tags.iter().map(|tag| normalize_tag(tag)).collect();
    targets.iter().any(|target| tags.contains(&normalize_tag(target)))
}

/// Canonical form of a mood/genre tag for comparisons
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

/// A single play reported by the play history collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEvent {
    /// Track snapshot; carries the play/skip counts and rating at fetch time
    pub track: Track,
    pub played_at: DateTime<Utc>,
}

/// Validated search filter: OR within a field, AND across fields
#[derive(Debug, Clone, PartialEq)]
pub struct TrackQuery {
    moods: Vec<String>,
    genres: Vec<String>,
    limit: usize,
    library: Option<String>,
    sample_seed: Option<u64>,
}

impl TrackQuery {
    pub fn builder() -> TrackQueryBuilder {
        TrackQueryBuilder::default()
    }

    pub fn moods(&self) -> &[String] {
        &self.moods
    }

    pub fn genres(&self) -> &[String] {
        &self.genres
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn library(&self) -> Option<&str> {
        self.library.as_deref()
    }

    /// Seed for picking `limit` matches when more are available. Without one
    /// the catalog returns the first matches in id order.
    pub fn sample_seed(&self) -> Option<u64> {
        self.sample_seed
    }

    #[must_use]
    pub fn with_sample_seed(mut self, seed: u64) -> Self {
        self.sample_seed = Some(seed);
        self
    }
}

/// Builder for [`TrackQuery`]; validation happens in [`TrackQueryBuilder::build`]
#[derive(Debug, Clone, Default)]
pub struct TrackQueryBuilder {
    moods: Vec<String>,
    genres: Vec<String>,
    limit: usize,
    library: Option<String>,
}

impl TrackQueryBuilder {
    pub fn moods<I, S>(mut self, moods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.moods.extend(moods.into_iter().map(|m| m.as_ref().to_string()));
        self
    }

    pub fn genres<I, S>(mut self, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.genres.extend(genres.into_iter().map(|g| g.as_ref().to_string()));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn library(mut self, library: Option<&str>) -> Self {
        self.library = library.map(str::to_string);
        self
    }

    /// # Errors
    ///
    /// Fails when the limit is zero or when both tag fields are empty, since
    /// such a query would match the whole catalog.
    pub fn build(self) -> Result<TrackQuery> {
        let moods = clean_tags(self.moods);
        let genres = clean_tags(self.genres);

        if self.limit == 0 {
            bail!("Track query limit must be greater than zero");
        }
        if moods.is_empty() && genres.is_empty() {
            bail!("Track query needs at least one mood or genre");
        }

        Ok(TrackQuery {
            moods,
            genres,
            limit: self.limit,
            library: self.library.filter(|l| !l.trim().is_empty()),
            sample_seed: None,
        })
    }
}

/// Trim, drop blanks and remove case-insensitive duplicates, keeping first spelling
fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .filter(|tag| seen.insert(normalize_tag(tag)))
        .collect()
}

/// Deduplicated, order-preserving track collection keyed by id
#[derive(Debug, Clone, Default)]
pub struct CandidatePool {
    tracks: Vec<Track>,
    ids: HashSet<TrackId>,
}

impl CandidatePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a track unless one with the same id is already present.
    /// Returns whether the track was added.
    pub fn insert(&mut self, track: Track) -> bool {
        if self.ids.contains(&track.id) {
            return false;
        }
        self.ids.insert(track.id.clone());
        self.tracks.push(track);
        true
    }

    pub fn contains(&self, id: &TrackId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Track> {
        self.tracks.iter()
    }

    pub fn as_slice(&self) -> &[Track] {
        &self.tracks
    }

    /// Keep only the tracks matching `keep`, preserving order
    pub fn retain(&mut self, mut keep: impl FnMut(&Track) -> bool) {
        let ids = &mut self.ids;
        self.tracks.retain(|track| {
            let kept = keep(track);
            if !kept {
                ids.remove(&track.id);
            }
            kept
        });
    }

    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.tracks.shuffle(rng);
    }

    /// Drop everything past the first `len` tracks
    pub fn truncate(&mut self, len: usize) {
        for track in self.tracks.iter().skip(len) {
            self.ids.remove(&track.id);
        }
        self.tracks.truncate(len);
    }

    pub fn into_vec(self) -> Vec<Track> {
        self.tracks
    }
}

impl Extend<Track> for CandidatePool {
    fn extend<T: IntoIterator<Item = Track>>(&mut self, iter: T) {
        for track in iter {
            self.insert(track);
        }
    }
}

impl FromIterator<Track> for CandidatePool {
    fn from_iter<T: IntoIterator<Item = Track>>(iter: T) -> Self {
        let mut pool = Self::new();
        pool.extend(iter);
        pool
    }
}

impl IntoIterator for CandidatePool {
    type Item = Track;
    type IntoIter = std::vec::IntoIter<Track>;

    fn into_iter(self) -> Self::IntoIter {
        self.tracks.into_iter()
    }
}
