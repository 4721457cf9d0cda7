//! In-memory catalog and fixtures shared by the unit tests.

use crate::catalog::{Playlist, PlayHistory, PlaylistStore, TrackSource};
use crate::config::Config;
use crate::track::{HistoryEvent, Track, TrackId, TrackQuery};
use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};

pub(crate) fn fixed_now() -> DateTime<Utc> {
    "2026-10-17T08:30:00Z".parse().expect("valid timestamp")
}

pub(crate) fn rng() -> StdRng {
    StdRng::seed_from_u64(7)
}

/// Defaults with the waits removed and the rating rule off
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.similarity_delay_ms = 0;
    config.retry.base_delay_ms = 0;
    config.filters.min_rating_stars = 0.0;
    config.filters.exclude_played_days = 0;
    config
}

pub(crate) fn track(id: &str, artist: &str, moods: &[&str], genres: &[&str]) -> Track {
    let mut track = Track::new(id, format!("Song {id}"), artist);
    track.moods = moods.iter().map(|m| m.to_string()).collect();
    track.genres = genres.iter().map(|g| g.to_string()).collect();
    track
}

pub(crate) fn ids(tracks: &[Track]) -> Vec<String> {
    tracks.iter().map(|t| t.id.to_string()).collect()
}

#[derive(Default)]
pub(crate) struct FakeCatalog {
    pub tracks: Vec<Track>,
    /// Ranked neighbour ids per seed
    pub neighbours: HashMap<TrackId, Vec<TrackId>>,
    pub paths: HashMap<(TrackId, TrackId), Vec<TrackId>>,
    pub history: Vec<HistoryEvent>,
    pub broken_seeds: HashSet<TrackId>,
    pub fail_search: bool,
    pub fail_writes: bool,
    /// Only adding items fails; clearing and creating still work
    pub fail_adds: bool,
    pub similarity_calls: Cell<usize>,
    pub search_calls: Cell<usize>,
    pub playlists: RefCell<BTreeMap<String, (Playlist, Vec<TrackId>)>>,
}

impl FakeCatalog {
    pub fn with_tracks(tracks: Vec<Track>) -> Self {
        Self { tracks, ..Self::default() }
    }

    pub fn link(&mut self, seed: &str, neighbours: &[&str]) {
        self.neighbours.insert(
            TrackId::from(seed),
            neighbours.iter().map(|n| TrackId::from(*n)).collect(),
        );
    }

    pub fn path(&mut self, start: &str, end: &str, via: &[&str]) {
        self.paths.insert(
            (TrackId::from(start), TrackId::from(end)),
            via.iter().map(|n| TrackId::from(*n)).collect(),
        );
    }

    pub fn play(&mut self, id: &str, played_at: &str) {
        let track = self.get(&TrackId::from(id)).expect("history needs a known track");
        self.history.push(HistoryEvent {
            track,
            played_at: played_at.parse().expect("valid timestamp"),
        });
    }

    pub fn stored(&self, name: &str) -> Option<Vec<String>> {
        self.playlists
            .borrow()
            .get(name)
            .map(|(_, ids)| ids.iter().map(ToString::to_string).collect())
    }

    fn get(&self, id: &TrackId) -> Option<Track> {
        self.tracks.iter().find(|t| &t.id == id).cloned()
    }

    fn resolve(&self, ids: &[TrackId]) -> Vec<Track> {
        ids.iter().filter_map(|id| self.get(id)).collect()
    }
}

impl TrackSource for FakeCatalog {
    fn search_tracks(&self, query: &TrackQuery) -> Result<Vec<Track>> {
        self.search_calls.set(self.search_calls.get() + 1);
        if self.fail_search {
            bail!("search unavailable");
        }
        Ok(self
            .tracks
            .iter()
            .filter(|t| query.moods().is_empty() || t.matches_any_mood(query.moods()))
            .filter(|t| query.genres().is_empty() || t.matches_any_genre(query.genres()))
            .filter(|t| query.library().map_or(true, |l| t.library == l))
            .take(query.limit())
            .cloned()
            .collect())
    }

    fn similar_tracks(&self, seed: &TrackId, limit: usize, _max_distance: f64) -> Result<Vec<Track>> {
        self.similarity_calls.set(self.similarity_calls.get() + 1);
        if self.broken_seeds.contains(seed) {
            bail!("similarity lookup failed for {seed}");
        }
        let ids = self.neighbours.get(seed).cloned().unwrap_or_default();
        Ok(self.resolve(&ids).into_iter().take(limit).collect())
    }

    fn similarity_path(&self, start: &TrackId, end: &TrackId) -> Result<Vec<Track>> {
        match self.paths.get(&(start.clone(), end.clone())) {
            Some(ids) => Ok(self.resolve(ids)),
            None => Err(anyhow!("no path from {start} to {end}")),
        }
    }

    fn find_track(&self, artist: &str, title: &str) -> Result<Option<Track>> {
        Ok(self
            .tracks
            .iter()
            .find(|t| t.artist.eq_ignore_ascii_case(artist) && t.title.eq_ignore_ascii_case(title))
            .cloned())
    }
}

impl PlayHistory for FakeCatalog {
    fn play_history(&self, since: DateTime<Utc>, max_results: usize) -> Result<Vec<HistoryEvent>> {
        Ok(self
            .history
            .iter()
            .filter(|e| e.played_at >= since)
            .take(max_results)
            .cloned()
            .collect())
    }
}

impl PlaylistStore for FakeCatalog {
    fn get_playlist(&self, name: &str) -> Result<Option<Playlist>> {
        Ok(self.playlists.borrow().get(name).map(|(p, _)| p.clone()))
    }

    fn create_playlist(&self, name: &str, tracks: &[Track]) -> Result<Playlist> {
        if self.fail_writes {
            bail!("store is read-only");
        }
        let playlist = Playlist {
            name: name.to_string(),
            description: String::new(),
            track_count: tracks.len(),
        };
        let ids = tracks.iter().map(|t| t.id.clone()).collect();
        self.playlists
            .borrow_mut()
            .insert(name.to_string(), (playlist.clone(), ids));
        Ok(playlist)
    }

    fn clear_items(&self, playlist: &Playlist) -> Result<()> {
        if self.fail_writes {
            bail!("store is read-only");
        }
        if let Some((_, ids)) = self.playlists.borrow_mut().get_mut(&playlist.name) {
            ids.clear();
        }
        Ok(())
    }

    fn add_items(&self, playlist: &Playlist, tracks: &[Track]) -> Result<()> {
        if self.fail_writes || self.fail_adds {
            bail!("store rejected the new items");
        }
        if let Some((_, ids)) = self.playlists.borrow_mut().get_mut(&playlist.name) {
            ids.extend(tracks.iter().map(|t| t.id.clone()));
        }
        Ok(())
    }

    fn replace_items(&self, playlist: &Playlist, tracks: &[Track]) -> Result<()> {
        if self.fail_writes || self.fail_adds {
            bail!("store rejected the new items");
        }
        if let Some((_, ids)) = self.playlists.borrow_mut().get_mut(&playlist.name) {
            *ids = tracks.iter().map(|t| t.id.clone()).collect();
        }
        Ok(())
    }

    fn set_description(&self, playlist: &Playlist, text: &str) -> Result<()> {
        if let Some((stored, _)) = self.playlists.borrow_mut().get_mut(&playlist.name) {
            stored.description = text.to_string();
        }
        Ok(())
    }
}
