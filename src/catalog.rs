//! # Catalog Collaborators
//!
//! Everything the flow engine needs from the outside world, expressed as traits:
//!
//! - [`TrackSource`] - tag search, similarity neighbours and similarity paths
//! - [`PlayHistory`] - timestamped plays
//! - [`PlaylistStore`] - playlist create, replace and describe
//!
//! The bundled implementation is [`crate::db::LibraryDb`]; [`crate::retry::Retrying`]
//! wraps any implementation with the shared retry policy.

use crate::track::{HistoryEvent, Track, TrackId, TrackQuery};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Catalog search and acoustic similarity
pub trait TrackSource {
    /// Tracks matching the query; may return fewer than `query.limit()`.
    fn search_tracks(&self, query: &TrackQuery) -> Result<Vec<Track>>;

    /// Nearest neighbours of `seed`, most similar first.
    fn similar_tracks(&self, seed: &TrackId, limit: usize, max_distance: f64) -> Result<Vec<Track>>;

    /// Ordered bridging tracks from `start` to `end`, both excluded.
    /// Empty when no path is known.
    fn similarity_path(&self, start: &TrackId, end: &TrackId) -> Result<Vec<Track>>;

    /// Look up a single track by artist and title, case-insensitively.
    fn find_track(&self, artist: &str, title: &str) -> Result<Option<Track>>;
}

/// Listening history
pub trait PlayHistory {
    /// Plays at or after `since`, newest first, at most `max_results`.
    fn play_history(&self, since: DateTime<Utc>, max_results: usize) -> Result<Vec<HistoryEvent>>;
}

/// Handle to a stored playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub name: String,
    pub description: String,
    pub track_count: usize,
}

/// Playlist persistence
pub trait PlaylistStore {
    fn get_playlist(&self, name: &str) -> Result<Option<Playlist>>;
    fn create_playlist(&self, name: &str, tracks: &[Track]) -> Result<Playlist>;
    fn clear_items(&self, playlist: &Playlist) -> Result<()>;
    fn add_items(&self, playlist: &Playlist, tracks: &[Track]) -> Result<()>;
    fn set_description(&self, playlist: &Playlist, text: &str) -> Result<()>;

    /// Swap the playlist's items for `tracks`, in order.
    ///
    /// The default clears then adds, so a failed add leaves the playlist
    /// empty. Stores that can swap atomically should override it.
    fn replace_items(&self, playlist: &Playlist, tracks: &[Track]) -> Result<()> {
        self.clear_items(playlist)?;
        self.add_items(playlist, tracks)
    }
}

/// A full media server: every collaborator in one
pub trait MediaServer: TrackSource + PlayHistory + PlaylistStore {}

impl<T: TrackSource + PlayHistory + PlaylistStore> MediaServer for T {}

/// Artist/title pair from a non-time-based recommendation source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalPick {
    pub artist: String,
    pub title: String,
}

impl<T: TrackSource + ?Sized> TrackSource for &T {
    fn search_tracks(&self, query: &TrackQuery) -> Result<Vec<Track>> {
        (**self).search_tracks(query)
    }

    fn similar_tracks(&self, seed: &TrackId, limit: usize, max_distance: f64) -> Result<Vec<Track>> {
        (**self).similar_tracks(seed, limit, max_distance)
    }

    fn similarity_path(&self, start: &TrackId, end: &TrackId) -> Result<Vec<Track>> {
        (**self).similarity_path(start, end)
    }

    fn find_track(&self, artist: &str, title: &str) -> Result<Option<Track>> {
        (**self).find_track(artist, title)
    }
}

impl<T: PlayHistory + ?Sized> PlayHistory for &T {
    fn play_history(&self, since: DateTime<Utc>, max_results: usize) -> Result<Vec<HistoryEvent>> {
        (**self).play_history(since, max_results)
    }
}

impl<T: PlaylistStore + ?Sized> PlaylistStore for &T {
    fn get_playlist(&self, name: &str) -> Result<Option<Playlist>> {
        (**self).get_playlist(name)
    }

    fn create_playlist(&self, name: &str, tracks: &[Track]) -> Result<Playlist> {
        (**self).create_playlist(name, tracks)
    }

    fn clear_items(&self, playlist: &Playlist) -> Result<()> {
        (**self).clear_items(playlist)
    }

    fn add_items(&self, playlist: &Playlist, tracks: &[Track]) -> Result<()> {
        (**self).add_items(playlist, tracks)
    }

    fn replace_items(&self, playlist: &Playlist, tracks: &[Track]) -> Result<()> {
        (**self).replace_items(playlist, tracks)
    }

    fn set_description(&self, playlist: &Playlist, text: &str) -> Result<()> {
        (**self).set_description(playlist, text)
    }
}
