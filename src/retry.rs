//! Bounded retry for collaborator calls.
//!
//! One [`RetryPolicy`] is shared by every adapter. [`Retrying`] wraps any
//! collaborator and routes each trait call through the policy, so the engine
//! never has to know whether a call was retried.

use crate::catalog::{Playlist, PlayHistory, PlaylistStore, TrackSource};
use crate::config::RetryConfig;
use crate::track::{HistoryEvent, Track, TrackId, TrackQuery};
use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::thread;
use std::time::Duration;

/// Retry with linear backoff: attempt `n` waits `base_delay * n` before the next try
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// A policy that calls exactly once
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `op` until it succeeds or the attempts are used up.
    /// The last error is returned unchanged.
    pub fn call<T>(&self, label: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{label} succeeded on attempt {attempt}/{}", self.max_attempts);
                    }
                    return Ok(value);
                }
                Err(e) if attempt < self.max_attempts => {
                    warn!("{label} failed (attempt {attempt}/{}): {e:#}", self.max_attempts);
                    thread::sleep(self.base_delay * attempt);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.base_delay_ms))
    }
}

/// Collaborator decorator applying a [`RetryPolicy`] to every call
#[derive(Debug, Clone)]
pub struct Retrying<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C> Retrying<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: TrackSource> TrackSource for Retrying<C> {
    fn search_tracks(&self, query: &TrackQuery) -> Result<Vec<Track>> {
        self.policy.call("Track search", || self.inner.search_tracks(query))
    }

    fn similar_tracks(&self, seed: &TrackId, limit: usize, max_distance: f64) -> Result<Vec<Track>> {
        self.policy.call("Similarity lookup", || {
            self.inner.similar_tracks(seed, limit, max_distance)
        })
    }

    fn similarity_path(&self, start: &TrackId, end: &TrackId) -> Result<Vec<Track>> {
        self.policy.call("Similarity path", || self.inner.similarity_path(start, end))
    }

    fn find_track(&self, artist: &str, title: &str) -> Result<Option<Track>> {
        self.policy.call("Track lookup", || self.inner.find_track(artist, title))
    }
}

impl<C: PlayHistory> PlayHistory for Retrying<C> {
    fn play_history(&self, since: DateTime<Utc>, max_results: usize) -> Result<Vec<HistoryEvent>> {
        self.policy.call("Play history", || self.inner.play_history(since, max_results))
    }
}

impl<C: PlaylistStore> PlaylistStore for Retrying<C> {
    fn get_playlist(&self, name: &str) -> Result<Option<Playlist>> {
        self.policy.call("Playlist lookup", || self.inner.get_playlist(name))
    }

    fn create_playlist(&self, name: &str, tracks: &[Track]) -> Result<Playlist> {
        self.policy.call("Playlist create", || self.inner.create_playlist(name, tracks))
    }

    fn clear_items(&self, playlist: &Playlist) -> Result<()> {
        self.policy.call("Playlist clear", || self.inner.clear_items(playlist))
    }

    fn add_items(&self, playlist: &Playlist, tracks: &[Track]) -> Result<()> {
        self.policy.call("Playlist add", || self.inner.add_items(playlist, tracks))
    }

    fn replace_items(&self, playlist: &Playlist, tracks: &[Track]) -> Result<()> {
        self.policy.call("Playlist replace", || self.inner.replace_items(playlist, tracks))
    }

    fn set_description(&self, playlist: &Playlist, text: &str) -> Result<()> {
        self.policy.call("Playlist describe", || self.inner.set_description(playlist, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::Cell;

    #[test]
    fn test_retries_until_success() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let calls = Cell::new(0);

        let result = policy.call("flaky", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(anyhow!("busy"))
            } else {
                Ok(calls.get())
            }
        });

        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(2, Duration::ZERO);
        let calls = Cell::new(0);

        let result: Result<()> = policy.call("broken", || {
            calls.set(calls.get() + 1);
            Err(anyhow!("down"))
        });

        assert!(result.is_err());
        assert_eq!(calls.get(), 2);
        assert_eq!(result.unwrap_err().to_string(), "down");
    }

    /// Collaborator that fails its first `failures` calls, then answers
    struct Flaky {
        failures: Cell<u32>,
        calls: Cell<u32>,
    }

    impl Flaky {
        fn failing(failures: u32) -> Self {
            Self {
                failures: Cell::new(failures),
                calls: Cell::new(0),
            }
        }

        fn answer<T>(&self, value: T) -> Result<T> {
            self.calls.set(self.calls.get() + 1);
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err(anyhow!("connection reset"));
            }
            Ok(value)
        }
    }

    impl TrackSource for Flaky {
        fn search_tracks(&self, _query: &TrackQuery) -> Result<Vec<Track>> {
            self.answer(Vec::new())
        }

        fn similar_tracks(&self, _seed: &TrackId, _limit: usize, _max_distance: f64) -> Result<Vec<Track>> {
            self.answer(Vec::new())
        }

        fn similarity_path(&self, _start: &TrackId, _end: &TrackId) -> Result<Vec<Track>> {
            self.answer(Vec::new())
        }

        fn find_track(&self, artist: &str, title: &str) -> Result<Option<Track>> {
            self.answer(Some(Track::new("found", title, artist)))
        }
    }

    impl PlaylistStore for Flaky {
        fn get_playlist(&self, _name: &str) -> Result<Option<Playlist>> {
            self.answer(None)
        }

        fn create_playlist(&self, name: &str, tracks: &[Track]) -> Result<Playlist> {
            self.answer(Playlist {
                name: name.to_string(),
                description: String::new(),
                track_count: tracks.len(),
            })
        }

        fn clear_items(&self, _playlist: &Playlist) -> Result<()> {
            self.answer(())
        }

        fn add_items(&self, _playlist: &Playlist, _tracks: &[Track]) -> Result<()> {
            self.answer(())
        }

        fn set_description(&self, _playlist: &Playlist, _text: &str) -> Result<()> {
            self.answer(())
        }

        fn replace_items(&self, _playlist: &Playlist, _tracks: &[Track]) -> Result<()> {
            self.answer(())
        }
    }

    #[test]
    fn test_decorator_retries_trait_calls() {
        let server = Retrying::new(Flaky::failing(1), RetryPolicy::new(3, Duration::ZERO));

        let found = server.find_track("Khruangbin", "Maria También").unwrap();
        assert_eq!(found.map(|t| t.artist), Some("Khruangbin".to_string()));
        assert_eq!(server.inner().calls.get(), 2, "One failure, one success");

        server.inner().failures.set(2);
        let playlist = server.create_playlist("Daily Flow", &[]).unwrap();
        server.replace_items(&playlist, &[]).unwrap();
        assert_eq!(server.inner().calls.get(), 6, "Replace is routed through the policy too");
    }

    #[test]
    fn test_decorator_surfaces_the_last_error() {
        let server = Retrying::new(Flaky::failing(5), RetryPolicy::new(2, Duration::ZERO));
        let err = server.search_tracks(&TrackQuery::builder().moods(["Calm"]).limit(5).build().unwrap());

        assert_eq!(err.unwrap_err().to_string(), "connection reset");
        assert_eq!(server.inner().calls.get(), 2);
    }

    #[test]
    fn test_zero_attempts_still_calls_once() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(RetryPolicy::none().call("once", || Ok(7)).unwrap(), 7);
    }
}
