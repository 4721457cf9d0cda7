//! Time-of-day aware flow playlists from your own music library.
//!
//! Core modules:
//! - [`period`] - Day schedule and active period resolution
//! - [`vibe`] - Moods and styles learned from listening history
//! - [`anchors`] - Vibe and familiar anchor selection
//! - [`skeleton`] - Anchor interleaving
//! - [`compose`] - Similarity bridging and greedy sonic sort
//! - [`expand`] - Sonic expansion and discovery padding
//! - [`engine`] - Flow generation and publishing
//! - [`cycle`] - One scheduled run over every playlist job
//!
//! ### Supporting Modules
//!
//! - [`catalog`] - Collaborator traits (search, similarity, history, playlists)
//! - [`db`] - SQLite catalog implementing every collaborator
//! - [`retry`] - Bounded retry decorator for collaborators
//! - [`filter`] - Rating, recency and skip rules
//! - [`history`] - Period-scoped play history
//! - [`picks`] - Playlists from exported artist/title pick lists
//! - [`config`] - Configuration and data directory management
//! - [`scheduler`] - Interval loop, signals and daemon PID file
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use daylist::config::Config;
//! use daylist::db::LibraryDb;
//! use daylist::engine::{publish, FlowGenerator};
//! use daylist::retry::{RetryPolicy, Retrying};
//!
//! let config = Config::load(None)?;
//! let db = LibraryDb::open(&config.database_path()?)?;
//! let server = Retrying::new(db, RetryPolicy::from(&config.retry));
//!
//! let mut generator = FlowGenerator::new(&config)?;
//! let flow = generator.generate(&server, chrono::Utc::now());
//! println!("{} tracks for {}", flow.tracks.len(), flow.period);
//!
//! publish(&server, &flow.name, &flow.tracks, &flow.description())?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## How a Flow Is Built
//!
//! 1. The clock (in the configured timezone) selects the active period.
//! 2. History of plays during that period's hours teaches extra moods and styles.
//! 3. Vibe anchors are searched for; familiar anchors come from history.
//! 4. Anchors are interleaved, familiar first, into a skeleton.
//! 5. Similarity paths bridge consecutive anchors, or a greedy nearest
//!    neighbour sort orders them.
//! 6. Sonic expansion and discovery padding fill up to the target size, with
//!    at most `max_tracks_per_artist` tracks per artist.
//! 7. The result replaces the stored playlist. An empty result changes nothing.
//!
//! ## Error Handling
//!
//! All public functions return `anyhow::Result`. Configuration problems are fatal
//! before a run starts; failing catalog calls during a run only shrink the result.
//!
//! Run tests with:
//! ```bash
//! cargo test
//! cargo bench
//! ```

pub mod anchors;
pub mod catalog;
pub mod cli;
pub mod completion;
pub mod compose;
pub mod config;
pub mod cycle;
pub mod db;
pub mod engine;
pub mod expand;
pub mod filter;
pub mod history;
pub mod period;
pub mod picks;
pub mod retry;
pub mod scheduler;
pub mod skeleton;
pub mod track;
pub mod vibe;

#[cfg(test)]
mod test_support;
